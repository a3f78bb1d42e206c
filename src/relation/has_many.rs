use super::{Relationship, RelationKind, SchemaNode, collect_keys, group_by_key, key_of};
use crate::model::{Model, Related};
use crate::query::Query;
use crate::value::Element;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HasMany {
    pub related: String,
    pub foreign_key: String,
    pub local_key: String,
}

impl Relationship for HasMany {
    fn kind(&self) -> RelationKind {
        RelationKind::HasMany
    }

    fn related(&self) -> Option<&str> {
        Some(&self.related)
    }

    fn decomposition(&self) -> SchemaNode {
        SchemaNode::Many(self.related.clone())
    }

    fn attach(&self, parent: &mut Element, child: &mut Element, _parent_entity: &str) {
        if let Some(key) = parent.get(&self.local_key).filter(|v| !v.is_null()) {
            child.insert(self.foreign_key.clone(), key.clone());
        }
    }

    fn child_stamped_fields(&self) -> Vec<&str> {
        vec![self.foreign_key.as_str()]
    }

    fn add_eager_constraints<'q>(&self, query: Query<'q>, parents: &[Model]) -> Query<'q> {
        query.where_in(&self.foreign_key, collect_keys(parents, &self.local_key))
    }

    fn match_results(&self, name: &str, parents: &mut [Model], results: Vec<Model>) {
        let dictionary = group_by_key(results, &self.foreign_key);
        for parent in parents.iter_mut() {
            let matched = key_of(parent, &self.local_key)
                .and_then(|key| dictionary.get(&key))
                .cloned()
                .unwrap_or_default();
            parent.set_relation(name, Related::Many(matched));
        }
    }
}
