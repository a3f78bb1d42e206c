use super::{Relationship, RelationKind, SchemaNode, collect_keys, key_by, key_of};
use crate::model::{Model, Related};
use crate::query::Query;
use crate::value::Element;

/// This record carries the foreign key; the related record owns the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BelongsTo {
    pub related: String,
    pub foreign_key: String,
    pub owner_key: String,
}

impl Relationship for BelongsTo {
    fn kind(&self) -> RelationKind {
        RelationKind::BelongsTo
    }

    fn related(&self) -> Option<&str> {
        Some(&self.related)
    }

    fn decomposition(&self) -> SchemaNode {
        SchemaNode::One(self.related.clone())
    }

    fn attach(&self, parent: &mut Element, child: &mut Element, _parent_entity: &str) {
        if let Some(key) = child.get(&self.owner_key).filter(|v| !v.is_null()) {
            parent.insert(self.foreign_key.clone(), key.clone());
        }
    }

    fn parent_stamped_fields(&self) -> Vec<&str> {
        vec![self.foreign_key.as_str()]
    }

    fn add_eager_constraints<'q>(&self, query: Query<'q>, parents: &[Model]) -> Query<'q> {
        query.where_in(&self.owner_key, collect_keys(parents, &self.foreign_key))
    }

    fn match_results(&self, name: &str, parents: &mut [Model], results: Vec<Model>) {
        let dictionary = key_by(results, &self.owner_key);
        for parent in parents.iter_mut() {
            let matched = key_of(parent, &self.foreign_key)
                .and_then(|key| dictionary.get(&key))
                .cloned();
            parent.set_relation(name, Related::One(matched.map(Box::new)));
        }
    }
}
