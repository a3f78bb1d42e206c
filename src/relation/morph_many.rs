use super::morph_one::{constrain_morph_children, stamp_morph_child};
use super::{Relationship, RelationKind, SchemaNode, group_by_key, key_of};
use crate::model::{Model, Related};
use crate::query::Query;
use crate::value::Element;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MorphMany {
    pub related: String,
    pub id: String,
    pub type_field: String,
    pub local_key: String,
}

impl Relationship for MorphMany {
    fn kind(&self) -> RelationKind {
        RelationKind::MorphMany
    }

    fn related(&self) -> Option<&str> {
        Some(&self.related)
    }

    fn decomposition(&self) -> SchemaNode {
        SchemaNode::Many(self.related.clone())
    }

    fn attach(&self, parent: &mut Element, child: &mut Element, parent_entity: &str) {
        stamp_morph_child(
            &self.id,
            &self.type_field,
            &self.local_key,
            parent,
            child,
            parent_entity,
        );
    }

    fn child_stamped_fields(&self) -> Vec<&str> {
        vec![self.id.as_str(), self.type_field.as_str()]
    }

    fn add_eager_constraints<'q>(&self, query: Query<'q>, parents: &[Model]) -> Query<'q> {
        constrain_morph_children(query, &self.id, &self.type_field, &self.local_key, parents)
    }

    fn match_results(&self, name: &str, parents: &mut [Model], results: Vec<Model>) {
        let dictionary = group_by_key(results, &self.id);
        for parent in parents.iter_mut() {
            let matched = key_of(parent, &self.local_key)
                .and_then(|key| dictionary.get(&key))
                .cloned()
                .unwrap_or_default();
            parent.set_relation(name, Related::Many(matched));
        }
    }
}
