use super::{Relationship, RelationKind, SchemaNode, collect_keys, first_by, key_of};
use crate::model::{Model, Related};
use crate::query::Query;
use crate::value::{Element, Value};

/// Polymorphic has-one: the child stores the parent's key and entity name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MorphOne {
    pub related: String,
    pub id: String,
    pub type_field: String,
    pub local_key: String,
}

/// Shared by morph-one and morph-many.
pub(crate) fn stamp_morph_child(
    id: &str,
    type_field: &str,
    local_key: &str,
    parent: &Element,
    child: &mut Element,
    parent_entity: &str,
) {
    if let Some(key) = parent.get(local_key).filter(|v| !v.is_null()) {
        child.insert(id.to_string(), key.clone());
    }
    child.insert(type_field.to_string(), Value::text(parent_entity));
}

pub(crate) fn constrain_morph_children<'q>(
    query: Query<'q>,
    id: &str,
    type_field: &str,
    local_key: &str,
    parents: &[Model],
) -> Query<'q> {
    let parent_entity = parents
        .first()
        .map(|p| p.entity().to_string())
        .unwrap_or_default();
    query
        .where_(type_field, parent_entity)
        .where_in(id, collect_keys(parents, local_key))
}

impl Relationship for MorphOne {
    fn kind(&self) -> RelationKind {
        RelationKind::MorphOne
    }

    fn related(&self) -> Option<&str> {
        Some(&self.related)
    }

    fn decomposition(&self) -> SchemaNode {
        SchemaNode::One(self.related.clone())
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
        let dictionary = first_by(results, &self.id);
        for parent in parents.iter_mut() {
            let matched = key_of(parent, &self.local_key)
                .and_then(|key| dictionary.get(&key))
                .cloned();
            parent.set_relation(name, Related::One(matched.map(Box::new)));
        }
    }
}
