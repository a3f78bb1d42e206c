use super::{Relationship, RelationKind, SchemaNode, key_by};
use crate::model::{Model, Related};
use crate::query::Query;
use crate::value::{Element, Value};
use std::collections::BTreeSet;

/// This record holds a list of the related records' owner keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HasManyBy {
    pub related: String,
    pub foreign_key: String,
    pub owner_key: String,
}

impl HasManyBy {
    fn ids_of<'m>(&self, model: &'m Model) -> &'m [Value] {
        model
            .get(&self.foreign_key)
            .and_then(Value::as_list)
            .unwrap_or(&[])
    }
}

impl Relationship for HasManyBy {
    fn kind(&self) -> RelationKind {
        RelationKind::HasManyBy
    }

    fn related(&self) -> Option<&str> {
        Some(&self.related)
    }

    fn decomposition(&self) -> SchemaNode {
        SchemaNode::Many(self.related.clone())
    }

    fn attach(&self, parent: &mut Element, child: &mut Element, _parent_entity: &str) {
        let Some(key) = child.get(&self.owner_key).filter(|v| !v.is_null()) else {
            return;
        };
        let ids = parent
            .entry(self.foreign_key.clone())
            .or_insert_with(|| Value::List(Vec::new()));
        match ids {
            Value::List(items) => {
                if !items.contains(key) {
                    items.push(key.clone());
                }
            }
            other => *other = Value::List(vec![key.clone()]),
        }
    }

    fn parent_stamped_fields(&self) -> Vec<&str> {
        vec![self.foreign_key.as_str()]
    }

    fn add_eager_constraints<'q>(&self, query: Query<'q>, parents: &[Model]) -> Query<'q> {
        let mut seen = BTreeSet::new();
        let ids: Vec<Value> = parents
            .iter()
            .flat_map(|parent| self.ids_of(parent).iter())
            .filter(|id| !id.is_null() && seen.insert(id.to_key_string()))
            .cloned()
            .collect();
        query.where_in(&self.owner_key, ids)
    }

    fn match_results(&self, name: &str, parents: &mut [Model], results: Vec<Model>) {
        let dictionary = key_by(results, &self.owner_key);
        for parent in parents.iter_mut() {
            let matched: Vec<Model> = self
                .ids_of(parent)
                .iter()
                .filter_map(|id| dictionary.get(&id.to_key_string()))
                .cloned()
                .collect();
            parent.set_relation(name, Related::Many(matched));
        }
    }
}
