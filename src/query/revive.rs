use super::Query;
use crate::error::RelmapError;
use crate::model::{Model, Related};
use crate::normalizer::ID_FIELD;
use crate::relation::{Relationship, SchemaNode};
use crate::value::{Element, Value};
use std::sync::Arc;

impl<'a> Query<'a> {
    /// Rebuilds models from a reference tree produced by normalization,
    /// looking each Index ID up in the store. Nothing is decomposed or
    /// coerced again beyond hydration.
    pub fn revive(&self, references: &Value) -> Result<Related, RelmapError> {
        match references {
            Value::List(items) => Ok(Related::Many(self.revive_many(items)?)),
            other => Ok(Related::One(self.revive_one(other)?.map(Box::new))),
        }
    }

    /// A reference without `__id` falls back to the primary key fields it
    /// carries. Unresolvable references yield `None`.
    pub fn revive_one(&self, reference: &Value) -> Result<Option<Model>, RelmapError> {
        let Some(reference) = reference.as_record() else {
            return Ok(None);
        };
        let id = match reference.get(ID_FIELD).and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => match self.schema.index_id(reference) {
                Ok(id) => id,
                Err(_) => return Ok(None),
            },
        };
        let Some(stored) = self.db.store().find(self.entity(), &id) else {
            return Ok(None);
        };
        let uids = self.db.config().uid_generator.as_ref();
        let mut model = Model::hydrate(Arc::clone(&self.schema), &stored, uids);
        self.revive_relations(&mut model, reference)?;
        Ok(Some(model))
    }

    /// Skips references that no longer resolve.
    pub fn revive_many(&self, references: &[Value]) -> Result<Vec<Model>, RelmapError> {
        let mut models = Vec::with_capacity(references.len());
        for reference in references {
            if let Some(model) = self.revive_one(reference)? {
                models.push(model);
            }
        }
        Ok(models)
    }

    fn revive_relations(&self, model: &mut Model, reference: &Element) -> Result<(), RelmapError> {
        for (name, nested) in reference {
            let Ok(relation) = self.schema.relation(name) else {
                continue;
            };
            let entity = match relation.decomposition() {
                SchemaNode::One(entity) | SchemaNode::Many(entity) => entity,
                SchemaNode::Union { type_field } => {
                    match model.get(&type_field).and_then(Value::as_str) {
                        Some(entity) => entity.to_string(),
                        None => {
                            model.set_relation(name, relation.default_value());
                            continue;
                        }
                    }
                }
            };
            let related = self.new_query(&entity)?.revive(nested)?;
            model.set_relation(name, related);
        }
        Ok(())
    }
}
