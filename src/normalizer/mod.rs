//! Schema-directed decomposition of nested records into flat per-entity
//! collections.
//!
//! Traversal follows the data, not the relation graph, so self-referencing
//! models terminate once the input runs out. For each record the order is:
//!
//! 1. copy the record's attribute fields,
//! 2. generate missing uid fields (except the ones a relation will stamp),
//! 3. `attach` against the parent, stamping foreign keys on either side,
//! 4. recurse into nested relation data,
//! 5. compute the Index ID and merge the coerced element into its entity.

mod schema;

pub use schema::NormalizationSchema;

use crate::attribute::UidGenerator;
use crate::error::RelmapError;
use crate::registry::Registry;
use crate::relation::{Relationship, SchemaNode};
use crate::value::{Element, Elements, IndexId, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Field under which references carry the Index ID of the element they
/// point at.
pub const ID_FIELD: &str = "__id";

/// Output of a decomposition call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Normalized {
    /// Entity name to the elements discovered for it.
    pub entities: BTreeMap<String, Elements>,
    /// Reference tree mirroring the input: `{"__id": ..., relation: ...}`
    /// for a record, a list of those for a list.
    pub result: Value,
}

impl Normalized {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entity(&self, name: &str) -> Option<&Elements> {
        self.entities.get(name)
    }

    /// Index IDs of the top-level input records, in input order.
    pub fn ids(&self) -> Vec<IndexId> {
        let id_of = |reference: &Value| {
            reference
                .as_record()
                .and_then(|r| r.get(ID_FIELD))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        match &self.result {
            Value::List(items) => items.iter().filter_map(id_of).collect(),
            other => id_of(other).into_iter().collect(),
        }
    }
}

struct ParentLink<'p> {
    entity: &'p str,
    field: &'p str,
    element: &'p mut Element,
}

pub struct Normalizer<'a> {
    registry: &'a Registry,
    uids: &'a dyn UidGenerator,
    entities: BTreeMap<String, Elements>,
}

impl<'a> Normalizer<'a> {
    pub fn new(registry: &'a Registry, uids: &'a dyn UidGenerator) -> Self {
        Self {
            registry,
            uids,
            entities: BTreeMap::new(),
        }
    }

    /// Decomposes `input` (a record or a list of records) rooted at `entity`.
    pub fn normalize(mut self, entity: &str, input: &Value) -> Result<Normalized, RelmapError> {
        if input.is_empty() {
            let result = match input {
                Value::List(_) => Value::List(Vec::new()),
                _ => Value::Null,
            };
            return Ok(Normalized {
                entities: BTreeMap::new(),
                result,
            });
        }

        let result = match input {
            Value::List(items) => Value::List(self.visit_list(entity, None, items)?),
            Value::Record(record) => self.visit(entity, None, record)?,
            other => {
                warn!(entity, kind = other.kind(), "ignoring non-record input");
                Value::Null
            }
        };
        debug!(
            entity,
            entities = self.entities.len(),
            elements = self.entities.values().map(|e| e.len()).sum::<usize>(),
            "normalized input"
        );
        Ok(Normalized {
            entities: self.entities,
            result,
        })
    }

    fn visit_list(
        &mut self,
        entity: &str,
        mut parent: Option<ParentLink<'_>>,
        items: &[Value],
    ) -> Result<Vec<Value>, RelmapError> {
        let mut references = Vec::with_capacity(items.len());
        for item in items {
            let Value::Record(record) = item else {
                warn!(entity, kind = item.kind(), "skipping non-record item");
                continue;
            };
            let link = parent.as_mut().map(|p| ParentLink {
                entity: p.entity,
                field: p.field,
                element: &mut *p.element,
            });
            references.push(self.visit(entity, link, record)?);
        }
        Ok(references)
    }

    fn visit_value(
        &mut self,
        entity: &str,
        parent: ParentLink<'_>,
        value: &Value,
    ) -> Result<Value, RelmapError> {
        match value {
            Value::List(items) => Ok(Value::List(self.visit_list(entity, Some(parent), items)?)),
            Value::Record(record) => self.visit(entity, Some(parent), record),
            other => {
                warn!(
                    entity,
                    field = parent.field,
                    kind = other.kind(),
                    "ignoring non-record relation data"
                );
                Ok(Value::Null)
            }
        }
    }

    fn visit(
        &mut self,
        entity: &str,
        parent: Option<ParentLink<'_>>,
        record: &Element,
    ) -> Result<Value, RelmapError> {
        let ns = self
            .registry
            .normalization_schema(entity, parent.as_ref().map(|p| p.entity))?;
        let schema = Arc::clone(ns.schema());

        let mut element: Element = record
            .iter()
            .filter(|(name, _)| schema.attribute(name).is_some())
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        let parent_relation = match &parent {
            Some(link) => Some(ns.parent_relation(link.field)?),
            None => None,
        };

        let mut stamped: HashSet<&str> = HashSet::new();
        if let Some(relation) = parent_relation {
            stamped.extend(relation.child_stamped_fields());
        }
        for (name, _) in ns.relations() {
            if has_data(record, name) {
                stamped.extend(schema.relation(name)?.parent_stamped_fields());
            }
        }
        for field in ns.uid_fields() {
            if stamped.contains(field.as_str()) {
                continue;
            }
            if element.get(field).is_none_or(Value::is_null) {
                element.insert(field.clone(), Value::text(self.uids.generate()));
            }
        }

        if let (Some(link), Some(relation)) = (parent, parent_relation) {
            relation.attach(link.element, &mut element, link.entity);
        }

        let mut reference = Element::new();
        for (name, node) in ns.relations() {
            let Some(value) = record.get(name).filter(|_| has_data(record, name)) else {
                continue;
            };
            let nested = match node {
                SchemaNode::One(related) | SchemaNode::Many(related) => {
                    let link = ParentLink {
                        entity,
                        field: name,
                        element: &mut element,
                    };
                    self.visit_value(related, link, value)?
                }
                SchemaNode::Union { type_field } => {
                    let Some(target) = element
                        .get(type_field)
                        .and_then(Value::as_str)
                        .map(str::to_string)
                    else {
                        warn!(
                            entity,
                            field = name,
                            type_field = type_field.as_str(),
                            "morph-to data without a discriminator; skipping"
                        );
                        continue;
                    };
                    self.registry.observe_morph_type(entity, name, &target);
                    let target_schema = self.registry.schema(&target)?;
                    let link = ParentLink {
                        entity,
                        field: name,
                        element: &mut element,
                    };
                    let nested = self.visit_value(&target, link, value)?;
                    let stamp = schema.relation(name)?.as_morph_to().and_then(|morph| {
                        let owner_key = morph.owner_key_for(&target_schema)?;
                        let id = self.owner_value(&target, &nested, &owner_key)?;
                        Some((morph.id.clone(), id))
                    });
                    if let Some((field, id)) = stamp {
                        element.insert(field, id);
                    }
                    nested
                }
            };
            reference.insert(name.to_string(), nested);
        }

        let id = schema.index_id(&element)?;
        let coerced = schema.sanitize(&element, self.uids);
        self.entities
            .entry(entity.to_string())
            .or_default()
            .entry(id.clone())
            .or_default()
            .extend(coerced);

        reference.insert(ID_FIELD.to_string(), Value::text(id));
        Ok(Value::Record(reference))
    }

    /// Value of `owner_key` on the element a morph-to reference resolved to.
    fn owner_value(&self, entity: &str, reference: &Value, owner_key: &str) -> Option<Value> {
        let reference = match reference {
            Value::List(items) => items.last()?,
            other => other,
        };
        let id = reference.as_record()?.get(ID_FIELD)?.as_str()?;
        self.entities
            .get(entity)?
            .get(id)?
            .get(owner_key)
            .filter(|v| !v.is_null())
            .cloned()
    }
}

fn has_data(record: &Element, field: &str) -> bool {
    record.get(field).is_some_and(|value| !value.is_empty())
}
