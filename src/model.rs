use crate::attribute::UidGenerator;
use crate::error::RelmapError;
use crate::registry::Registry;
use crate::relation::{Relation, Relationship, SchemaNode};
use crate::schema::Schema;
use crate::value::{Element, IndexId, Value};
use serde::ser::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Related model(s) assigned to a relation field.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    One(Option<Box<Model>>),
    Many(Vec<Model>),
}

impl Related {
    pub fn one(&self) -> Option<&Model> {
        match self {
            Related::One(model) => model.as_deref(),
            Related::Many(_) => None,
        }
    }

    pub fn many(&self) -> &[Model] {
        match self {
            Related::Many(models) => models,
            Related::One(_) => &[],
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Related::One(model) => model.is_none(),
            Related::Many(models) => models.is_empty(),
        }
    }

    pub fn into_models(self) -> Vec<Model> {
        match self {
            Related::One(model) => model.map(|m| *m).into_iter().collect(),
            Related::Many(models) => models,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Related::One(Some(model)) => model.to_json(),
            Related::One(None) => serde_json::Value::Null,
            Related::Many(models) => {
                serde_json::Value::Array(models.iter().map(Model::to_json).collect())
            }
        }
    }
}

/// A hydrated instance of an entity: coerced attributes plus whichever
/// relations have been loaded onto it.
#[derive(Clone)]
pub struct Model {
    schema: Arc<Schema>,
    attributes: Element,
    relations: BTreeMap<String, Related>,
}

impl Model {
    /// Wraps already coerced attributes.
    pub fn new(schema: Arc<Schema>, attributes: Element) -> Self {
        Self {
            schema,
            attributes,
            relations: BTreeMap::new(),
        }
    }

    /// Fills every attribute from `record`, defaulting absent ones. Relation
    /// fields are left unset.
    pub fn hydrate(schema: Arc<Schema>, record: &Element, uids: &dyn UidGenerator) -> Self {
        let attributes = schema.fill(record, uids);
        Self::new(schema, attributes)
    }

    /// Like [`Model::hydrate`], but also builds nested relation data found in
    /// `record` and assigns relation defaults to the rest.
    pub fn make(
        registry: &Registry,
        schema: Arc<Schema>,
        record: &Element,
        uids: &dyn UidGenerator,
    ) -> Result<Self, RelmapError> {
        let mut model = Self::hydrate(Arc::clone(&schema), record, uids);
        for (name, relation) in schema.relations() {
            let related = match record.get(name).filter(|v| !v.is_null()) {
                Some(value) => make_related(registry, relation, &model, value, uids)?,
                None => relation.default_value(),
            };
            model.relations.insert(name.to_string(), related);
        }
        Ok(model)
    }

    pub fn entity(&self) -> &str {
        self.schema.entity()
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.attributes.get(field)
    }

    /// Sets an attribute value as-is.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.attributes.insert(field.into(), value.into());
        self
    }

    /// Applies the attributes present in `record`, coerced. Absent fields keep
    /// their current value.
    pub fn fill(&mut self, record: &Element, uids: &dyn UidGenerator) -> &mut Self {
        let updates = self.schema.sanitize(record, uids);
        self.attributes.extend(updates);
        self
    }

    pub fn attributes(&self) -> &Element {
        &self.attributes
    }

    pub fn into_attributes(self) -> Element {
        self.attributes
    }

    pub fn index_id(&self) -> Result<IndexId, RelmapError> {
        self.schema.index_id(&self.attributes)
    }

    pub fn relation(&self, name: &str) -> Option<&Related> {
        self.relations.get(name)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    /// The single related model, or `None` when absent or not loaded.
    pub fn one(&self, name: &str) -> Option<&Model> {
        self.relations.get(name).and_then(Related::one)
    }

    /// The related models, empty when none matched or not loaded.
    pub fn many(&self, name: &str) -> &[Model] {
        self.relations.get(name).map(Related::many).unwrap_or(&[])
    }

    pub fn set_relation(&mut self, name: impl Into<String>, related: Related) -> &mut Self {
        self.relations.insert(name.into(), related);
        self
    }

    /// Attributes plus loaded relations, in schema field order.
    pub fn to_json(&self) -> serde_json::Value {
        let mut out = serde_json::Map::new();
        for (name, _) in self.schema.fields() {
            if let Some(value) = self.attributes.get(name) {
                out.insert(name.to_string(), value.to_json());
            } else if let Some(related) = self.relations.get(name) {
                out.insert(name.to_string(), related.to_json());
            }
        }
        serde_json::Value::Object(out)
    }
}

fn make_related(
    registry: &Registry,
    relation: &Relation,
    parent: &Model,
    value: &Value,
    uids: &dyn UidGenerator,
) -> Result<Related, RelmapError> {
    let entity = match relation.decomposition() {
        SchemaNode::One(entity) | SchemaNode::Many(entity) => Some(entity),
        SchemaNode::Union { type_field } => parent
            .get(&type_field)
            .and_then(Value::as_str)
            .map(str::to_string),
    };
    let Some(entity) = entity else {
        return Ok(relation.default_value());
    };
    let schema = registry.schema(&entity)?;
    let build = |record: &Element| Model::make(registry, Arc::clone(&schema), record, uids);

    if relation.kind().is_plural() {
        let items = value.as_list().unwrap_or(&[]);
        let models = items
            .iter()
            .filter_map(Value::as_record)
            .map(build)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Related::Many(models))
    } else {
        match value.as_record() {
            Some(record) => Ok(Related::One(Some(Box::new(build(record)?)))),
            None => Ok(Related::One(None)),
        }
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.entity() == other.entity()
            && self.attributes == other.attributes
            && self.relations == other.relations
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("entity", &self.entity())
            .field("attributes", &self.attributes)
            .field("relations", &self.relations)
            .finish()
    }
}

impl Serialize for Model {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_json().serialize(serializer)
    }
}
