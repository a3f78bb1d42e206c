use crate::attribute::{Attribute, UidGenerator};
use crate::error::RelmapError;
use crate::registry::Registry;
use crate::relation::{Relation, RelationSpec};
use crate::value::{Element, IndexId, Value};
use smallvec::SmallVec;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// A declared field, as produced by a field factory.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSpec {
    Attribute(Attribute),
    Relation(RelationSpec),
}

pub type FieldFactory = Arc<dyn Fn() -> FieldSpec + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryKey {
    Single(String),
    Composite(Vec<String>),
}

impl PrimaryKey {
    pub fn names(&self) -> SmallVec<[&str; 2]> {
        match self {
            PrimaryKey::Single(name) => smallvec::smallvec![name.as_str()],
            PrimaryKey::Composite(names) => names.iter().map(String::as_str).collect(),
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, PrimaryKey::Composite(_))
    }

    /// Key used by relations that point at this entity without naming one.
    /// Composite keys fall back to `id`.
    pub fn local_key_name(&self) -> &str {
        match self {
            PrimaryKey::Single(name) => name,
            PrimaryKey::Composite(_) => "id",
        }
    }
}

/// Declaration of an entity: its name, primary key and ordered field factories.
///
/// ```ignore
/// let users = ModelSpec::new("users")
///     .attr("id", Value::Null)
///     .string("name", "")
///     .has_many("posts", "posts", "userId");
/// ```
#[derive(Clone)]
pub struct ModelSpec {
    entity: String,
    primary_key: PrimaryKey,
    fields: Vec<(String, FieldFactory)>,
}

impl ModelSpec {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            primary_key: PrimaryKey::Single("id".to_string()),
            fields: Vec::new(),
        }
    }

    pub fn primary_key(mut self, name: impl Into<String>) -> Self {
        self.primary_key = PrimaryKey::Single(name.into());
        self
    }

    pub fn composite_key<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = PrimaryKey::Composite(names.into_iter().map(Into::into).collect());
        self
    }

    /// Registers a zero-argument factory under `name`. Factories are evaluated
    /// once, when the entity's schema is first booted.
    pub fn field<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> FieldSpec + Send + Sync + 'static,
    {
        self.fields.push((name.into(), Arc::new(factory)));
        self
    }

    pub fn attribute(self, name: impl Into<String>, attribute: Attribute) -> Self {
        self.field(name, move || FieldSpec::Attribute(attribute.clone()))
    }

    pub fn attr(self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.attribute(name, Attribute::attr(default))
    }

    pub fn string(self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.attribute(name, Attribute::string(default))
    }

    pub fn number(self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.attribute(name, Attribute::number(default))
    }

    pub fn boolean(self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.attribute(name, Attribute::boolean(default))
    }

    pub fn uid(self, name: impl Into<String>) -> Self {
        self.attribute(name, Attribute::uid())
    }

    pub fn relation(self, name: impl Into<String>, spec: RelationSpec) -> Self {
        self.field(name, move || FieldSpec::Relation(spec.clone()))
    }

    pub fn has_one(
        self,
        name: impl Into<String>,
        related: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.relation(name, RelationSpec::has_one(related, foreign_key))
    }

    pub fn belongs_to(
        self,
        name: impl Into<String>,
        related: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.relation(name, RelationSpec::belongs_to(related, foreign_key))
    }

    pub fn has_many(
        self,
        name: impl Into<String>,
        related: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.relation(name, RelationSpec::has_many(related, foreign_key))
    }

    pub fn has_many_by(
        self,
        name: impl Into<String>,
        related: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.relation(name, RelationSpec::has_many_by(related, foreign_key))
    }

    pub fn morph_one(
        self,
        name: impl Into<String>,
        related: impl Into<String>,
        id: impl Into<String>,
        type_field: impl Into<String>,
    ) -> Self {
        self.relation(name, RelationSpec::morph_one(related, id, type_field))
    }

    pub fn morph_many(
        self,
        name: impl Into<String>,
        related: impl Into<String>,
        id: impl Into<String>,
        type_field: impl Into<String>,
    ) -> Self {
        self.relation(name, RelationSpec::morph_many(related, id, type_field))
    }

    pub fn morph_to<I, S>(
        self,
        name: impl Into<String>,
        candidates: I,
        id: impl Into<String>,
        type_field: impl Into<String>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relation(name, RelationSpec::morph_to(candidates, id, type_field))
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn key(&self) -> &PrimaryKey {
        &self.primary_key
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn validate(&self) -> Result<(), RelmapError> {
        if self.entity.trim().is_empty() {
            return Err(RelmapError::InvalidModel(
                "entity name must not be empty".into(),
            ));
        }
        let key_names = self.primary_key.names();
        if key_names.is_empty() {
            return Err(RelmapError::InvalidModel(format!(
                "entity '{}' declares an empty composite key",
                self.entity
            )));
        }
        if key_names.iter().any(|name| name.trim().is_empty()) {
            return Err(RelmapError::InvalidModel(format!(
                "entity '{}' has an empty primary key field name",
                self.entity
            )));
        }
        let mut seen = HashSet::new();
        for (name, factory) in &self.fields {
            if name.trim().is_empty() {
                return Err(RelmapError::InvalidModel(format!(
                    "entity '{}' has a field with an empty name",
                    self.entity
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(RelmapError::InvalidModel(format!(
                    "entity '{}' declares field '{}' more than once",
                    self.entity, name
                )));
            }
            if let FieldSpec::Relation(spec) = factory() {
                spec.validate(&self.entity, name)?;
            }
        }
        Ok(())
    }

    /// Evaluates every factory and resolves relation key defaults.
    pub(crate) fn boot(&self, registry: &Registry) -> Result<Schema, RelmapError> {
        let mut fields = Vec::with_capacity(self.fields.len());
        for (name, factory) in &self.fields {
            let def = match factory() {
                FieldSpec::Attribute(attribute) => FieldDef::Attribute(attribute),
                FieldSpec::Relation(spec) => {
                    FieldDef::Relation(spec.resolve(&self.primary_key, registry)?)
                }
            };
            fields.push((name.clone(), def));
        }
        Ok(Schema::new(
            self.entity.clone(),
            self.primary_key.clone(),
            fields,
        ))
    }
}

impl fmt::Debug for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSpec")
            .field("entity", &self.entity)
            .field("primary_key", &self.primary_key)
            .field("fields", &self.field_names().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldDef {
    Attribute(Attribute),
    Relation(Relation),
}

/// Booted, immutable field definitions of one entity, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    entity: String,
    primary_key: PrimaryKey,
    fields: Vec<(String, FieldDef)>,
    index: HashMap<String, usize>,
}

impl Schema {
    pub fn new(entity: String, primary_key: PrimaryKey, fields: Vec<(String, FieldDef)>) -> Self {
        let index = fields
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.clone(), i))
            .collect();
        Self {
            entity,
            primary_key,
            fields,
            index,
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn primary_key(&self) -> &PrimaryKey {
        &self.primary_key
    }

    pub fn has_composite_key(&self) -> bool {
        self.primary_key.is_composite()
    }

    pub fn key_names(&self) -> SmallVec<[&str; 2]> {
        self.primary_key.names()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldDef)> {
        self.fields.iter().map(|(name, def)| (name.as_str(), def))
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.index.get(name).map(|&i| &self.fields[i].1)
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        match self.field(name) {
            Some(FieldDef::Attribute(attribute)) => Some(attribute),
            _ => None,
        }
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Attribute)> {
        self.fields().filter_map(|(name, def)| match def {
            FieldDef::Attribute(attribute) => Some((name, attribute)),
            FieldDef::Relation(_) => None,
        })
    }

    pub fn relations(&self) -> impl Iterator<Item = (&str, &Relation)> {
        self.fields().filter_map(|(name, def)| match def {
            FieldDef::Relation(relation) => Some((name, relation)),
            FieldDef::Attribute(_) => None,
        })
    }

    pub fn is_relation(&self, name: &str) -> bool {
        matches!(self.field(name), Some(FieldDef::Relation(_)))
    }

    pub fn relation(&self, name: &str) -> Result<&Relation, RelmapError> {
        match self.field(name) {
            Some(FieldDef::Relation(relation)) => Ok(relation),
            _ => Err(RelmapError::UnknownRelation {
                entity: self.entity.clone(),
                relation: name.to_string(),
            }),
        }
    }

    /// Computes the Index ID of `element` from its primary key field(s).
    pub fn index_id(&self, element: &Element) -> Result<IndexId, RelmapError> {
        match &self.primary_key {
            PrimaryKey::Single(name) => match element.get(name) {
                Some(value) if !value.is_null() => Ok(value.to_key_string()),
                _ => Err(RelmapError::MissingKey {
                    entity: self.entity.clone(),
                    fields: vec![name.clone()],
                }),
            },
            PrimaryKey::Composite(names) => {
                let mut values = Vec::with_capacity(names.len());
                let mut missing = Vec::new();
                for name in names {
                    match element.get(name) {
                        Some(value) if !value.is_null() => values.push(value.clone()),
                        _ => missing.push(name.clone()),
                    }
                }
                if !missing.is_empty() {
                    return Err(RelmapError::MissingKey {
                        entity: self.entity.clone(),
                        fields: missing,
                    });
                }
                Ok(Value::List(values).to_key_json())
            }
        }
    }

    /// Index ID for a key value supplied by a caller. Composite keys take a
    /// list with one value per key field.
    pub fn key_to_index_id(&self, key: &Value) -> Result<IndexId, RelmapError> {
        match (&self.primary_key, key) {
            (_, Value::Null) => Err(RelmapError::InvalidKey {
                entity: self.entity.clone(),
                reason: "key must not be null".into(),
            }),
            (PrimaryKey::Single(_), value) => Ok(value.to_key_string()),
            (PrimaryKey::Composite(names), Value::List(values)) => {
                if values.len() != names.len() || values.iter().any(Value::is_null) {
                    return Err(RelmapError::InvalidKey {
                        entity: self.entity.clone(),
                        reason: format!(
                            "expected {} non-null key values for {:?}, got {}",
                            names.len(),
                            names,
                            values.len()
                        ),
                    });
                }
                Ok(key.to_key_json())
            }
            (PrimaryKey::Composite(names), other) => Err(RelmapError::InvalidKey {
                entity: self.entity.clone(),
                reason: format!(
                    "composite key {:?} requires a list of values, got {}",
                    names,
                    other.kind()
                ),
            }),
        }
    }

    /// Index IDs for a key that may name several records: a list of values
    /// on a single key, or a list of tuples on a composite key. A lone
    /// composite tuple names one record.
    pub fn key_to_index_ids(&self, key: &Value) -> Result<BTreeSet<IndexId>, RelmapError> {
        match (&self.primary_key, key) {
            (PrimaryKey::Single(_), Value::List(values)) => {
                values.iter().map(|value| self.key_to_index_id(value)).collect()
            }
            (PrimaryKey::Composite(_), Value::List(values))
                if !values.is_empty() && values.iter().all(|v| matches!(v, Value::List(_))) =>
            {
                values.iter().map(|tuple| self.key_to_index_id(tuple)).collect()
            }
            (_, key) => Ok(BTreeSet::from([self.key_to_index_id(key)?])),
        }
    }

    /// Every attribute of the schema, coerced, with defaults for absent ones.
    pub fn fill(&self, record: &Element, uids: &dyn UidGenerator) -> Element {
        self.attributes()
            .map(|(name, attribute)| (name.to_string(), attribute.make(record.get(name), uids)))
            .collect()
    }

    /// Only the attributes present in `record`, coerced.
    pub fn sanitize(&self, record: &Element, uids: &dyn UidGenerator) -> Element {
        self.attributes()
            .filter_map(|(name, attribute)| {
                record
                    .get(name)
                    .map(|raw| (name.to_string(), attribute.make(Some(raw), uids)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{ModelSpec, PrimaryKey};
    use crate::attribute::SequenceUidGenerator;
    use crate::error::RelmapErrorCode;
    use crate::registry::Registry;
    use crate::value::{Value, element};
    use serde_json::json;

    fn boot(spec: ModelSpec) -> super::Schema {
        let registry = Registry::new();
        registry.register(spec.clone()).expect("register");
        spec.boot(&registry).expect("boot")
    }

    #[test]
    fn single_key_index_id_uses_loose_string_form() {
        let schema = boot(ModelSpec::new("users").attr("id", Value::Null));
        assert_eq!(schema.index_id(&element(json!({ "id": 1 }))).unwrap(), "1");
        assert_eq!(schema.index_id(&element(json!({ "id": "a" }))).unwrap(), "a");
    }

    #[test]
    fn composite_key_index_id_is_json_array() {
        let schema = boot(
            ModelSpec::new("memberships")
                .composite_key(["idA", "idB"])
                .attr("idA", Value::Null)
                .attr("idB", Value::Null),
        );
        let id = schema
            .index_id(&element(json!({ "idA": 1, "idB": 2 })))
            .unwrap();
        assert_eq!(id, "[1,2]");

        let err = schema
            .index_id(&element(json!({ "idA": 1 })))
            .unwrap_err();
        assert_eq!(err.code(), RelmapErrorCode::MissingKey);
    }

    #[test]
    fn missing_or_null_key_is_rejected() {
        let schema = boot(ModelSpec::new("users").attr("id", Value::Null));
        let err = schema.index_id(&element(json!({ "id": null }))).unwrap_err();
        assert_eq!(err.code_str(), "missing_key");
    }

    #[test]
    fn key_to_index_id_checks_composite_arity() {
        let schema = boot(ModelSpec::new("pairs").composite_key(["a", "b"]));
        assert_eq!(
            schema.key_to_index_id(&Value::from(vec![1, 2])).unwrap(),
            "[1,2]"
        );
        let err = schema.key_to_index_id(&Value::from(vec![1])).unwrap_err();
        assert_eq!(err.code(), RelmapErrorCode::InvalidKey);
        assert!(schema.key_to_index_id(&Value::Integer(1)).is_err());
    }

    #[test]
    fn key_lists_expand_to_one_index_id_per_record() {
        let users = boot(ModelSpec::new("users").attr("id", Value::Null));
        let ids = users.key_to_index_ids(&Value::from(vec![1, 2])).unwrap();
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec!["1", "2"]);

        let pairs = boot(ModelSpec::new("pairs").composite_key(["a", "b"]));
        let one = pairs.key_to_index_ids(&Value::from(vec![1, 2])).unwrap();
        assert_eq!(one.into_iter().collect::<Vec<_>>(), vec!["[1,2]"]);
        let many = pairs
            .key_to_index_ids(&Value::from(json!([[1, 2], [3, 4]])))
            .unwrap();
        assert_eq!(many.into_iter().collect::<Vec<_>>(), vec!["[1,2]", "[3,4]"]);
    }

    #[test]
    fn validate_rejects_duplicate_fields() {
        let spec = ModelSpec::new("users")
            .attr("id", Value::Null)
            .string("id", "");
        assert_eq!(
            spec.validate().unwrap_err().code(),
            RelmapErrorCode::InvalidModel
        );
        assert!(ModelSpec::new("").validate().is_err());
        assert!(
            ModelSpec::new("x")
                .composite_key(Vec::<String>::new())
                .validate()
                .is_err()
        );
    }

    #[test]
    fn fill_applies_defaults_and_sanitize_keeps_present_fields() {
        let schema = boot(
            ModelSpec::new("users")
                .uid("id")
                .string("name", "anon")
                .number("age", 0)
                .has_many("posts", "users", "userId"),
        );
        let uids = SequenceUidGenerator::new(["uid1"]);
        let filled = schema.fill(&element(json!({ "age": "30" })), &uids);
        assert_eq!(filled.get("id"), Some(&Value::from("uid1")));
        assert_eq!(filled.get("name"), Some(&Value::from("anon")));
        assert_eq!(filled.get("age"), Some(&Value::Integer(30)));
        assert!(!filled.contains_key("posts"));

        let sanitized = schema.sanitize(&element(json!({ "name": 5, "extra": 1 })), &uids);
        assert_eq!(sanitized.len(), 1);
        assert_eq!(sanitized.get("name"), Some(&Value::from("5")));
        assert_eq!(uids.remaining(), 0);
    }

    #[test]
    fn unknown_relation_is_reported_by_name() {
        let schema = boot(ModelSpec::new("users").attr("id", Value::Null));
        let err = schema.relation("posts").unwrap_err();
        assert_eq!(
            err.to_string(),
            "relationship 'posts' on model 'users' not found"
        );
        assert_eq!(schema.primary_key(), &PrimaryKey::Single("id".into()));
    }
}
