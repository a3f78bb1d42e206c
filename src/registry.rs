use crate::error::RelmapError;
use crate::normalizer::NormalizationSchema;
use crate::relation::{Relation, Relationship};
use crate::schema::{ModelSpec, PrimaryKey, Schema};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

type NormalizationKey = (String, Option<String>);

/// Entity registry: declarations, booted schemas and the caches derived from
/// them. Passed explicitly to every component that resolves fields.
#[derive(Default)]
pub struct Registry {
    specs: RwLock<BTreeMap<String, ModelSpec>>,
    schemas: RwLock<HashMap<String, Arc<Schema>>>,
    normalization: RwLock<HashMap<NormalizationKey, Arc<NormalizationSchema>>>,
    morph_types: RwLock<BTreeMap<(String, String), BTreeSet<String>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and stores a declaration. Booted state is dropped because
    /// relation key defaults may depend on the replaced declaration.
    pub fn register(&self, spec: ModelSpec) -> Result<(), RelmapError> {
        spec.validate()?;
        let entity = spec.entity().to_string();
        let replaced = self.specs.write().insert(entity.clone(), spec).is_some();
        self.schemas.write().clear();
        self.normalization.write().clear();
        debug!(entity = entity.as_str(), replaced, "registered model");
        Ok(())
    }

    pub fn is_registered(&self, entity: &str) -> bool {
        self.specs.read().contains_key(entity)
    }

    pub fn entities(&self) -> Vec<String> {
        self.specs.read().keys().cloned().collect()
    }

    pub fn spec(&self, entity: &str) -> Result<ModelSpec, RelmapError> {
        self.specs
            .read()
            .get(entity)
            .cloned()
            .ok_or_else(|| RelmapError::unregistered(entity))
    }

    /// Primary key straight from the declaration, without booting.
    pub fn primary_key(&self, entity: &str) -> Result<PrimaryKey, RelmapError> {
        self.specs
            .read()
            .get(entity)
            .map(|spec| spec.key().clone())
            .ok_or_else(|| RelmapError::unregistered(entity))
    }

    /// Booted schema for `entity`, built once and memoized until reset.
    pub fn schema(&self, entity: &str) -> Result<Arc<Schema>, RelmapError> {
        if let Some(schema) = self.schemas.read().get(entity) {
            return Ok(Arc::clone(schema));
        }
        let spec = self.spec(entity)?;
        let schema = Arc::new(spec.boot(self)?);
        debug!(entity, fields = schema.fields().count(), "booted schema");
        let mut schemas = self.schemas.write();
        Ok(Arc::clone(schemas.entry(entity.to_string()).or_insert(schema)))
    }

    /// Decomposition rules for `entity` reached through `parent`. Cached per
    /// (entity, parent) pair since attach resolves the parent's fields.
    pub fn normalization_schema(
        &self,
        entity: &str,
        parent: Option<&str>,
    ) -> Result<Arc<NormalizationSchema>, RelmapError> {
        let key = (entity.to_string(), parent.map(str::to_string));
        if let Some(cached) = self.normalization.read().get(&key) {
            return Ok(Arc::clone(cached));
        }
        let schema = self.schema(entity)?;
        let parent_schema = parent.map(|p| self.schema(p)).transpose()?;
        let built = Arc::new(NormalizationSchema::build(schema, parent_schema));
        let mut cache = self.normalization.write();
        Ok(Arc::clone(cache.entry(key).or_insert(built)))
    }

    pub fn normalization_cache_len(&self) -> usize {
        self.normalization.read().len()
    }

    pub(crate) fn observe_morph_type(&self, entity: &str, field: &str, related: &str) {
        let key = (entity.to_string(), field.to_string());
        let known = self
            .morph_types
            .read()
            .get(&key)
            .is_some_and(|seen| seen.contains(related));
        if known {
            return;
        }
        self.morph_types
            .write()
            .entry(key)
            .or_default()
            .insert(related.to_string());
    }

    /// Entities `field` on `entity` may decompose into: the declared ones plus,
    /// for morph-to, every discriminator value observed so far.
    pub fn related_entities(
        &self,
        entity: &str,
        field: &str,
    ) -> Result<BTreeSet<String>, RelmapError> {
        let schema = self.schema(entity)?;
        let relation = schema.relation(field)?;
        let mut related: BTreeSet<String> = relation.related_entities().into_iter().collect();
        if let Relation::MorphTo(_) = relation {
            let key = (entity.to_string(), field.to_string());
            if let Some(seen) = self.morph_types.read().get(&key) {
                related.extend(seen.iter().cloned());
            }
        }
        Ok(related)
    }

    /// Drops booted schemas, normalization schemas and observed morph types.
    /// Declarations stay registered.
    pub fn reset(&self) {
        let schemas = {
            let mut schemas = self.schemas.write();
            let n = schemas.len();
            schemas.clear();
            n
        };
        self.normalization.write().clear();
        self.morph_types.write().clear();
        info!(schemas, "registry reset");
    }
}
