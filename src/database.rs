use crate::config::RelmapConfig;
use crate::error::RelmapError;
use crate::normalizer::{Normalized, Normalizer};
use crate::query::Query;
use crate::registry::Registry;
use crate::repository::Repository;
use crate::schema::ModelSpec;
use crate::store::{MemoryStore, Store};
use crate::value::Value;
use std::sync::Arc;

/// Everything an operation needs: configuration, the entity registry and the
/// store. Handed to queries and repositories by reference.
pub struct Database {
    config: RelmapConfig,
    registry: Registry,
    store: Arc<dyn Store>,
}

impl Database {
    pub fn new(config: RelmapConfig, store: Arc<dyn Store>) -> Self {
        Self {
            config,
            registry: Registry::new(),
            store,
        }
    }

    /// Backed by a fresh [`MemoryStore`] named after the configured namespace.
    pub fn in_memory(config: RelmapConfig) -> Self {
        let store = Arc::new(MemoryStore::new(config.namespace.clone()));
        Self::new(config, store)
    }

    pub fn register(&self, spec: ModelSpec) -> Result<&Self, RelmapError> {
        self.registry.register(spec)?;
        Ok(self)
    }

    pub fn query(&self, entity: &str) -> Result<Query<'_>, RelmapError> {
        let schema = self.registry.schema(entity)?;
        Ok(Query::new(self, schema))
    }

    pub fn repo(&self, entity: impl Into<String>) -> Repository<'_> {
        Repository::new(self, entity)
    }

    /// Decomposes `input` rooted at `entity` without touching the store.
    pub fn normalize(&self, entity: &str, input: &Value) -> Result<Normalized, RelmapError> {
        Normalizer::new(&self.registry, self.config.uid_generator.as_ref()).normalize(entity, input)
    }

    /// Drops booted registry state. Stored data is left as is.
    pub fn reset(&self) {
        self.registry.reset();
    }

    pub fn config(&self) -> &RelmapConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.config)
            .field("entities", &self.registry.entities())
            .finish_non_exhaustive()
    }
}
