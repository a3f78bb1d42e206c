use crate::attribute::{SequenceUidGenerator, UidGenerator, UuidGenerator};
use std::fmt;
use std::sync::Arc;

/// Runtime configuration for a relmap [`Database`](crate::Database).
#[derive(Clone)]
pub struct RelmapConfig {
    /// Connection name prefixed to store mutation labels.
    pub namespace: String,
    /// Depth `with_all_recursive(None)` expands to.
    pub default_recursion_depth: usize,
    /// Cap on unbounded recursive eager loads. `None` disables it, in which
    /// case cyclic data never terminates.
    pub max_recursion_depth: Option<usize>,
    /// Await per-entity writes concurrently. When false they run one after
    /// another in entity-name order.
    pub parallel_persist: bool,
    pub uid_generator: Arc<dyn UidGenerator>,
}

impl Default for RelmapConfig {
    fn default() -> Self {
        Self {
            namespace: "entities".to_string(),
            default_recursion_depth: 3,
            max_recursion_depth: Some(64),
            parallel_persist: true,
            uid_generator: Arc::new(UuidGenerator),
        }
    }
}

impl RelmapConfig {
    /// Deterministic profile: uids come from `uids` in order and writes are
    /// sequential.
    pub fn testing<I, S>(uids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            parallel_persist: false,
            uid_generator: Arc::new(SequenceUidGenerator::new(uids)),
            ..Self::default()
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_default_recursion_depth(mut self, depth: usize) -> Self {
        self.default_recursion_depth = depth;
        self
    }

    pub fn with_max_recursion_depth(mut self, depth: Option<usize>) -> Self {
        self.max_recursion_depth = depth;
        self
    }

    pub fn with_parallel_persist(mut self, enabled: bool) -> Self {
        self.parallel_persist = enabled;
        self
    }

    pub fn with_uid_generator(mut self, generator: Arc<dyn UidGenerator>) -> Self {
        self.uid_generator = generator;
        self
    }
}

impl fmt::Debug for RelmapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelmapConfig")
            .field("namespace", &self.namespace)
            .field("default_recursion_depth", &self.default_recursion_depth)
            .field("max_recursion_depth", &self.max_recursion_depth)
            .field("parallel_persist", &self.parallel_persist)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::RelmapConfig;

    #[test]
    fn testing_profile_is_sequential_and_deterministic() {
        let config = RelmapConfig::testing(["uid1", "uid2"]);
        assert!(!config.parallel_persist);
        assert_eq!(config.uid_generator.generate(), "uid1");
        assert_eq!(config.uid_generator.generate(), "uid2");
        assert_eq!(config.namespace, "entities");
    }

    #[test]
    fn setters_override_defaults() {
        let config = RelmapConfig::default()
            .with_namespace("orm")
            .with_max_recursion_depth(None)
            .with_default_recursion_depth(1);
        assert_eq!(config.namespace, "orm");
        assert_eq!(config.max_recursion_depth, None);
        assert_eq!(config.default_recursion_depth, 1);
        assert!(format!("{config:?}").contains("orm"));
    }
}
