pub mod attribute;
pub mod config;
pub mod database;
pub mod error;
#[cfg(test)]
mod lib_tests;
pub mod model;
pub mod normalizer;
pub mod query;
pub mod registry;
pub mod relation;
pub mod repository;
pub mod schema;
pub mod store;
pub mod value;

pub use attribute::{Attribute, AttributeKind, SequenceUidGenerator, UidGenerator, UuidGenerator};
pub use config::RelmapConfig;
pub use database::Database;
pub use error::{RelmapError, RelmapErrorCode};
pub use model::{Model, Related};
pub use normalizer::{ID_FIELD, Normalized, Normalizer};
pub use query::{Collections, Order, Query};
pub use registry::Registry;
pub use relation::{Relation, RelationKind, RelationSpec, Relationship};
pub use repository::{Repository, RepositoryError, TryFromModel};
pub use schema::{ModelSpec, PrimaryKey, Schema};
pub use store::{MemoryStore, Mutation, MutationOutcome, Store};
pub use value::{Element, Elements, IndexId, Value, element};
