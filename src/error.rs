use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelmapErrorCode {
    MissingKey,
    UnknownRelation,
    CompositeKeyUnsupported,
    UnregisteredModel,
    InvalidModel,
    InvalidKey,
    Store,
}

impl RelmapErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            RelmapErrorCode::MissingKey => "missing_key",
            RelmapErrorCode::UnknownRelation => "unknown_relation",
            RelmapErrorCode::CompositeKeyUnsupported => "composite_key_unsupported",
            RelmapErrorCode::UnregisteredModel => "unregistered_model",
            RelmapErrorCode::InvalidModel => "invalid_model",
            RelmapErrorCode::InvalidKey => "invalid_key",
            RelmapErrorCode::Store => "store",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelmapError {
    #[error("missing primary key for entity '{entity}': field(s) {fields:?} absent")]
    MissingKey { entity: String, fields: Vec<String> },
    #[error("relationship '{relation}' on model '{entity}' not found")]
    UnknownRelation { entity: String, relation: String },
    #[error(
        "destroy is not supported on '{entity}' because it has a composite key; use delete instead"
    )]
    CompositeKeyUnsupported { entity: String },
    #[error("{}", unregistered_message(.entity))]
    UnregisteredModel { entity: Option<String> },
    #[error("invalid model definition: {0}")]
    InvalidModel(String),
    #[error("invalid key for entity '{entity}': {reason}")]
    InvalidKey { entity: String, reason: String },
    #[error("store error: {0}")]
    Store(String),
}

fn unregistered_message(entity: &Option<String>) -> String {
    match entity {
        Some(entity) => format!("model '{entity}' is not registered"),
        None => "repository has no model bound to it".to_string(),
    }
}

impl RelmapError {
    pub fn code(&self) -> RelmapErrorCode {
        match self {
            RelmapError::MissingKey { .. } => RelmapErrorCode::MissingKey,
            RelmapError::UnknownRelation { .. } => RelmapErrorCode::UnknownRelation,
            RelmapError::CompositeKeyUnsupported { .. } => RelmapErrorCode::CompositeKeyUnsupported,
            RelmapError::UnregisteredModel { .. } => RelmapErrorCode::UnregisteredModel,
            RelmapError::InvalidModel(_) => RelmapErrorCode::InvalidModel,
            RelmapError::InvalidKey { .. } => RelmapErrorCode::InvalidKey,
            RelmapError::Store(_) => RelmapErrorCode::Store,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }

    pub(crate) fn unregistered(entity: impl Into<String>) -> Self {
        RelmapError::UnregisteredModel {
            entity: Some(entity.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RelmapError, RelmapErrorCode};

    #[test]
    fn error_code_strings_are_stable() {
        assert_eq!(RelmapErrorCode::MissingKey.as_str(), "missing_key");
        assert_eq!(
            RelmapErrorCode::CompositeKeyUnsupported.as_str(),
            "composite_key_unsupported"
        );
        assert_eq!(
            RelmapErrorCode::UnregisteredModel.as_str(),
            "unregistered_model"
        );
    }

    #[test]
    fn error_code_str_matches_variant_mapping() {
        let err = RelmapError::UnknownRelation {
            entity: "users".into(),
            relation: "posts".into(),
        };
        assert_eq!(err.code(), RelmapErrorCode::UnknownRelation);
        assert_eq!(err.code_str(), "unknown_relation");
        assert_eq!(
            err.to_string(),
            "relationship 'posts' on model 'users' not found"
        );
    }

    #[test]
    fn unbound_repository_message_is_readable() {
        let err = RelmapError::UnregisteredModel { entity: None };
        assert_eq!(err.to_string(), "repository has no model bound to it");
        assert_eq!(
            RelmapError::unregistered("users").to_string(),
            "model 'users' is not registered"
        );
    }
}
