use crate::database::Database;
use crate::error::RelmapError;
use crate::model::{Model, Related};
use crate::query::{Collections, Query};
use crate::value::{IndexId, Value};

pub trait TryFromModel: Sized {
    fn try_from_model(model: &Model) -> Result<Self, ModelDecodeError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelDecodeError {
    #[error("missing field '{field}' on '{entity}'")]
    MissingField { entity: String, field: String },
    #[error("field '{field}' type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("{message}")]
    Custom { message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Relmap(#[from] RelmapError),
    #[error(transparent)]
    Decode(#[from] ModelDecodeError),
}

/// Entity-scoped facade over [`Query`]. An unbound repository fails on first
/// use.
#[derive(Debug, Clone)]
pub struct Repository<'a> {
    db: &'a Database,
    entity: Option<String>,
}

impl<'a> Repository<'a> {
    pub fn new(db: &'a Database, entity: impl Into<String>) -> Self {
        Self {
            db,
            entity: Some(entity.into()),
        }
    }

    pub fn unbound(db: &'a Database) -> Self {
        Self { db, entity: None }
    }

    pub fn entity(&self) -> Option<&str> {
        self.entity.as_deref()
    }

    pub fn query(&self) -> Result<Query<'a>, RelmapError> {
        let Some(entity) = self.entity.as_deref() else {
            return Err(RelmapError::UnregisteredModel { entity: None });
        };
        self.db.query(entity)
    }

    pub fn all(&self) -> Result<Vec<Model>, RelmapError> {
        Ok(self.query()?.all())
    }

    pub fn get(&self) -> Result<Vec<Model>, RelmapError> {
        self.query()?.get()
    }

    pub fn first(&self) -> Result<Option<Model>, RelmapError> {
        self.query()?.first()
    }

    pub fn find(&self, key: impl Into<Value>) -> Result<Option<Model>, RelmapError> {
        self.query()?.find(key)
    }

    pub fn get_as<T: TryFromModel>(&self) -> Result<Vec<T>, RepositoryError> {
        let models = self.get()?;
        Ok(decode_models(&models)?)
    }

    pub async fn insert(&self, records: impl Into<Value>) -> Result<Collections, RelmapError> {
        self.query()?.insert(records).await
    }

    pub async fn fresh(&self, records: impl Into<Value>) -> Result<Collections, RelmapError> {
        self.query()?.fresh(records).await
    }

    pub async fn update(&self, records: impl Into<Value>) -> Result<Collections, RelmapError> {
        self.query()?.update(records).await
    }

    pub async fn save(&self, records: impl Into<Value>) -> Result<Value, RelmapError> {
        self.query()?.save(records).await
    }

    pub async fn new_record(&self) -> Result<Model, RelmapError> {
        self.query()?.new_record().await
    }

    pub fn make(&self, record: impl Into<Value>) -> Result<Model, RelmapError> {
        self.query()?.make(record)
    }

    pub fn revive(&self, references: &Value) -> Result<Related, RelmapError> {
        self.query()?.revive(references)
    }

    pub fn destroy(&self, key: impl Into<Value>) -> Result<Option<IndexId>, RelmapError> {
        self.query()?.destroy(key)
    }

    pub fn delete(&self) -> Result<Vec<IndexId>, RelmapError> {
        self.query()?.delete()
    }

    pub fn flush(&self) -> Result<Vec<IndexId>, RelmapError> {
        self.query()?.flush()
    }
}

pub fn decode_models<T: TryFromModel>(models: &[Model]) -> Result<Vec<T>, ModelDecodeError> {
    models.iter().map(T::try_from_model).collect()
}

fn field<'m>(model: &'m Model, name: &str) -> Result<&'m Value, ModelDecodeError> {
    model.get(name).ok_or_else(|| ModelDecodeError::MissingField {
        entity: model.entity().to_string(),
        field: name.to_string(),
    })
}

fn mismatch(name: &str, expected: &'static str, actual: &Value) -> ModelDecodeError {
    ModelDecodeError::TypeMismatch {
        field: name.to_string(),
        expected,
        actual: actual.kind(),
    }
}

pub fn text_at<'m>(model: &'m Model, name: &str) -> Result<&'m str, ModelDecodeError> {
    match field(model, name)? {
        Value::Text(v) => Ok(v.as_str()),
        other => Err(mismatch(name, "Text", other)),
    }
}

pub fn i64_at(model: &Model, name: &str) -> Result<i64, ModelDecodeError> {
    match field(model, name)? {
        Value::Integer(v) => Ok(*v),
        other => Err(mismatch(name, "Integer", other)),
    }
}

/// Integers widen to floats.
pub fn f64_at(model: &Model, name: &str) -> Result<f64, ModelDecodeError> {
    match field(model, name)? {
        Value::Float(v) => Ok(*v),
        Value::Integer(v) => Ok(*v as f64),
        other => Err(mismatch(name, "Float", other)),
    }
}

pub fn bool_at(model: &Model, name: &str) -> Result<bool, ModelDecodeError> {
    match field(model, name)? {
        Value::Boolean(v) => Ok(*v),
        other => Err(mismatch(name, "Boolean", other)),
    }
}
