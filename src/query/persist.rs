use super::Query;
use crate::error::RelmapError;
use crate::model::Model;
use crate::normalizer::Normalized;
use crate::store::Mutation;
use crate::value::{Element, Elements, IndexId, Value};
use futures::future::try_join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Persisted models grouped by entity name.
pub type Collections = BTreeMap<String, Vec<Model>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PersistMethod {
    Insert,
    Fresh,
    Update,
}

impl PersistMethod {
    fn as_str(self) -> &'static str {
        match self {
            PersistMethod::Insert => "insert",
            PersistMethod::Fresh => "fresh",
            PersistMethod::Update => "update",
        }
    }
}

impl<'a> Query<'a> {
    /// Decomposes `records` and inserts every discovered element, filled
    /// with defaults, alongside existing data.
    pub async fn insert(&self, records: impl Into<Value>) -> Result<Collections, RelmapError> {
        self.persist(PersistMethod::Insert, records.into()).await
    }

    /// Like [`Query::insert`], but each discovered entity's prior data is
    /// discarded first.
    pub async fn fresh(&self, records: impl Into<Value>) -> Result<Collections, RelmapError> {
        self.persist(PersistMethod::Fresh, records.into()).await
    }

    /// Decomposes `records` and merges the fields onto elements already
    /// stored. Elements with no stored counterpart are skipped.
    pub async fn update(&self, records: impl Into<Value>) -> Result<Collections, RelmapError> {
        self.persist(PersistMethod::Update, records.into()).await
    }

    /// Inserts already decomposed records of this entity without
    /// normalizing them.
    pub async fn add(&self, records: Vec<Element>) -> Result<Vec<Model>, RelmapError> {
        let models = self.hydrate_all(&records);
        self.commit(Mutation::Insert(compile(&models)?))?;
        Ok(models)
    }

    /// Replaces this entity's data with already decomposed records.
    pub async fn replace(&self, records: Vec<Element>) -> Result<Vec<Model>, RelmapError> {
        let models = self.hydrate_all(&records);
        self.commit(Mutation::Replace(compile(&models)?))?;
        Ok(models)
    }

    /// Merges already decomposed records into stored elements of this
    /// entity, picked by Index ID.
    pub async fn merge(&self, records: Vec<Element>) -> Result<Vec<Model>, RelmapError> {
        let uids = self.db.config().uid_generator.as_ref();
        let mut models = Vec::with_capacity(records.len());
        for record in &records {
            let id = self.schema.index_id(record)?;
            let Some(stored) = self.db.store().find(self.entity(), &id) else {
                continue;
            };
            let mut model = Model::hydrate(Arc::clone(&self.schema), &stored, uids);
            model.fill(record, uids);
            models.push(model);
        }
        if !models.is_empty() {
            self.commit(Mutation::Update(compile(&models)?))?;
        }
        Ok(models)
    }

    /// Decomposes `records` and writes every element: present fields are
    /// merged over stored elements, new elements are filled with defaults.
    /// Returns the reference tree of the decomposition.
    pub async fn save(&self, records: impl Into<Value>) -> Result<Value, RelmapError> {
        let normalized = self.db.normalize(self.entity(), &records.into())?;
        for (entity, elements) in normalized.entities {
            self.new_query(&entity)?.save_elements(elements)?;
        }
        Ok(normalized.result)
    }

    fn save_elements(&self, elements: Elements) -> Result<(), RelmapError> {
        let uids = self.db.config().uid_generator.as_ref();
        let stored = self.db.store().read(self.entity());
        let merged = elements
            .into_iter()
            .map(|(id, element)| {
                let element = match stored.get(&id) {
                    Some(existing) => {
                        let mut existing = existing.clone();
                        existing.extend(self.schema.sanitize(&element, uids));
                        existing
                    }
                    None => self.schema.fill(&element, uids),
                };
                (id, element)
            })
            .collect();
        self.commit(Mutation::Insert(merged))?;
        Ok(())
    }

    /// Applies `record` to every model matched by the query chain and writes
    /// the results back.
    pub async fn revise(&self, record: impl Into<Value>) -> Result<Vec<Model>, RelmapError> {
        let record = match record.into() {
            Value::Record(record) => record,
            _ => Element::new(),
        };
        let uids = self.db.config().uid_generator.as_ref();
        let mut models = self.get()?;
        for model in &mut models {
            model.fill(&record, uids);
        }
        if !models.is_empty() {
            self.commit(Mutation::Update(compile(&models)?))?;
        }
        Ok(models)
    }

    /// Persists a model built purely from defaults, generating uids.
    pub async fn new_record(&self) -> Result<Model, RelmapError> {
        let uids = self.db.config().uid_generator.as_ref();
        let model = Model::hydrate(Arc::clone(&self.schema), &Element::new(), uids);
        self.commit(Mutation::Insert(compile(std::slice::from_ref(&model))?))?;
        Ok(model)
    }

    /// Builds a model, nested relations included, without persisting it.
    pub fn make(&self, record: impl Into<Value>) -> Result<Model, RelmapError> {
        let record = match record.into() {
            Value::Record(record) => record,
            _ => Element::new(),
        };
        Model::make(
            self.db.registry(),
            Arc::clone(&self.schema),
            &record,
            self.db.config().uid_generator.as_ref(),
        )
    }

    /// Deletes by primary key. Composite keys are rejected before anything is
    /// touched; use [`Query::delete`] for those.
    pub fn destroy(&self, key: impl Into<Value>) -> Result<Option<IndexId>, RelmapError> {
        Ok(self.destroy_many([key])?.into_iter().next())
    }

    pub fn destroy_many<I, V>(&self, keys: I) -> Result<Vec<IndexId>, RelmapError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        if self.schema.has_composite_key() {
            return Err(RelmapError::CompositeKeyUnsupported {
                entity: self.entity().to_string(),
            });
        }
        let ids = keys
            .into_iter()
            .map(|key| self.schema.key_to_index_id(&key.into()))
            .collect::<Result<Vec<_>, _>>()?;
        self.commit(Mutation::Delete(ids))
    }

    /// Deletes whatever the query chain currently matches.
    pub fn delete(&self) -> Result<Vec<IndexId>, RelmapError> {
        let models = self.select();
        if models.is_empty() {
            return Ok(Vec::new());
        }
        let ids = models
            .iter()
            .map(Model::index_id)
            .collect::<Result<Vec<_>, _>>()?;
        self.commit(Mutation::Delete(ids))
    }

    /// Clears the whole collection, returning the removed Index IDs.
    pub fn flush(&self) -> Result<Vec<IndexId>, RelmapError> {
        self.commit(Mutation::Clear)
    }

    pub fn delete_all(&self) -> Result<Vec<IndexId>, RelmapError> {
        self.flush()
    }

    fn commit(&self, mutation: Mutation) -> Result<Vec<IndexId>, RelmapError> {
        Ok(self.db.store().commit(self.entity(), mutation)?.affected)
    }

    fn hydrate_all(&self, records: &[Element]) -> Vec<Model> {
        let uids = self.db.config().uid_generator.as_ref();
        records
            .iter()
            .map(|record| Model::hydrate(Arc::clone(&self.schema), record, uids))
            .collect()
    }

    async fn persist_elements(
        &self,
        method: PersistMethod,
        elements: Elements,
    ) -> Result<Vec<Model>, RelmapError> {
        let records: Vec<Element> = elements.into_values().collect();
        match method {
            PersistMethod::Insert => self.add(records).await,
            PersistMethod::Fresh => self.replace(records).await,
            PersistMethod::Update => self.merge(records).await,
        }
    }

    async fn persist(&self, method: PersistMethod, records: Value) -> Result<Collections, RelmapError> {
        let Normalized { entities, .. } = self.db.normalize(self.entity(), &records)?;
        debug!(
            entity = self.entity(),
            method = method.as_str(),
            entities = entities.len(),
            "persisting normalized records"
        );
        let mut queries = Vec::with_capacity(entities.len());
        for (entity, elements) in entities {
            queries.push((self.new_query(&entity)?, elements));
        }

        let mut collections = Collections::new();
        if self.db.config().parallel_persist {
            let writes = queries.into_iter().map(|(query, elements)| async move {
                let models = query.persist_elements(method, elements).await?;
                Ok::<_, RelmapError>((query.entity().to_string(), models))
            });
            collections.extend(try_join_all(writes).await?);
        } else {
            for (query, elements) in queries {
                let models = query.persist_elements(method, elements).await?;
                collections.insert(query.entity().to_string(), models);
            }
        }
        Ok(collections)
    }
}

/// Keys models by Index ID, ready to commit.
fn compile(models: &[Model]) -> Result<Elements, RelmapError> {
    models
        .iter()
        .map(|model| Ok((model.index_id()?, model.attributes().clone())))
        .collect()
}
