use crate::error::RelmapError;
use crate::value::{Element, Elements, IndexId};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Point-in-time view of one entity's collection. Cloning is cheap: the
/// underlying map shares structure with the store.
pub type Collection = im::OrdMap<IndexId, Element>;

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Adds or replaces elements by Index ID.
    Insert(Elements),
    /// Merges fields into existing elements; unknown ids are inserted.
    Update(Elements),
    /// Clears the collection, then inserts.
    Replace(Elements),
    Delete(Vec<IndexId>),
    Clear,
}

impl Mutation {
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::Insert(_) => "insert",
            Mutation::Update(_) => "update",
            Mutation::Replace(_) => "replace",
            Mutation::Delete(_) => "delete",
            Mutation::Clear => "clear",
        }
    }

    fn len(&self) -> usize {
        match self {
            Mutation::Insert(e) | Mutation::Update(e) | Mutation::Replace(e) => e.len(),
            Mutation::Delete(ids) => ids.len(),
            Mutation::Clear => 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationOutcome {
    /// Ids written, or removed for `Delete` and `Clear`.
    pub affected: Vec<IndexId>,
}

/// Keyed per-entity storage the engine reads snapshots from and commits
/// mutations to. Each commit must be applied atomically.
pub trait Store: Send + Sync {
    fn read(&self, entity: &str) -> Collection;

    fn find(&self, entity: &str, id: &str) -> Option<Element> {
        self.read(entity).get(id).cloned()
    }

    fn commit(&self, entity: &str, mutation: Mutation) -> Result<MutationOutcome, RelmapError>;
}

/// In-process reference store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    namespace: String,
    entities: RwLock<HashMap<String, Collection>>,
}

impl MemoryStore {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            entities: RwLock::new(HashMap::new()),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Seeds `entity` with raw elements, bypassing normalization.
    pub fn fill(&self, entity: &str, elements: Elements) {
        let mut entities = self.entities.write();
        let collection = entities.entry(entity.to_string()).or_default();
        for (id, element) in elements {
            collection.insert(id, element);
        }
    }

    /// Whole state, entity by entity.
    pub fn dump(&self) -> BTreeMap<String, Elements> {
        self.entities
            .read()
            .iter()
            .map(|(entity, collection)| {
                let elements = collection
                    .iter()
                    .map(|(id, element)| (id.clone(), element.clone()))
                    .collect();
                (entity.clone(), elements)
            })
            .collect()
    }
}

impl Store for MemoryStore {
    fn read(&self, entity: &str) -> Collection {
        self.entities
            .read()
            .get(entity)
            .cloned()
            .unwrap_or_default()
    }

    fn commit(&self, entity: &str, mutation: Mutation) -> Result<MutationOutcome, RelmapError> {
        debug!(
            mutation = format!("{}/{}/{}", self.namespace, entity, mutation.name()),
            elements = mutation.len(),
            "store commit"
        );
        let mut entities = self.entities.write();
        let collection = entities.entry(entity.to_string()).or_default();
        let affected = match mutation {
            Mutation::Insert(elements) => insert_all(collection, elements),
            Mutation::Replace(elements) => {
                collection.clear();
                insert_all(collection, elements)
            }
            Mutation::Update(elements) => {
                let mut affected = Vec::with_capacity(elements.len());
                for (id, fields) in elements {
                    match collection.get_mut(&id) {
                        Some(existing) => existing.extend(fields),
                        None => {
                            collection.insert(id.clone(), fields);
                        }
                    }
                    affected.push(id);
                }
                affected
            }
            Mutation::Delete(ids) => ids
                .into_iter()
                .filter(|id| collection.remove(id).is_some())
                .collect(),
            Mutation::Clear => {
                let removed = collection.keys().cloned().collect();
                collection.clear();
                removed
            }
        };
        Ok(MutationOutcome { affected })
    }
}

fn insert_all(collection: &mut Collection, elements: Elements) -> Vec<IndexId> {
    let mut affected = Vec::with_capacity(elements.len());
    for (id, element) in elements {
        collection.insert(id.clone(), element);
        affected.push(id);
    }
    affected
}

#[cfg(test)]
mod tests {
    use super::{MemoryStore, Mutation, Store};
    use crate::value::{Elements, Value, element};
    use serde_json::json;

    fn elements(items: &[(&str, serde_json::Value)]) -> Elements {
        items
            .iter()
            .map(|(id, v)| (id.to_string(), element(v.clone())))
            .collect()
    }

    #[test]
    fn snapshots_are_isolated_from_later_commits() {
        let store = MemoryStore::new("entities");
        store.fill("users", elements(&[("1", json!({ "id": 1 }))]));
        let before = store.read("users");
        store
            .commit("users", Mutation::Insert(elements(&[("2", json!({ "id": 2 }))])))
            .unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(store.read("users").len(), 2);
    }

    #[test]
    fn update_merges_fields() {
        let store = MemoryStore::new("entities");
        store.fill("users", elements(&[("1", json!({ "id": 1, "name": "A", "age": 3 }))]));
        store
            .commit("users", Mutation::Update(elements(&[("1", json!({ "name": "B" }))])))
            .unwrap();
        let user = store.find("users", "1").unwrap();
        assert_eq!(user.get("name"), Some(&Value::from("B")));
        assert_eq!(user.get("age"), Some(&Value::Integer(3)));
    }

    #[test]
    fn replace_discards_previous_elements() {
        let store = MemoryStore::new("entities");
        store.fill("users", elements(&[("1", json!({ "id": 1 }))]));
        store
            .commit("users", Mutation::Replace(elements(&[("2", json!({ "id": 2 }))])))
            .unwrap();
        assert!(store.find("users", "1").is_none());
        assert!(store.find("users", "2").is_some());
    }

    #[test]
    fn delete_and_clear_report_removed_ids() {
        let store = MemoryStore::new("entities");
        store.fill(
            "users",
            elements(&[("1", json!({ "id": 1 })), ("2", json!({ "id": 2 }))]),
        );
        let out = store
            .commit("users", Mutation::Delete(vec!["1".into(), "9".into()]))
            .unwrap();
        assert_eq!(out.affected, vec!["1".to_string()]);
        let out = store.commit("users", Mutation::Clear).unwrap();
        assert_eq!(out.affected, vec!["2".to_string()]);
        assert!(store.dump()["users"].is_empty());
    }
}
