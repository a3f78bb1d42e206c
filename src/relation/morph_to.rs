use super::{Prepare, Relationship, RelationKind, SchemaNode, key_of};
use crate::database::Database;
use crate::error::RelmapError;
use crate::model::{Model, Related};
use crate::query::Query;
use crate::schema::{PrimaryKey, Schema};
use crate::value::{Element, Value};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// Polymorphic inverse: this record names the related entity in `type_field`
/// and its key in `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MorphTo {
    /// Declared candidate entities. Types observed while normalizing are
    /// tracked by the registry.
    pub candidates: Vec<String>,
    pub id: String,
    pub type_field: String,
    pub owner_key: Option<String>,
}

impl MorphTo {
    /// Key on the resolved entity that `id` points at. `None` when the target
    /// has a composite key and no owner key was declared.
    pub fn owner_key_for(&self, target: &Schema) -> Option<String> {
        if let Some(key) = &self.owner_key {
            return Some(key.clone());
        }
        match target.primary_key() {
            PrimaryKey::Single(name) => Some(name.clone()),
            PrimaryKey::Composite(_) => None,
        }
    }

    /// Discriminator value of a stored or incoming record.
    pub fn type_of<'e>(&self, record: &'e Element) -> Option<&'e str> {
        record.get(&self.type_field).and_then(Value::as_str)
    }

    fn types_of(&self, parents: &[Model]) -> BTreeSet<String> {
        parents
            .iter()
            .filter_map(|parent| parent.get(&self.type_field).and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }
}

impl Relationship for MorphTo {
    fn kind(&self) -> RelationKind {
        RelationKind::MorphTo
    }

    fn related(&self) -> Option<&str> {
        None
    }

    fn related_entities(&self) -> Vec<String> {
        self.candidates.clone()
    }

    fn decomposition(&self) -> SchemaNode {
        SchemaNode::Union {
            type_field: self.type_field.clone(),
        }
    }

    /// The discriminator already lives on the parent; the id is stamped while
    /// the union is resolved.
    fn attach(&self, _parent: &mut Element, _child: &mut Element, _parent_entity: &str) {}

    fn parent_stamped_fields(&self) -> Vec<&str> {
        vec![self.id.as_str()]
    }

    fn add_eager_constraints<'q>(&self, query: Query<'q>, parents: &[Model]) -> Query<'q> {
        let entity = query.entity().to_string();
        let Some(owner_key) = self.owner_key_for(query.schema()) else {
            return query.where_fn(|_| false);
        };
        let mut seen = BTreeSet::new();
        let ids: Vec<Value> = parents
            .iter()
            .filter(|parent| parent.get(&self.type_field).and_then(Value::as_str) == Some(entity.as_str()))
            .filter_map(|parent| parent.get(&self.id))
            .filter(|id| !id.is_null() && seen.insert(id.to_key_string()))
            .cloned()
            .collect();
        query.where_in(owner_key, ids)
    }

    fn match_results(&self, name: &str, parents: &mut [Model], results: Vec<Model>) {
        let mut dictionary: HashMap<(String, String), Model> = HashMap::new();
        for model in results {
            let Some(owner_key) = self.owner_key_for(model.schema()) else {
                continue;
            };
            if let Some(key) = key_of(&model, &owner_key) {
                dictionary.insert((model.entity().to_string(), key), model);
            }
        }
        for parent in parents.iter_mut() {
            let entity = parent.get(&self.type_field).and_then(Value::as_str).map(str::to_string);
            let matched = match (entity, key_of(parent, &self.id)) {
                (Some(entity), Some(key)) => dictionary.get(&(entity, key)).cloned(),
                _ => None,
            };
            parent.set_relation(name, Related::One(matched.map(Box::new)));
        }
    }

    /// One constrained sub-query per discriminator value found on the parents.
    fn eager_load(
        &self,
        db: &Database,
        name: &str,
        parents: &mut [Model],
        prepare: Prepare<'_>,
    ) -> Result<(), RelmapError> {
        let mut results = Vec::new();
        for entity in self.types_of(parents) {
            if !db.registry().is_registered(&entity) {
                warn!(
                    relation = name,
                    entity = entity.as_str(),
                    "morph-to discriminator names an unregistered entity; skipping"
                );
                continue;
            }
            debug!(
                relation = name,
                kind = "morph_to",
                related = entity.as_str(),
                parents = parents.len(),
                "eager loading relation"
            );
            let query = self.add_eager_constraints(db.query(&entity)?, parents);
            results.extend(prepare(query).get()?);
        }
        self.match_results(name, parents, results);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::MorphTo;
    use crate::relation::Relationship;
    use crate::schema::{PrimaryKey, Schema};
    use crate::value::element;
    use serde_json::json;

    fn relation(owner_key: Option<&str>) -> MorphTo {
        MorphTo {
            candidates: vec![],
            id: "imageableId".into(),
            type_field: "imageableType".into(),
            owner_key: owner_key.map(str::to_string),
        }
    }

    #[test]
    fn owner_key_falls_back_to_single_primary_key() {
        let users = Schema::new("users".into(), PrimaryKey::Single("uuid".into()), vec![]);
        let pairs = Schema::new(
            "pairs".into(),
            PrimaryKey::Composite(vec!["a".into(), "b".into()]),
            vec![],
        );
        assert_eq!(relation(None).owner_key_for(&users), Some("uuid".into()));
        assert_eq!(relation(None).owner_key_for(&pairs), None);
        assert_eq!(
            relation(Some("slug")).owner_key_for(&pairs),
            Some("slug".into())
        );
    }

    #[test]
    fn attach_is_a_no_op() {
        let mut image = element(json!({ "imageableType": "users" }));
        let mut user = element(json!({ "id": 1 }));
        relation(None).attach(&mut image, &mut user, "images");
        assert!(!image.contains_key("imageableId"));
        assert_eq!(relation(None).type_of(&image), Some("users"));
    }
}
