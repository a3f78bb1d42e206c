//! Relation variants and the capability interface they share.
//!
//! Each variant differs only in which side owns the foreign key, whether it
//! is singular or plural, and whether the related entity is known statically.
//! The normalizer and the eager loader only talk to [`Relationship`].

pub mod belongs_to;
pub mod has_many;
pub mod has_many_by;
pub mod has_one;
pub mod morph_many;
pub mod morph_one;
pub mod morph_to;

pub use belongs_to::BelongsTo;
pub use has_many::HasMany;
pub use has_many_by::HasManyBy;
pub use has_one::HasOne;
pub use morph_many::MorphMany;
pub use morph_one::MorphOne;
pub use morph_to::MorphTo;

use crate::database::Database;
use crate::error::RelmapError;
use crate::model::{Model, Related};
use crate::query::Query;
use crate::registry::Registry;
use crate::schema::PrimaryKey;
use crate::value::{Element, Value};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    HasOne,
    BelongsTo,
    HasMany,
    HasManyBy,
    MorphOne,
    MorphMany,
    MorphTo,
}

impl RelationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RelationKind::HasOne => "has_one",
            RelationKind::BelongsTo => "belongs_to",
            RelationKind::HasMany => "has_many",
            RelationKind::HasManyBy => "has_many_by",
            RelationKind::MorphOne => "morph_one",
            RelationKind::MorphMany => "morph_many",
            RelationKind::MorphTo => "morph_to",
        }
    }

    pub fn is_plural(self) -> bool {
        matches!(
            self,
            RelationKind::HasMany | RelationKind::HasManyBy | RelationKind::MorphMany
        )
    }

    fn takes_local_key(self) -> bool {
        matches!(
            self,
            RelationKind::HasOne
                | RelationKind::HasMany
                | RelationKind::MorphOne
                | RelationKind::MorphMany
        )
    }
}

/// What the normalizer recurses into for a relation field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaNode {
    One(String),
    Many(String),
    /// Related entity chosen per record by the discriminator field.
    Union { type_field: String },
}

/// Unresolved relation declaration. Keys left as `None` are defaulted when
/// the owning schema boots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationSpec {
    kind: RelationKind,
    related: Vec<String>,
    foreign_key: String,
    type_field: Option<String>,
    local_key: Option<String>,
    owner_key: Option<String>,
}

impl RelationSpec {
    fn new(kind: RelationKind, related: Vec<String>, foreign_key: String) -> Self {
        Self {
            kind,
            related,
            foreign_key,
            type_field: None,
            local_key: None,
            owner_key: None,
        }
    }

    pub fn has_one(related: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::new(RelationKind::HasOne, vec![related.into()], foreign_key.into())
    }

    pub fn belongs_to(related: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::new(RelationKind::BelongsTo, vec![related.into()], foreign_key.into())
    }

    pub fn has_many(related: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::new(RelationKind::HasMany, vec![related.into()], foreign_key.into())
    }

    pub fn has_many_by(related: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::new(RelationKind::HasManyBy, vec![related.into()], foreign_key.into())
    }

    pub fn morph_one(
        related: impl Into<String>,
        id: impl Into<String>,
        type_field: impl Into<String>,
    ) -> Self {
        let mut spec = Self::new(RelationKind::MorphOne, vec![related.into()], id.into());
        spec.type_field = Some(type_field.into());
        spec
    }

    pub fn morph_many(
        related: impl Into<String>,
        id: impl Into<String>,
        type_field: impl Into<String>,
    ) -> Self {
        let mut spec = Self::new(RelationKind::MorphMany, vec![related.into()], id.into());
        spec.type_field = Some(type_field.into());
        spec
    }

    /// `candidates` may be empty: related types are also discovered from the
    /// discriminator values seen during normalization.
    pub fn morph_to<I, S>(candidates: I, id: impl Into<String>, type_field: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let related = candidates.into_iter().map(Into::into).collect();
        let mut spec = Self::new(RelationKind::MorphTo, related, id.into());
        spec.type_field = Some(type_field.into());
        spec
    }

    pub fn local_key(mut self, key: impl Into<String>) -> Self {
        self.local_key = Some(key.into());
        self
    }

    pub fn owner_key(mut self, key: impl Into<String>) -> Self {
        self.owner_key = Some(key.into());
        self
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    pub fn related(&self) -> &[String] {
        &self.related
    }

    pub fn validate(&self, entity: &str, field: &str) -> Result<(), RelmapError> {
        let invalid = |reason: &str| {
            Err(RelmapError::InvalidModel(format!(
                "{} relation '{}' on '{}' {}",
                self.kind.as_str(),
                field,
                entity,
                reason
            )))
        };
        if self.foreign_key.trim().is_empty() {
            return invalid("has an empty foreign key");
        }
        if self.kind != RelationKind::MorphTo
            && (self.related.len() != 1 || self.related[0].trim().is_empty())
        {
            return invalid("must name exactly one related entity");
        }
        if self.local_key.is_some() && !self.kind.takes_local_key() {
            return invalid("does not take a local key");
        }
        if self.owner_key.is_some() && self.kind.takes_local_key() {
            return invalid("does not take an owner key");
        }
        Ok(())
    }

    /// Resolves key defaults against the owning entity's primary key and the
    /// related entity's declaration.
    pub(crate) fn resolve(
        &self,
        parent_key: &PrimaryKey,
        registry: &Registry,
    ) -> Result<Relation, RelmapError> {
        let related = self.related.first().cloned().unwrap_or_default();
        let local_key = || {
            self.local_key
                .clone()
                .unwrap_or_else(|| parent_key.local_key_name().to_string())
        };
        let owner_key = || -> Result<String, RelmapError> {
            match &self.owner_key {
                Some(key) => Ok(key.clone()),
                None => Ok(registry.primary_key(&related)?.local_key_name().to_string()),
            }
        };
        let type_field = || self.type_field.clone().unwrap_or_default();

        let relation = match self.kind {
            RelationKind::HasOne => Relation::HasOne(HasOne {
                related: related.clone(),
                foreign_key: self.foreign_key.clone(),
                local_key: local_key(),
            }),
            RelationKind::BelongsTo => Relation::BelongsTo(BelongsTo {
                related: related.clone(),
                foreign_key: self.foreign_key.clone(),
                owner_key: owner_key()?,
            }),
            RelationKind::HasMany => Relation::HasMany(HasMany {
                related: related.clone(),
                foreign_key: self.foreign_key.clone(),
                local_key: local_key(),
            }),
            RelationKind::HasManyBy => Relation::HasManyBy(HasManyBy {
                related: related.clone(),
                foreign_key: self.foreign_key.clone(),
                owner_key: owner_key()?,
            }),
            RelationKind::MorphOne => Relation::MorphOne(MorphOne {
                related: related.clone(),
                id: self.foreign_key.clone(),
                type_field: type_field(),
                local_key: local_key(),
            }),
            RelationKind::MorphMany => Relation::MorphMany(MorphMany {
                related: related.clone(),
                id: self.foreign_key.clone(),
                type_field: type_field(),
                local_key: local_key(),
            }),
            RelationKind::MorphTo => Relation::MorphTo(MorphTo {
                candidates: self.related.clone(),
                id: self.foreign_key.clone(),
                type_field: type_field(),
                owner_key: self.owner_key.clone(),
            }),
        };
        Ok(relation)
    }
}

/// Applies recursion registration and the caller's constraint to an eager
/// sub-query.
pub type Prepare<'p> = &'p (dyn for<'q> Fn(Query<'q>) -> Query<'q> + 'p);

pub trait Relationship {
    fn kind(&self) -> RelationKind;

    /// The statically known related entity, if any.
    fn related(&self) -> Option<&str>;

    fn related_entities(&self) -> Vec<String> {
        self.related().map(str::to_string).into_iter().collect()
    }

    fn decomposition(&self) -> SchemaNode;

    /// Stamps foreign keys between a parent element and one decomposed child.
    /// Called once per child, after the child's generated keys exist and
    /// before its Index ID is computed.
    fn attach(&self, parent: &mut Element, child: &mut Element, parent_entity: &str);

    /// Child fields written by `attach`; uid generation skips them.
    fn child_stamped_fields(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Parent fields written by `attach` when related data is present.
    fn parent_stamped_fields(&self) -> Vec<&str> {
        Vec::new()
    }

    fn add_eager_constraints<'q>(&self, query: Query<'q>, parents: &[Model]) -> Query<'q>;

    fn match_results(&self, name: &str, parents: &mut [Model], results: Vec<Model>);

    fn default_value(&self) -> Related {
        if self.kind().is_plural() {
            Related::Many(Vec::new())
        } else {
            Related::One(None)
        }
    }

    fn eager_load(
        &self,
        db: &Database,
        name: &str,
        parents: &mut [Model],
        prepare: Prepare<'_>,
    ) -> Result<(), RelmapError> {
        let Some(related) = self.related() else {
            return Ok(());
        };
        debug!(
            relation = name,
            kind = self.kind().as_str(),
            related,
            parents = parents.len(),
            "eager loading relation"
        );
        let query = self.add_eager_constraints(db.query(related)?, parents);
        let results = prepare(query).get()?;
        self.match_results(name, parents, results);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    HasOne(HasOne),
    BelongsTo(BelongsTo),
    HasMany(HasMany),
    HasManyBy(HasManyBy),
    MorphOne(MorphOne),
    MorphMany(MorphMany),
    MorphTo(MorphTo),
}

impl Relation {
    fn inner(&self) -> &dyn Relationship {
        match self {
            Relation::HasOne(r) => r,
            Relation::BelongsTo(r) => r,
            Relation::HasMany(r) => r,
            Relation::HasManyBy(r) => r,
            Relation::MorphOne(r) => r,
            Relation::MorphMany(r) => r,
            Relation::MorphTo(r) => r,
        }
    }

    pub fn as_morph_to(&self) -> Option<&MorphTo> {
        match self {
            Relation::MorphTo(r) => Some(r),
            _ => None,
        }
    }
}

impl Relationship for Relation {
    fn kind(&self) -> RelationKind {
        self.inner().kind()
    }

    fn related(&self) -> Option<&str> {
        self.inner().related()
    }

    fn related_entities(&self) -> Vec<String> {
        self.inner().related_entities()
    }

    fn decomposition(&self) -> SchemaNode {
        self.inner().decomposition()
    }

    fn attach(&self, parent: &mut Element, child: &mut Element, parent_entity: &str) {
        self.inner().attach(parent, child, parent_entity)
    }

    fn child_stamped_fields(&self) -> Vec<&str> {
        self.inner().child_stamped_fields()
    }

    fn parent_stamped_fields(&self) -> Vec<&str> {
        self.inner().parent_stamped_fields()
    }

    fn add_eager_constraints<'q>(&self, query: Query<'q>, parents: &[Model]) -> Query<'q> {
        self.inner().add_eager_constraints(query, parents)
    }

    fn match_results(&self, name: &str, parents: &mut [Model], results: Vec<Model>) {
        self.inner().match_results(name, parents, results)
    }

    fn default_value(&self) -> Related {
        self.inner().default_value()
    }

    fn eager_load(
        &self,
        db: &Database,
        name: &str,
        parents: &mut [Model],
        prepare: Prepare<'_>,
    ) -> Result<(), RelmapError> {
        self.inner().eager_load(db, name, parents, prepare)
    }
}

/// Distinct, non-null values of `field` across `models`, in first-seen order.
pub(crate) fn collect_keys<'m>(
    models: impl IntoIterator<Item = &'m Model>,
    field: &str,
) -> Vec<Value> {
    let mut seen = BTreeSet::new();
    let mut keys = Vec::new();
    for model in models {
        let Some(value) = model.get(field).filter(|v| !v.is_null()) else {
            continue;
        };
        if seen.insert(value.to_key_string()) {
            keys.push(value.clone());
        }
    }
    keys
}

/// Groups `results` by the loose string form of `field`, keeping order.
pub(crate) fn group_by_key(results: Vec<Model>, field: &str) -> HashMap<String, Vec<Model>> {
    let mut dictionary: HashMap<String, Vec<Model>> = HashMap::new();
    for model in results {
        if let Some(key) = key_of(&model, field) {
            dictionary.entry(key).or_default().push(model);
        }
    }
    dictionary
}

/// Maps the loose string form of `field` to a result; later results win.
pub(crate) fn key_by(results: Vec<Model>, field: &str) -> HashMap<String, Model> {
    let mut dictionary = HashMap::new();
    for model in results {
        if let Some(key) = key_of(&model, field) {
            dictionary.insert(key, model);
        }
    }
    dictionary
}

/// Like [`key_by`], but the first result seen for a key wins.
pub(crate) fn first_by(results: Vec<Model>, field: &str) -> HashMap<String, Model> {
    let mut dictionary = HashMap::new();
    for model in results {
        if let Some(key) = key_of(&model, field) {
            dictionary.entry(key).or_insert(model);
        }
    }
    dictionary
}

pub(crate) fn key_of(model: &Model, field: &str) -> Option<String> {
    model
        .get(field)
        .filter(|value| !value.is_null())
        .map(Value::to_key_string)
}

#[cfg(test)]
mod tests {
    use super::{RelationKind, RelationSpec, Relationship, SchemaNode};
    use crate::error::RelmapErrorCode;
    use crate::registry::Registry;
    use crate::schema::{ModelSpec, PrimaryKey};

    #[test]
    fn kinds_report_cardinality() {
        assert!(RelationKind::HasMany.is_plural());
        assert!(RelationKind::MorphMany.is_plural());
        assert!(!RelationKind::BelongsTo.is_plural());
        assert_eq!(RelationKind::MorphTo.as_str(), "morph_to");
    }

    #[test]
    fn validate_rejects_mismatched_key_overrides() {
        let spec = RelationSpec::belongs_to("users", "userId").local_key("id");
        let err = spec.validate("posts", "author").unwrap_err();
        assert_eq!(err.code(), RelmapErrorCode::InvalidModel);

        let spec = RelationSpec::has_many("posts", "userId").owner_key("id");
        assert!(spec.validate("users", "posts").is_err());

        let spec = RelationSpec::has_one("", "userId");
        assert!(spec.validate("users", "phone").is_err());

        assert!(
            RelationSpec::morph_to(Vec::<String>::new(), "id", "type")
                .validate("images", "imageable")
                .is_ok()
        );
    }

    #[test]
    fn resolve_defaults_local_and_owner_keys() {
        let registry = Registry::new();
        registry
            .register(ModelSpec::new("users").primary_key("uuid"))
            .unwrap();
        let parent_key = PrimaryKey::Single("postId".into());

        let has_one = RelationSpec::has_one("users", "postId")
            .resolve(&parent_key, &registry)
            .unwrap();
        assert_eq!(has_one.decomposition(), SchemaNode::One("users".into()));
        match has_one {
            super::Relation::HasOne(r) => assert_eq!(r.local_key, "postId"),
            other => panic!("unexpected {other:?}"),
        }

        let belongs_to = RelationSpec::belongs_to("users", "userId")
            .resolve(&parent_key, &registry)
            .unwrap();
        match belongs_to {
            super::Relation::BelongsTo(r) => assert_eq!(r.owner_key, "uuid"),
            other => panic!("unexpected {other:?}"),
        }

        let err = RelationSpec::belongs_to("ghosts", "ghostId")
            .resolve(&parent_key, &registry)
            .unwrap_err();
        assert_eq!(err.code(), RelmapErrorCode::UnregisteredModel);

        let morph_to = RelationSpec::morph_to(["users"], "imageableId", "imageableType")
            .resolve(&parent_key, &registry)
            .unwrap();
        assert_eq!(
            morph_to.decomposition(),
            SchemaNode::Union {
                type_field: "imageableType".into()
            }
        );
        assert_eq!(morph_to.related_entities(), vec!["users".to_string()]);
        assert_eq!(
            morph_to.default_value(),
            crate::model::Related::One(None)
        );
    }
}
