//! Query builder over one entity's stored collection.
//!
//! Reads take a snapshot of the collection at call time, hydrate it, then
//! filter, order and paginate in memory. `get` additionally eager loads the
//! registered relations onto the result batch.

pub mod clause;
mod eager;
mod persist;
mod revive;

pub use clause::{Boolean, Condition, Order, OrderBy, OrderField, Where};
pub use eager::Constraint;
pub use persist::Collections;

use crate::database::Database;
use crate::error::RelmapError;
use crate::model::Model;
use crate::relation::Relationship;
use crate::schema::Schema;
use crate::value::{IndexId, Value};
use eager::{EagerLoad, Recursion};
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Clone)]
pub struct Query<'a> {
    db: &'a Database,
    schema: Arc<Schema>,
    wheres: Vec<Where>,
    orders: Vec<OrderBy>,
    take: Option<usize>,
    skip: usize,
    eager: Vec<(String, EagerLoad)>,
}

impl<'a> Query<'a> {
    pub(crate) fn new(db: &'a Database, schema: Arc<Schema>) -> Self {
        Self {
            db,
            schema,
            wheres: Vec::new(),
            orders: Vec::new(),
            take: None,
            skip: 0,
            eager: Vec::new(),
        }
    }

    pub fn entity(&self) -> &str {
        self.schema.entity()
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn database(&self) -> &'a Database {
        self.db
    }

    /// Fresh query for another entity on the same database.
    pub fn new_query(&self, entity: &str) -> Result<Query<'a>, RelmapError> {
        self.db.query(entity)
    }

    fn push_where(mut self, condition: Condition, boolean: Boolean) -> Self {
        self.wheres.push(Where { condition, boolean });
        self
    }

    pub fn where_(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let condition = match value.into() {
            Value::List(values) => Condition::In {
                field: field.into(),
                values,
            },
            value => Condition::Equals {
                field: field.into(),
                value,
            },
        };
        self.push_where(condition, Boolean::And)
    }

    pub fn where_in<I, V>(self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let condition = Condition::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        };
        self.push_where(condition, Boolean::And)
    }

    pub fn or_where(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let condition = match value.into() {
            Value::List(values) => Condition::In {
                field: field.into(),
                values,
            },
            value => Condition::Equals {
                field: field.into(),
                value,
            },
        };
        self.push_where(condition, Boolean::Or)
    }

    /// Keeps models for which `predicate` holds.
    pub fn where_fn<F>(self, predicate: F) -> Self
    where
        F: Fn(&Model) -> bool + Send + Sync + 'static,
    {
        self.push_where(Condition::Model(Arc::new(predicate)), Boolean::And)
    }

    pub fn or_where_fn<F>(self, predicate: F) -> Self
    where
        F: Fn(&Model) -> bool + Send + Sync + 'static,
    {
        self.push_where(Condition::Model(Arc::new(predicate)), Boolean::Or)
    }

    /// Keeps models whose `field` satisfies `predicate`; absent fields are
    /// passed as null.
    pub fn where_value_fn<F>(self, field: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        let condition = Condition::Matches {
            field: field.into(),
            predicate: Arc::new(predicate),
        };
        self.push_where(condition, Boolean::And)
    }

    /// Restricts to the given primary key. A list of keys matches any of
    /// them; composite keys take a tuple, or a list of tuples.
    pub fn where_id(self, key: impl Into<Value>) -> Result<Self, RelmapError> {
        let ids = self.schema.key_to_index_ids(&key.into())?;
        Ok(self.where_index_ids(ids))
    }

    fn where_index_ids(self, ids: BTreeSet<IndexId>) -> Self {
        self.push_where(Condition::IndexIds(ids), Boolean::And)
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Order) -> Self {
        self.orders.push(OrderBy {
            field: OrderField::Field(field.into()),
            direction,
        });
        self
    }

    /// Orders by a value computed from each model.
    pub fn order_by_fn<F>(mut self, key: F, direction: Order) -> Self
    where
        F: Fn(&Model) -> Value + Send + Sync + 'static,
    {
        self.orders.push(OrderBy {
            field: OrderField::Key(Arc::new(key)),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.take = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.skip = offset;
        self
    }

    pub(crate) fn with_eager(mut self, name: &str, load: EagerLoad) -> Self {
        match self.eager.iter_mut().find(|(existing, _)| existing == name) {
            Some((_, slot)) => *slot = load,
            None => self.eager.push((name.to_string(), load)),
        }
        self
    }

    /// Eager loads `name` on the results of `get`.
    pub fn with(self, name: &str) -> Self {
        self.with_eager(name, EagerLoad::default())
    }

    /// Eager loads `name`, letting `constraint` adjust the related sub-query.
    pub fn with_constraint<F>(self, name: &str, constraint: F) -> Self
    where
        F: for<'q> Fn(Query<'q>) -> Query<'q> + Send + Sync + 'static,
    {
        let load = EagerLoad {
            constraint: Some(Arc::new(constraint)),
            recursion: None,
        };
        self.with_eager(name, load)
    }

    /// Eager loads a self-referential relation repeatedly. `Some(n)` loads
    /// `n` levels below the root (zero counts as one); `None` keeps going
    /// until nothing more matches, up to the configured maximum.
    pub fn with_recursive(self, name: &str, depth: Option<usize>) -> Self {
        let recursion = match depth {
            Some(n) => Recursion::Levels(n.max(1)),
            None => Recursion::Unbounded { level: 1 },
        };
        let load = EagerLoad {
            constraint: None,
            recursion: Some(recursion),
        };
        self.with_eager(name, load)
    }

    /// Eager loads every relation of the entity, one level deep.
    pub fn with_all(self) -> Self {
        let names: Vec<String> = self.schema.relations().map(|(n, _)| n.to_string()).collect();
        names.iter().fold(self, |query, name| query.with(name))
    }

    /// Eager loads every relation, and every relation of those, `depth` more
    /// levels down. Without a depth the configured default applies.
    pub fn with_all_recursive(self, depth: Option<usize>) -> Self {
        let depth = depth.unwrap_or(self.db.config().default_recursion_depth);
        let names: Vec<String> = self.schema.relations().map(|(n, _)| n.to_string()).collect();
        names.iter().fold(self, |query, name| {
            let load = EagerLoad {
                constraint: None,
                recursion: Some(Recursion::All(depth)),
            };
            query.with_eager(name, load)
        })
    }

    pub fn eager_loads(&self) -> impl Iterator<Item = &str> {
        self.eager.iter().map(|(name, _)| name.as_str())
    }

    /// Every stored model, ignoring the query chain. Relations this query
    /// does not eager load get their empty defaults.
    pub fn all(&self) -> Vec<Model> {
        let uids = self.db.config().uid_generator.as_ref();
        let collection = self.db.store().read(self.entity());
        collection
            .values()
            .map(|element| {
                let mut model = Model::hydrate(Arc::clone(&self.schema), element, uids);
                for (name, relation) in self.schema.relations() {
                    if !self.is_eager(name) {
                        model.set_relation(name, relation.default_value());
                    }
                }
                model
            })
            .collect()
    }

    fn is_eager(&self, name: &str) -> bool {
        self.eager.iter().any(|(existing, _)| existing == name)
    }

    /// `all` filtered, ordered and paginated by the query chain.
    pub fn select(&self) -> Vec<Model> {
        let mut models = clause::filter_where(self.all(), &self.wheres);
        clause::sort(&mut models, &self.orders);
        clause::paginate(models, self.skip, self.take)
    }

    /// `select`, then eager loads registered relations onto a non-empty
    /// result.
    pub fn get(&self) -> Result<Vec<Model>, RelmapError> {
        let mut models = self.select();
        if !models.is_empty() {
            self.load(&mut models)?;
        }
        Ok(models)
    }

    pub fn first(&self) -> Result<Option<Model>, RelmapError> {
        Ok(self.clone().limit(1).get()?.into_iter().next())
    }

    pub fn find(&self, key: impl Into<Value>) -> Result<Option<Model>, RelmapError> {
        self.clone().where_id(key)?.first()
    }

    pub fn find_in<I, V>(&self, keys: I) -> Result<Vec<Model>, RelmapError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let ids = keys
            .into_iter()
            .map(|key| self.schema.key_to_index_id(&key.into()))
            .collect::<Result<BTreeSet<_>, _>>()?;
        self.clone().where_index_ids(ids).get()
    }

    /// Eager loads this query's registered relations onto models retrieved
    /// elsewhere.
    pub fn load(&self, models: &mut [Model]) -> Result<(), RelmapError> {
        if models.is_empty() || self.eager.is_empty() {
            return Ok(());
        }
        eager::eager_load_relations(self.db, &self.schema, models, &self.eager)
    }

    pub fn count(&self) -> usize {
        self.select().len()
    }

    pub fn exists(&self) -> bool {
        self.count() > 0
    }
}

impl std::fmt::Debug for Query<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("entity", &self.entity())
            .field("wheres", &self.wheres)
            .field("orders", &self.orders)
            .field("take", &self.take)
            .field("skip", &self.skip)
            .field("eager", &self.eager)
            .finish()
    }
}
