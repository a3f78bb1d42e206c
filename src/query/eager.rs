use super::Query;
use crate::database::Database;
use crate::error::RelmapError;
use crate::model::Model;
use crate::relation::Relationship;
use crate::schema::Schema;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Caller-supplied adjustment applied to an eager sub-query.
pub type Constraint = Arc<dyn for<'q> Fn(Query<'q>) -> Query<'q> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Recursion {
    /// Re-register the same relation on the sub-query while levels remain.
    Levels(usize),
    /// Re-register the same relation until nothing more matches. `level`
    /// counts the expansions made so far.
    Unbounded { level: usize },
    /// Load every relation of the related entity, `depth` more times.
    All(usize),
}

#[derive(Clone, Default)]
pub(crate) struct EagerLoad {
    pub(crate) constraint: Option<Constraint>,
    pub(crate) recursion: Option<Recursion>,
}

impl EagerLoad {
    fn nested(&self, recursion: Recursion) -> Self {
        Self {
            constraint: self.constraint.clone(),
            recursion: Some(recursion),
        }
    }

    fn depth(&self) -> Option<usize> {
        match self.recursion? {
            Recursion::Levels(n) | Recursion::All(n) => Some(n),
            Recursion::Unbounded { level } => Some(level),
        }
    }

    /// Registers the next recursion step on `query`, then applies the
    /// constraint.
    fn prepare<'q>(&self, name: &str, query: Query<'q>) -> Query<'q> {
        let query = match self.recursion {
            None => query,
            Some(Recursion::Levels(n)) if n > 1 => {
                query.with_eager(name, self.nested(Recursion::Levels(n - 1)))
            }
            Some(Recursion::Levels(_)) => query,
            Some(Recursion::Unbounded { level }) => {
                match query.database().config().max_recursion_depth {
                    Some(max) if level >= max => {
                        warn!(
                            relation = name,
                            max_depth = max,
                            "recursive eager load capped"
                        );
                        query
                    }
                    _ => query.with_eager(name, self.nested(Recursion::Unbounded { level: level + 1 })),
                }
            }
            Some(Recursion::All(0)) => query,
            Some(Recursion::All(depth)) => query.with_all_recursive(Some(depth - 1)),
        };
        match &self.constraint {
            Some(constraint) => constraint(query),
            None => query,
        }
    }
}

impl fmt::Debug for EagerLoad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EagerLoad")
            .field("constrained", &self.constraint.is_some())
            .field("recursion", &self.recursion)
            .finish()
    }
}

fn higher_ranked<F>(f: F) -> F
where
    F: for<'q> Fn(Query<'q>) -> Query<'q>,
{
    f
}

/// Loads each registered relation onto `models`, in registration order.
pub(crate) fn eager_load_relations(
    db: &Database,
    schema: &Schema,
    models: &mut [Model],
    eager: &[(String, EagerLoad)],
) -> Result<(), RelmapError> {
    for (name, load) in eager {
        let relation = schema.relation(name)?;
        debug!(
            entity = schema.entity(),
            relation = name.as_str(),
            parents = models.len(),
            depth = load.depth(),
            "eager load"
        );
        let prepare = higher_ranked(|query| load.prepare(name, query));
        relation.eager_load(db, name, models, &prepare)?;
    }
    Ok(())
}
