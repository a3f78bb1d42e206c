use crate::model::Model;
use crate::value::{IndexId, Value};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

pub type ModelPredicate = Arc<dyn Fn(&Model) -> bool + Send + Sync>;
pub type ValuePredicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
pub type OrderKey = Arc<dyn Fn(&Model) -> Value + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boolean {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Clone)]
pub enum Condition {
    Equals { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    Matches { field: String, predicate: ValuePredicate },
    Model(ModelPredicate),
    IndexIds(BTreeSet<IndexId>),
}

impl Condition {
    /// Absent fields compare as null.
    pub fn matches(&self, model: &Model) -> bool {
        match self {
            Condition::Equals { field, value } => field_value(model, field) == value,
            Condition::In { field, values } => {
                let actual = field_value(model, field);
                values.iter().any(|v| v == actual)
            }
            Condition::Matches { field, predicate } => predicate(field_value(model, field)),
            Condition::Model(predicate) => predicate(model),
            Condition::IndexIds(ids) => model.index_id().is_ok_and(|id| ids.contains(&id)),
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Equals { field, value } => write!(f, "{field} = {value}"),
            Condition::In { field, values } => write!(f, "{field} IN {values:?}"),
            Condition::Matches { field, .. } => write!(f, "{field} matches <fn>"),
            Condition::Model(_) => f.write_str("<fn>"),
            Condition::IndexIds(ids) => write!(f, "__id IN {ids:?}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Where {
    pub condition: Condition,
    pub boolean: Boolean,
}

#[derive(Clone)]
pub enum OrderField {
    Field(String),
    Key(OrderKey),
}

impl OrderField {
    fn value(&self, model: &Model) -> Value {
        match self {
            OrderField::Field(field) => field_value(model, field).clone(),
            OrderField::Key(key) => key(model),
        }
    }
}

impl fmt::Debug for OrderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderField::Field(field) => f.write_str(field),
            OrderField::Key(_) => f.write_str("<fn>"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrderBy {
    pub field: OrderField,
    pub direction: Order,
}

static NULL: Value = Value::Null;

fn field_value<'m>(model: &'m Model, field: &str) -> &'m Value {
    model.get(field).unwrap_or(&NULL)
}

/// Keeps models for which every `and` clause holds, or any `or` clause holds.
/// A group with no clauses does not take part.
pub(crate) fn filter_where(models: Vec<Model>, wheres: &[Where]) -> Vec<Model> {
    if wheres.is_empty() {
        return models;
    }
    let (ands, ors): (Vec<&Where>, Vec<&Where>) =
        wheres.iter().partition(|w| w.boolean == Boolean::And);
    models
        .into_iter()
        .filter(|model| {
            let and_passes =
                !ands.is_empty() && ands.iter().all(|w| w.condition.matches(model));
            let or_passes = ors.iter().any(|w| w.condition.matches(model));
            and_passes || or_passes
        })
        .collect()
}

/// Stable multi-key sort; earlier `order_by` calls take precedence.
pub(crate) fn sort(models: &mut [Model], orders: &[OrderBy]) {
    if orders.is_empty() {
        return;
    }
    let mut keyed: Vec<(Vec<Value>, usize)> = models
        .iter()
        .enumerate()
        .map(|(i, model)| (orders.iter().map(|o| o.field.value(model)).collect(), i))
        .collect();
    keyed.sort_by(|(a, _), (b, _)| {
        for ((x, y), order) in a.iter().zip(b).zip(orders) {
            let ordering = match order.direction {
                Order::Asc => x.cmp(y),
                Order::Desc => y.cmp(x),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    let permutation: Vec<usize> = keyed.into_iter().map(|(_, i)| i).collect();
    let sorted: Vec<Model> = permutation.iter().map(|&i| models[i].clone()).collect();
    for (slot, model) in models.iter_mut().zip(sorted) {
        *slot = model;
    }
}

pub(crate) fn paginate(models: Vec<Model>, offset: usize, limit: Option<usize>) -> Vec<Model> {
    let iter = models.into_iter().skip(offset);
    match limit {
        Some(limit) => iter.take(limit).collect(),
        None => iter.collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::{Boolean, Condition, Order, OrderBy, OrderField, Where, filter_where, paginate, sort};
    use crate::attribute::SequenceUidGenerator;
    use crate::model::Model;
    use crate::schema::{PrimaryKey, Schema};
    use crate::value::{Value, element};
    use serde_json::json;
    use std::sync::Arc;

    fn models(rows: serde_json::Value) -> Vec<Model> {
        let schema = Arc::new(Schema::new("users".into(), PrimaryKey::Single("id".into()), vec![]));
        let uids = SequenceUidGenerator::new(Vec::<String>::new());
        rows.as_array()
            .unwrap()
            .iter()
            .map(|row| {
                let mut model = Model::hydrate(Arc::clone(&schema), &element(json!({})), &uids);
                for (k, v) in element(row.clone()) {
                    model.set(k, v);
                }
                model
            })
            .collect()
    }

    fn ids(models: &[Model]) -> Vec<i64> {
        models.iter().filter_map(|m| m.get("id").and_then(Value::as_i64)).collect()
    }

    fn equals(field: &str, value: impl Into<Value>, boolean: Boolean) -> Where {
        Where {
            condition: Condition::Equals {
                field: field.into(),
                value: value.into(),
            },
            boolean,
        }
    }

    #[test]
    fn and_group_or_group_semantics() {
        let rows = models(json!([
            { "id": 1, "age": 20, "role": "admin" },
            { "id": 2, "age": 20, "role": "user" },
            { "id": 3, "age": 30, "role": "user" },
        ]));
        let wheres = vec![
            equals("age", 20, Boolean::And),
            equals("role", "user", Boolean::And),
            equals("id", 3, Boolean::Or),
        ];
        assert_eq!(ids(&filter_where(rows.clone(), &wheres)), vec![2, 3]);

        let only_or = vec![equals("id", 1, Boolean::Or)];
        assert_eq!(ids(&filter_where(rows, &only_or)), vec![1]);
    }

    #[test]
    fn missing_fields_compare_as_null() {
        let rows = models(json!([{ "id": 1 }, { "id": 2, "deleted": true }]));
        let wheres = vec![equals("deleted", Value::Null, Boolean::And)];
        assert_eq!(ids(&filter_where(rows, &wheres)), vec![1]);
    }

    #[test]
    fn sort_is_stable_across_keys() {
        let mut rows = models(json!([
            { "id": 1, "age": 30, "name": "b" },
            { "id": 2, "age": 20, "name": "b" },
            { "id": 3, "age": 20, "name": "a" },
            { "id": 4, "age": 30, "name": "b" },
        ]));
        sort(
            &mut rows,
            &[
                OrderBy {
                    field: OrderField::Field("name".into()),
                    direction: Order::Desc,
                },
                OrderBy {
                    field: OrderField::Field("age".into()),
                    direction: Order::Asc,
                },
            ],
        );
        assert_eq!(ids(&rows), vec![2, 1, 4, 3]);
    }

    #[test]
    fn paginate_slices_offset_then_limit() {
        let rows = models(json!([{ "id": 1 }, { "id": 2 }, { "id": 3 }]));
        assert_eq!(ids(&paginate(rows.clone(), 1, Some(1))), vec![2]);
        assert_eq!(ids(&paginate(rows.clone(), 1, None)), vec![2, 3]);
        assert!(paginate(rows, 5, Some(2)).is_empty());
    }
}
