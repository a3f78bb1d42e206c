use crate::config::RelmapConfig;
use crate::database::Database;
use crate::error::RelmapErrorCode;
use crate::model::Related;
use crate::query::Order;
use crate::schema::ModelSpec;
use crate::store::MemoryStore;
use crate::value::{Elements, Value, element};
use serde_json::json;
use std::sync::Arc;

fn elements(rows: serde_json::Value, key: &str) -> Elements {
    rows.as_array()
        .expect("rows array")
        .iter()
        .map(|row| {
            let row = element(row.clone());
            let id = row.get(key).expect("row key").to_key_string();
            (id, row)
        })
        .collect()
}

fn seeded(config: RelmapConfig) -> (Database, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new(config.namespace.clone()));
    let db = Database::new(config, store.clone());
    db.register(
        ModelSpec::new("users")
            .attr("id", Value::Null)
            .string("name", "")
            .number("age", 0)
            .has_many("posts", "posts", "userId"),
    )
    .expect("register users");
    db.register(
        ModelSpec::new("posts")
            .attr("id", Value::Null)
            .attr("userId", Value::Null)
            .string("title", "")
            .belongs_to("author", "users", "userId"),
    )
    .expect("register posts");
    db.register(
        ModelSpec::new("nodes")
            .attr("id", Value::Null)
            .attr("parentId", Value::Null)
            .belongs_to("parent", "nodes", "parentId"),
    )
    .expect("register nodes");
    db.register(
        ModelSpec::new("pairs")
            .composite_key(["idA", "idB"])
            .attr("idA", Value::Null)
            .attr("idB", Value::Null)
            .string("label", ""),
    )
    .expect("register pairs");

    store.fill(
        "users",
        elements(
            json!([
                { "id": 1, "name": "John", "age": 30 },
                { "id": 2, "name": "Jane", "age": 20 },
                { "id": 3, "name": "Jack", "age": 30 },
            ]),
            "id",
        ),
    );
    store.fill(
        "posts",
        elements(
            json!([
                { "id": 1, "userId": 1, "title": "A" },
                { "id": 2, "userId": 1, "title": "B" },
                { "id": 3, "userId": 2, "title": "C" },
            ]),
            "id",
        ),
    );
    (db, store)
}

#[test]
fn all_assigns_relation_defaults_when_not_eager_loaded() {
    let (db, _) = seeded(RelmapConfig::testing(Vec::<String>::new()));
    let users = db.query("users").expect("query").all();
    assert_eq!(users.len(), 3);
    assert_eq!(users[0].relation("posts"), Some(&Related::Many(vec![])));
    assert_eq!(users[0].get("name"), Some(&Value::from("John")));
}

#[test]
fn get_filters_orders_and_paginates_before_eager_loading() {
    let (db, _) = seeded(RelmapConfig::testing(Vec::<String>::new()));
    let users = db
        .query("users")
        .expect("query")
        .where_("age", 30)
        .order_by("name", Order::Asc)
        .with("posts")
        .get()
        .expect("get");
    let names: Vec<_> = users.iter().filter_map(|u| u.get("name")).collect();
    assert_eq!(names, vec![&Value::from("Jack"), &Value::from("John")]);
    assert!(users[0].many("posts").is_empty());
    assert_eq!(users[1].many("posts").len(), 2);

    let page = db
        .query("users")
        .expect("query")
        .order_by("id", Order::Desc)
        .offset(1)
        .limit(1)
        .get()
        .expect("get");
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].get("id"), Some(&Value::Integer(2)));
}

#[test]
fn belongs_to_eager_load_matches_owner_or_null() {
    let (db, store) = seeded(RelmapConfig::testing(Vec::<String>::new()));
    store.fill(
        "posts",
        elements(json!([{ "id": 4, "userId": 99, "title": "orphan" }]), "id"),
    );
    let posts = db
        .query("posts")
        .expect("query")
        .with("author")
        .get()
        .expect("get");
    let authors: Vec<Option<&Value>> = posts
        .iter()
        .map(|p| p.one("author").and_then(|a| a.get("name")))
        .collect();
    assert_eq!(
        authors,
        vec![
            Some(&Value::from("John")),
            Some(&Value::from("John")),
            Some(&Value::from("Jane")),
            None,
        ]
    );
    assert_eq!(posts[3].relation("author"), Some(&Related::One(None)));
}

#[test]
fn unknown_relation_surfaces_when_results_exist() {
    let (db, _) = seeded(RelmapConfig::testing(Vec::<String>::new()));
    let err = db
        .query("users")
        .expect("query")
        .with("comments")
        .get()
        .unwrap_err();
    assert_eq!(err.code(), RelmapErrorCode::UnknownRelation);
}

#[test]
fn find_routes_composite_keys_through_index_ids() {
    let (db, store) = seeded(RelmapConfig::testing(Vec::<String>::new()));
    let normalized = db
        .normalize("pairs", &Value::from(json!({ "idA": 1, "idB": 2, "label": "x" })))
        .expect("normalize");
    let pairs = normalized.entity("pairs").expect("pairs");
    assert!(pairs.contains_key("[1,2]"));
    store.fill("pairs", pairs.clone());

    let query = db.query("pairs").expect("query");
    let found = query.find(vec![1, 2]).expect("find").expect("stored pair");
    assert_eq!(found.get("label"), Some(&Value::from("x")));
    assert!(query.find(vec![2, 1]).expect("find").is_none());
    let err = query.find(1).unwrap_err();
    assert_eq!(err.code(), RelmapErrorCode::InvalidKey);
}

#[test]
fn where_id_with_a_key_list_matches_each_key() {
    let (db, _) = seeded(RelmapConfig::testing(Vec::<String>::new()));
    let users = db
        .query("users")
        .expect("query")
        .where_id(vec![1, 2])
        .expect("where_id")
        .get()
        .expect("get");
    let names: Vec<&Value> = users.iter().filter_map(|u| u.get("name")).collect();
    assert_eq!(names, vec![&Value::from("John"), &Value::from("Jane")]);

    let pairs = db
        .query("pairs")
        .expect("query")
        .where_id(Value::from(json!([[1, 2], [3, 4]])))
        .expect("tuple list")
        .get()
        .expect("get");
    assert!(pairs.is_empty());
}

#[test]
fn unbounded_recursion_is_capped_on_cyclic_data() {
    let config = RelmapConfig::testing(Vec::<String>::new()).with_max_recursion_depth(Some(3));
    let (db, store) = seeded(config);
    store.fill(
        "nodes",
        elements(
            json!([{ "id": 1, "parentId": 2 }, { "id": 2, "parentId": 1 }]),
            "id",
        ),
    );
    let node = db
        .query("nodes")
        .expect("query")
        .where_("id", 1)
        .with_recursive("parent", None)
        .first()
        .expect("first")
        .expect("node 1");

    let mut depth = 0;
    let mut current = node.one("parent");
    while let Some(parent) = current {
        depth += 1;
        current = parent.one("parent");
    }
    assert_eq!(depth, 3);
}

#[test]
fn load_eager_loads_onto_models_fetched_elsewhere() {
    let (db, _) = seeded(RelmapConfig::testing(Vec::<String>::new()));
    let mut users = db.query("users").expect("query").where_in("id", [1, 2]).get().expect("get");
    db.query("users")
        .expect("query")
        .with("posts")
        .load(&mut users)
        .expect("load");
    assert_eq!(users[0].many("posts").len(), 2);
    assert_eq!(users[1].many("posts").len(), 1);
    assert_eq!(db.store().read("users").len(), 3);
}
