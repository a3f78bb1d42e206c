#![allow(dead_code)]

use relmap::{Database, Elements, MemoryStore, ModelSpec, RelmapConfig, Value, element};
use std::sync::Arc;

/// Blog-shaped registry: users own posts, a phone and an image; posts carry
/// tags by id list and comments polymorphically; images point back through
/// a morph-to.
pub fn blog(config: RelmapConfig) -> (Database, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new(config.namespace.clone()));
    let db = Database::new(config, store.clone());
    for spec in blog_specs() {
        db.register(spec).expect("register");
    }
    (db, store)
}

pub fn blog_specs() -> Vec<ModelSpec> {
    vec![
        ModelSpec::new("users")
            .attr("id", Value::Null)
            .string("name", "")
            .has_many("posts", "posts", "userId")
            .has_one("phone", "phones", "userId")
            .morph_one("image", "images", "imageableId", "imageableType"),
        ModelSpec::new("posts")
            .attr("id", Value::Null)
            .attr("userId", Value::Null)
            .string("title", "")
            .attr("tagIds", Value::List(vec![]))
            .belongs_to("author", "users", "userId")
            .has_many_by("tags", "tags", "tagIds")
            .morph_many("comments", "comments", "commentableId", "commentableType"),
        ModelSpec::new("phones")
            .attr("id", Value::Null)
            .attr("userId", Value::Null)
            .string("number", ""),
        ModelSpec::new("tags").attr("id", Value::Null).string("name", ""),
        ModelSpec::new("comments")
            .attr("id", Value::Null)
            .attr("commentableId", Value::Null)
            .attr("commentableType", Value::Null)
            .string("body", ""),
        ModelSpec::new("images")
            .attr("id", Value::Null)
            .string("url", "")
            .attr("imageableId", Value::Null)
            .attr("imageableType", Value::Null)
            .morph_to("imageable", ["users", "posts"], "imageableId", "imageableType"),
    ]
}

/// Self-referential chain: each node optionally points at a parent node.
pub fn nodes(config: RelmapConfig) -> (Database, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new(config.namespace.clone()));
    let db = Database::new(config, store.clone());
    db.register(
        ModelSpec::new("nodes")
            .attr("id", Value::Null)
            .attr("parentId", Value::Null)
            .string("name", "")
            .belongs_to("parent", "nodes", "parentId")
            .has_many("children", "nodes", "parentId"),
    )
    .expect("register nodes");
    (db, store)
}

pub fn testing() -> RelmapConfig {
    RelmapConfig::testing(Vec::<String>::new())
}

pub fn uids(values: &[&str]) -> RelmapConfig {
    RelmapConfig::testing(values.iter().copied())
}

/// Keys raw rows by the stringified value of `key`.
pub fn rows(data: serde_json::Value, key: &str) -> Elements {
    data.as_array()
        .expect("rows array")
        .iter()
        .map(|row| {
            let row = element(row.clone());
            let id = row.get(key).expect("row key").to_key_string();
            (id, row)
        })
        .collect()
}

pub fn field<'a>(elements: &'a Elements, id: &str, field: &str) -> &'a Value {
    elements
        .get(id)
        .unwrap_or_else(|| panic!("element {id} missing"))
        .get(field)
        .unwrap_or_else(|| panic!("field {field} missing on {id}"))
}
