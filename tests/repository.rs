mod support;

use relmap::repository::{ModelDecodeError, RepositoryError, TryFromModel, bool_at, i64_at, text_at};
use relmap::{Database, Model, ModelSpec, RelmapErrorCode, Repository, Value};
use serde_json::json;
use support::{blog, testing};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Account {
    id: i64,
    email: String,
    verified: bool,
}

impl TryFromModel for Account {
    fn try_from_model(model: &Model) -> Result<Self, ModelDecodeError> {
        Ok(Self {
            id: i64_at(model, "id")?,
            email: text_at(model, "email")?.to_string(),
            verified: bool_at(model, "verified")?,
        })
    }
}

struct AccountRepo<'a> {
    repo: Repository<'a>,
}

impl<'a> AccountRepo<'a> {
    fn new(db: &'a Database) -> Self {
        Self {
            repo: db.repo("accounts"),
        }
    }

    async fn register(&self, id: i64, email: &str) -> Result<(), relmap::RelmapError> {
        self.repo
            .insert(json!({ "id": id, "email": email }))
            .await
            .map(|_| ())
    }

    fn verified(&self) -> Result<Vec<Account>, RepositoryError> {
        let models = self.repo.query()?.where_("verified", true).get()?;
        Ok(relmap::repository::decode_models(&models)?)
    }
}

fn accounts_db() -> Database {
    let db = Database::in_memory(testing());
    db.register(
        ModelSpec::new("accounts")
            .number("id", 0)
            .string("email", "")
            .boolean("verified", false),
    )
    .expect("register accounts");
    db
}

#[tokio::test]
async fn typed_repository_round_trips_through_the_store() {
    let db = accounts_db();
    let accounts = AccountRepo::new(&db);
    accounts.register(1, "a@example.com").await.expect("register 1");
    accounts.register(2, "b@example.com").await.expect("register 2");

    db.query("accounts")
        .expect("query")
        .where_("id", 2)
        .revise(json!({ "verified": true }))
        .await
        .expect("verify");

    let verified = accounts.verified().expect("verified");
    assert_eq!(
        verified,
        vec![Account {
            id: 2,
            email: "b@example.com".to_string(),
            verified: true,
        }]
    );

    let all: Vec<Account> = accounts.repo.get_as().expect("decode all");
    assert_eq!(all.len(), 2);
}

#[test]
fn decode_errors_surface_through_get_as() {
    let (db, store) = blog(testing());
    store.fill(
        "users",
        support::rows(json!([{ "id": "not-a-number", "name": "John" }]), "id"),
    );
    let err = db.repo("users").get_as::<Account>().unwrap_err();
    assert!(matches!(
        err,
        RepositoryError::Decode(ModelDecodeError::TypeMismatch { .. })
    ));
}

#[tokio::test]
async fn unbound_repositories_fail_every_operation() {
    let (db, _) = blog(testing());
    let repo = Repository::unbound(&db);
    assert_eq!(repo.entity(), None);

    let err = repo.insert(json!({ "id": 1 })).await.unwrap_err();
    assert_eq!(err.code(), RelmapErrorCode::UnregisteredModel);
    let err = repo.find(1).unwrap_err();
    assert_eq!(err.code(), RelmapErrorCode::UnregisteredModel);
    assert!(matches!(
        repo.get_as::<Account>(),
        Err(RepositoryError::Relmap(_))
    ));
}

#[tokio::test]
async fn repository_forwards_persistence_and_lookup() {
    let (db, _) = blog(testing());
    let users = db.repo("users");
    users
        .save(json!({ "id": 1, "name": "John", "posts": [{ "id": 1, "title": "A" }] }))
        .await
        .expect("save");

    let user = users.find(1).expect("find").expect("user 1");
    assert_eq!(user.get("name"), Some(&Value::from("John")));
    assert!(user.many("posts").is_empty());
    assert_eq!(db.repo("posts").all().expect("all").len(), 1);

    assert_eq!(users.destroy(1).expect("destroy"), Some("1".to_string()));
    assert!(users.first().expect("first").is_none());
}
