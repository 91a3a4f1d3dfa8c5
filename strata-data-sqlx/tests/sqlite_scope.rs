#![cfg(feature = "sqlite")]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use sqlx::Sqlite;
use strata_data::{
    DataError, Descriptor, FieldDef, FieldValue, PageRequest, Predicate, ScopeState, TableSchema,
};
use strata_data_sqlx::{DataSource, DataSourceConfig, SqlObserver};

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
struct User {
    id: i64,
    name: String,
    status: String,
    balance: i64,
}

impl TableSchema for User {
    fn table_name() -> &'static str {
        "users"
    }

    fn fields() -> &'static [FieldDef] {
        const FIELDS: &[FieldDef] = &[
            FieldDef::new("id").key(),
            FieldDef::new("name"),
            FieldDef::new("status"),
            FieldDef::new("balance"),
        ];
        FIELDS
    }
}

fn user(name: &str, status: &str, balance: i64) -> User {
    User {
        id: 0,
        name: name.into(),
        status: status.into(),
        balance,
    }
}

fn by_id(id: i64) -> Predicate {
    let d = Descriptor::from_pairs([("id", FieldValue::from(id))]).unwrap();
    Predicate::compile(&d, User::fields()).unwrap()
}

fn by_status(status: &str) -> Predicate {
    let d = Descriptor::from_pairs([("status", FieldValue::from(status))]).unwrap();
    Predicate::compile(&d, User::fields()).unwrap()
}

/// In-memory SQLite with a single pooled connection, so every scope sees
/// the same database.
async fn data_source() -> DataSource<Sqlite> {
    let mut config = DataSourceConfig::new("sqlite::memory:", "sqlite");
    config.max_connections = 1;
    let source = DataSource::<Sqlite>::open(&config).unwrap();
    let mut scope = source.scope();
    scope
        .execute_sql(
            "CREATE TABLE users (\
                id INTEGER PRIMARY KEY AUTOINCREMENT, \
                name TEXT NOT NULL, \
                status TEXT NOT NULL, \
                balance INTEGER NOT NULL DEFAULT 0)",
            vec![],
        )
        .await
        .unwrap();
    scope.close().await;
    source
}

#[tokio::test]
async fn crud_roundtrip() {
    let source = data_source().await;
    let mut scope = source.scope();

    let result = scope.insert(&user("Ada", "active", 100)).await.unwrap();
    assert_eq!(result.rows_affected, 1);
    let id = result.last_insert_id.unwrap();

    let found: Option<User> = scope.query_one(&by_id(id)).await.unwrap();
    let found = found.unwrap();
    assert_eq!(found.name, "Ada");
    assert_eq!(found.balance, 100);

    // Partial update through a set-and-where descriptor
    let mutation = Descriptor::from_pairs([
        ("set_status", FieldValue::from("archived")),
        ("id", FieldValue::from(id)),
    ])
    .unwrap();
    let affected = scope.update::<User>(&mutation).await.unwrap();
    assert_eq!(affected, 1);

    let archived: Option<User> = scope.query_one(&by_id(id)).await.unwrap();
    assert_eq!(archived.unwrap().status, "archived");

    // Whole-model update keyed on id
    let mut model = found;
    model.id = id;
    model.name = "Ada L.".into();
    model.status = "active".into();
    let affected = scope.update_model(&model).await.unwrap();
    assert_eq!(affected, 1);

    let affected = scope.delete_model(&model).await.unwrap();
    assert_eq!(affected, 1);
    assert_eq!(scope.count::<User>(&Predicate::empty()).await.unwrap(), 0);

    scope.close().await;
}

#[tokio::test]
async fn insert_many_spans_chunks() {
    let source = data_source().await;
    let mut scope = source.scope();

    // 120 rows crosses the per-statement chunk boundary
    let batch: Vec<User> = (0..120).map(|i| user(&format!("u{i}"), "bulk", i)).collect();
    let inserted = scope.insert_many(&batch).await.unwrap();
    assert_eq!(inserted, 120);
    assert_eq!(scope.count::<User>(&by_status("bulk")).await.unwrap(), 120);

    // An empty batch touches nothing
    assert_eq!(scope.insert_many(&Vec::<User>::new()).await.unwrap(), 0);
    scope.close().await;
}

#[tokio::test]
async fn query_list_filters_and_orders() {
    let source = data_source().await;
    let mut scope = source.scope();
    scope.insert(&user("A", "active", 1)).await.unwrap();
    scope.insert(&user("B", "inactive", 2)).await.unwrap();
    scope.insert(&user("C", "active", 3)).await.unwrap();

    let active: Vec<User> = scope.query_list(&by_status("active")).await.unwrap();
    assert_eq!(active.len(), 2);

    let all: Vec<User> = scope
        .query_list_ordered(&Predicate::empty(), &[strata_data::SortSpec::desc("balance")])
        .await
        .unwrap();
    let balances: Vec<i64> = all.iter().map(|u| u.balance).collect();
    assert_eq!(balances, vec![3, 2, 1]);
    scope.close().await;
}

#[tokio::test]
async fn paging_reports_totals_and_windows() {
    let source = data_source().await;
    let mut scope = source.scope();
    for i in 0..25 {
        scope.insert(&user(&format!("u{i}"), "active", i)).await.unwrap();
    }

    let request = PageRequest::new(2, 10).order_asc("id");
    let page = scope
        .page::<User>(&Predicate::empty(), &request)
        .await
        .unwrap();
    assert_eq!(page.items.len(), 5);
    assert_eq!(page.total, 25);
    assert_eq!(page.total_pages, 3);
    assert_eq!(page.page, 2);

    // Walking every page covers each row exactly once, with a stable total
    let mut seen = 0;
    for n in 0..page.total_pages {
        let request = PageRequest::new(n, 10).order_asc("id");
        let page = scope
            .page::<User>(&Predicate::empty(), &request)
            .await
            .unwrap();
        assert_eq!(page.total, 25);
        seen += page.items.len() as u64;
    }
    assert_eq!(seen, 25);
    scope.close().await;
}

#[tokio::test]
async fn page_over_custom_sql() {
    let source = data_source().await;
    let mut scope = source.scope();
    for i in 0..12 {
        let status = if i % 2 == 0 { "active" } else { "inactive" };
        scope.insert(&user(&format!("u{i}"), status, i)).await.unwrap();
    }

    let request = PageRequest::new(1, 4).order_asc("id");
    let page = scope
        .page_over::<User>(
            "SELECT * FROM users WHERE status = @st",
            &[("st".to_string(), "active".into())],
            &request,
        )
        .await
        .unwrap();
    assert_eq!(page.total, 6);
    assert_eq!(page.items.len(), 2);
    scope.close().await;
}

#[tokio::test]
async fn sum_and_count_aggregates() {
    let source = data_source().await;
    let mut scope = source.scope();
    scope.insert(&user("A", "active", 10)).await.unwrap();
    scope.insert(&user("B", "active", 20)).await.unwrap();
    scope.insert(&user("C", "inactive", 40)).await.unwrap();

    assert_eq!(scope.count::<User>(&by_status("active")).await.unwrap(), 2);
    assert_eq!(
        scope.sum::<User>("balance", &by_status("active")).await.unwrap(),
        30
    );
    // Empty match sums to zero, not null
    assert_eq!(
        scope.sum::<User>("balance", &by_status("gone")).await.unwrap(),
        0
    );
    scope.close().await;
}

#[tokio::test]
async fn transaction_commit_persists() {
    let source = data_source().await;
    let mut scope = source.scope();
    scope.begin().await.unwrap();
    scope.insert(&user("Ada", "active", 1)).await.unwrap();
    scope.commit().await.unwrap();
    scope.close().await;

    let mut check = source.scope();
    assert_eq!(check.count::<User>(&Predicate::empty()).await.unwrap(), 1);
    check.close().await;
}

#[tokio::test]
async fn transaction_rollback_discards() {
    let source = data_source().await;
    let mut scope = source.scope();
    scope.begin().await.unwrap();
    scope.insert(&user("Ada", "active", 1)).await.unwrap();
    scope.rollback().await.unwrap();
    assert_eq!(scope.count::<User>(&Predicate::empty()).await.unwrap(), 0);
    scope.close().await;
}

#[tokio::test]
async fn close_rolls_back_live_transaction() {
    let source = data_source().await;
    let mut scope = source.scope();
    scope.begin().await.unwrap();
    scope.insert(&user("Ada", "active", 1)).await.unwrap();
    scope.close().await;

    let mut check = source.scope();
    assert_eq!(check.count::<User>(&Predicate::empty()).await.unwrap(), 0);
    check.close().await;
}

#[tokio::test]
async fn failed_commit_discards_the_connection() {
    let source = data_source().await;
    let mut scope = source.scope();
    scope.begin().await.unwrap();
    scope.insert(&user("Ada", "active", 1)).await.unwrap();

    // End the transaction behind the scope's back, so its COMMIT fails
    scope.execute_sql("COMMIT", vec![]).await.unwrap();
    let err = scope.commit().await.unwrap_err();
    assert!(matches!(err, DataError::Driver(_)));
    assert_eq!(scope.state(), ScopeState::Open);

    // The session was closed, not pooled: the next statement runs on a
    // fresh in-memory database that has no schema at all.
    let err = scope.count::<User>(&Predicate::empty()).await.unwrap_err();
    assert!(matches!(err, DataError::Driver(_)));
    scope.close().await;
}

#[tokio::test]
async fn failed_rollback_discards_the_connection() {
    let source = data_source().await;
    let mut scope = source.scope();
    scope.begin().await.unwrap();
    scope.execute_sql("ROLLBACK", vec![]).await.unwrap();

    let err = scope.rollback().await.unwrap_err();
    assert!(matches!(err, DataError::Driver(_)));
    assert_eq!(scope.state(), ScopeState::Open);

    let err = scope.count::<User>(&Predicate::empty()).await.unwrap_err();
    assert!(matches!(err, DataError::Driver(_)));
    scope.close().await;
}

#[tokio::test]
async fn lifecycle_legality() {
    let source = data_source().await;
    let mut scope = source.scope();
    assert_eq!(scope.state(), ScopeState::Unopened);

    // Commit outside a transaction is a caller bug
    let err = scope.commit().await.unwrap_err();
    assert!(matches!(err, DataError::Scope { operation: "commit", .. }));

    // Rollback outside a transaction is a harmless no-op
    scope.rollback().await.unwrap();

    // Nested begin is rejected
    scope.begin().await.unwrap();
    let err = scope.begin().await.unwrap_err();
    assert!(matches!(err, DataError::Scope { operation: "begin", .. }));
    scope.rollback().await.unwrap();

    // Close is idempotent and terminal
    scope.close().await;
    scope.close().await;
    assert_eq!(scope.state(), ScopeState::Closed);
    let err = scope.count::<User>(&Predicate::empty()).await.unwrap_err();
    assert!(matches!(err, DataError::Scope { .. }));
}

#[tokio::test]
async fn dialect_mismatch_fails_at_open() {
    let config = DataSourceConfig::new("postgres://localhost/app", "postgres");
    let err = DataSource::<Sqlite>::open(&config).unwrap_err();
    assert!(matches!(err, DataError::UnsupportedDialect { dialect } if dialect == "postgres"));

    let config = DataSourceConfig::new("mssql://localhost/app", "mssql");
    let err = DataSource::<Sqlite>::open(&config).unwrap_err();
    assert!(matches!(err, DataError::UnsupportedDialect { dialect } if dialect == "mssql"));
}

#[derive(Default)]
struct RecordingObserver {
    statements: Mutex<Vec<String>>,
}

impl SqlObserver for RecordingObserver {
    fn statement_executed(&self, sql: &str, _elapsed: Duration, _success: bool) {
        self.statements.lock().unwrap().push(sql.to_string());
    }
}

#[tokio::test]
async fn compile_errors_issue_no_sql() {
    let observer = Arc::new(RecordingObserver::default());
    let mut config = DataSourceConfig::new("sqlite::memory:", "sqlite");
    config.max_connections = 1;
    let source = DataSource::<Sqlite>::open(&config)
        .unwrap()
        .with_observer(observer.clone());

    let mut scope = source.scope();
    // No set_ assignments: rejected before any statement runs
    let d = Descriptor::from_pairs([("id", FieldValue::from(1i64))]).unwrap();
    let err = scope.update::<User>(&d).await.unwrap_err();
    assert!(matches!(err, DataError::NoAssignments));

    // Unknown field in a predicate: also rejected at compile time
    let d = Descriptor::from_pairs([("nope", FieldValue::from(1i64))]).unwrap();
    assert!(Predicate::compile(&d, User::fields()).is_err());

    assert!(observer.statements.lock().unwrap().is_empty());
    scope.close().await;
}

#[tokio::test]
async fn observer_sees_lowered_sql() {
    let observer = Arc::new(RecordingObserver::default());
    let source = data_source().await.with_observer(observer.clone());

    let mut scope = source.scope();
    scope.insert(&user("Ada", "active", 1)).await.unwrap();
    scope.close().await;

    let statements = observer.statements.lock().unwrap();
    assert_eq!(statements.len(), 1);
    assert_eq!(
        statements[0],
        "INSERT INTO users (name, status, balance) VALUES (?, ?, ?)"
    );
}
