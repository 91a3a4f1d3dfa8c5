use sqlx::query::Query;
use sqlx::Database;
use strata_data::{Dialect, Value};

/// Driver-specific glue the generic connection scope cannot express.
///
/// `sqlx` keeps value encoding and query-result shapes per-database; this
/// trait pins them down for the drivers we compile in. One impl per enabled
/// driver feature.
pub trait SqlxDriver: Database + Sized {
    /// The SQL dialect this driver speaks. Checked against the configured
    /// dialect when a data source opens.
    const DIALECT: Dialect;

    /// Bind one parameter value onto a query.
    fn bind<'q>(
        query: Query<'q, Self, <Self as Database>::Arguments<'q>>,
        value: &Value,
    ) -> Query<'q, Self, <Self as Database>::Arguments<'q>>;

    fn rows_affected(result: &Self::QueryResult) -> u64;

    /// Generated key of the last insert, where the driver reports one.
    /// Postgres does not; callers use `RETURNING` there.
    fn last_insert_id(result: &Self::QueryResult) -> Option<i64>;
}

#[cfg(feature = "sqlite")]
impl SqlxDriver for sqlx::Sqlite {
    const DIALECT: Dialect = Dialect::Sqlite;

    fn bind<'q>(
        query: Query<'q, Self, sqlx::sqlite::SqliteArguments<'q>>,
        value: &Value,
    ) -> Query<'q, Self, sqlx::sqlite::SqliteArguments<'q>> {
        match value {
            Value::Null => query.bind(Option::<i64>::None),
            Value::Bool(b) => query.bind(*b),
            Value::Int(i) => query.bind(*i),
            Value::Float(f) => query.bind(*f),
            Value::Text(s) => query.bind(s.clone()),
            Value::Bytes(b) => query.bind(b.clone()),
        }
    }

    fn rows_affected(result: &sqlx::sqlite::SqliteQueryResult) -> u64 {
        result.rows_affected()
    }

    fn last_insert_id(result: &sqlx::sqlite::SqliteQueryResult) -> Option<i64> {
        Some(result.last_insert_rowid())
    }
}

#[cfg(feature = "postgres")]
impl SqlxDriver for sqlx::Postgres {
    const DIALECT: Dialect = Dialect::Postgres;

    fn bind<'q>(
        query: Query<'q, Self, sqlx::postgres::PgArguments>,
        value: &Value,
    ) -> Query<'q, Self, sqlx::postgres::PgArguments> {
        match value {
            Value::Null => query.bind(Option::<i64>::None),
            Value::Bool(b) => query.bind(*b),
            Value::Int(i) => query.bind(*i),
            Value::Float(f) => query.bind(*f),
            Value::Text(s) => query.bind(s.clone()),
            Value::Bytes(b) => query.bind(b.clone()),
        }
    }

    fn rows_affected(result: &sqlx::postgres::PgQueryResult) -> u64 {
        result.rows_affected()
    }

    fn last_insert_id(_result: &sqlx::postgres::PgQueryResult) -> Option<i64> {
        None
    }
}

#[cfg(feature = "mysql")]
impl SqlxDriver for sqlx::MySql {
    const DIALECT: Dialect = Dialect::MySql;

    fn bind<'q>(
        query: Query<'q, Self, sqlx::mysql::MySqlArguments>,
        value: &Value,
    ) -> Query<'q, Self, sqlx::mysql::MySqlArguments> {
        match value {
            Value::Null => query.bind(Option::<i64>::None),
            Value::Bool(b) => query.bind(*b),
            Value::Int(i) => query.bind(*i),
            Value::Float(f) => query.bind(*f),
            Value::Text(s) => query.bind(s.clone()),
            Value::Bytes(b) => query.bind(b.clone()),
        }
    }

    fn rows_affected(result: &sqlx::mysql::MySqlQueryResult) -> u64 {
        result.rows_affected()
    }

    fn last_insert_id(result: &sqlx::mysql::MySqlQueryResult) -> Option<i64> {
        i64::try_from(result.last_insert_id()).ok()
    }
}
