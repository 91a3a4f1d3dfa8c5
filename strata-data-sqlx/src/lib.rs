//! # strata-data-sqlx — SQLx backend for the Strata data layer
//!
//! This crate provides the [SQLx](https://github.com/launchbadge/sqlx)-specific
//! implementations for Strata's data access layer. It depends on
//! [`strata_data`] for the compilers and planners, and adds the connection
//! scope, driver glue, and error bridging needed to talk to a real database.
//!
//! # What's in this crate
//!
//! | Type | Description |
//! |------|-------------|
//! | [`DataSource`] | Configured pool plus the settings every scope inherits |
//! | [`ConnectionScope`] | One unit of work — a single connection, queries, mutations, transactions |
//! | [`DataSourceConfig`] | Datasource settings read from `strata.datasource.*` |
//! | [`SqlxDriver`] | Per-driver glue: dialect, value binding, result shapes |
//! | [`SqlObserver`] / [`TracingObserver`] | Statement timing hooks |
//! | [`SqlxErrorExt`] | Extension trait to convert `sqlx::Error` → `DataError` (`.into_data_error()`) |
//! | [`SqlxResult<T>`] | Type alias for `Result<T, DataError>` |
//!
//! # Feature flags
//!
//! Enable the drivers you need:
//!
//! | Feature    | Driver |
//! |------------|--------|
//! | `sqlite`   | SQLite via `sqlx/sqlite` |
//! | `postgres` | PostgreSQL via `sqlx/postgres` |
//! | `mysql`    | MySQL via `sqlx/mysql` |
//!
//! # Quick start
//!
//! ```toml
//! [dependencies]
//! strata-data-sqlx = { version = "0.1", features = ["sqlite"] }
//! ```
//!
//! ```ignore
//! use sqlx::Sqlite;
//! use strata_data::prelude::*;
//! use strata_data_sqlx::{DataSource, DataSourceConfig};
//!
//! let source = DataSource::<Sqlite>::open(&DataSourceConfig::from_config(&config)?)?;
//!
//! let mut scope = source.scope();
//! scope.begin().await?;
//! let id = scope.insert(&user).await?.last_insert_id;
//! let active: Vec<User> = scope
//!     .query_list(&Predicate::compile(&filter, User::fields())?)
//!     .await?;
//! scope.commit().await?;
//! scope.close().await;
//! ```
//!
//! # Transaction management
//!
//! A [`ConnectionScope`] is one unit of work on one physical connection:
//!
//! - **`begin`** — legal before the connection opens (it opens lazily) and
//!   between transactions; nested transactions are rejected
//! - **`commit`** — only inside a transaction; a commit failure leaves the
//!   scope open and discards the connection, since the session's transaction
//!   state is unknown
//! - **`rollback`** — a no-op outside a transaction, so cleanup paths can
//!   call it unconditionally
//! - **`close`** — rolls back a live transaction, releases the connection,
//!   and is idempotent
//!
//! # Error bridging
//!
//! Due to Rust's orphan rules, `From<sqlx::Error> for DataError` can't be
//! implemented here. Use the [`SqlxErrorExt`] trait instead:
//!
//! ```ignore
//! use strata_data_sqlx::SqlxErrorExt;
//!
//! let row = sqlx::query("SELECT ...")
//!     .fetch_one(&pool)
//!     .await
//!     .map_err(|e| e.into_data_error())?;
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod observe;
pub mod scope;

pub use config::DataSourceConfig;
pub use driver::SqlxDriver;
pub use error::{CommandTimeout, SqlxErrorExt, SqlxResult};
pub use observe::{NoopObserver, SqlObserver, TracingObserver};
pub use scope::{ConnectionScope, DataSource};
