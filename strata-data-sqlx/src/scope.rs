use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use sqlx::pool::{Pool, PoolConnection, PoolOptions};
use sqlx::{ColumnIndex, Executor, FromRow, IntoArguments, Row};
use strata_data::plan;
use strata_data::{
    CloseAction, DataError, Descriptor, Dialect, ExecResult, MutationPlan, Page, PageRequest,
    Predicate, ScopeLifecycle, ScopeState, SortSpec, Statement, TableSchema, Value,
};

use crate::config::DataSourceConfig;
use crate::driver::SqlxDriver;
use crate::error::{CommandTimeout, SqlxErrorExt};
use crate::observe::{NoopObserver, SqlObserver, TracingObserver};

/// Rows per multi-row `INSERT` statement in [`ConnectionScope::insert_many`].
/// Keeps the placeholder count of a wide table well under driver limits
/// (SQLite caps at 999 by default).
const INSERT_CHUNK_ROWS: usize = 100;

/// A configured database plus the settings every scope inherits.
///
/// Cheap to clone; the pool is shared. Scopes created from one data source
/// each own their physical connection for the duration of a unit of work.
pub struct DataSource<DB: SqlxDriver> {
    pool: Pool<DB>,
    dialect: Dialect,
    command_timeout: Duration,
    observer: Arc<dyn SqlObserver>,
}

impl<DB: SqlxDriver> DataSource<DB> {
    /// Open a data source from configuration.
    ///
    /// The configured dialect must match the driver this data source is
    /// instantiated for; a mismatch fails here with `UnsupportedDialect`
    /// rather than at first statement. The pool connects lazily.
    pub fn open(config: &DataSourceConfig) -> Result<Self, DataError> {
        let dialect = Dialect::parse(&config.dialect)?;
        if dialect != DB::DIALECT {
            return Err(DataError::UnsupportedDialect {
                dialect: config.dialect.clone(),
            });
        }
        let pool = PoolOptions::<DB>::new()
            .max_connections(config.max_connections)
            .connect_lazy(&config.url)
            .map_err(DataError::connection)?;
        let observer: Arc<dyn SqlObserver> = if config.trace_sql {
            Arc::new(TracingObserver)
        } else {
            Arc::new(NoopObserver)
        };
        Ok(Self {
            pool,
            dialect,
            command_timeout: config.command_timeout,
            observer,
        })
    }

    /// Wrap an existing pool with default settings.
    pub fn from_pool(pool: Pool<DB>) -> Self {
        Self {
            pool,
            dialect: DB::DIALECT,
            command_timeout: DataSourceConfig::DEFAULT_COMMAND_TIMEOUT,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Replace the statement observer.
    pub fn with_observer(mut self, observer: Arc<dyn SqlObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Start a new unit of work. No connection is taken until the first
    /// statement runs.
    pub fn scope(&self) -> ConnectionScope<DB> {
        ConnectionScope {
            pool: self.pool.clone(),
            conn: None,
            lifecycle: ScopeLifecycle::new(),
            dialect: self.dialect,
            command_timeout: self.command_timeout,
            observer: Arc::clone(&self.observer),
        }
    }

    pub fn pool(&self) -> &Pool<DB> {
        &self.pool
    }
}

impl<DB: SqlxDriver> std::fmt::Debug for DataSource<DB> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSource")
            .field("dialect", &self.dialect)
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}

impl<DB: SqlxDriver> Clone for DataSource<DB> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            dialect: self.dialect,
            command_timeout: self.command_timeout,
            observer: Arc::clone(&self.observer),
        }
    }
}

/// One unit of work against the database.
///
/// Owns a single physical connection from open to close, so statements and
/// transaction control all hit the same session. Not `Clone` and not shared:
/// a scope belongs to one caller.
///
/// Paging runs its count and window queries back-to-back on this connection;
/// under weak isolation a concurrent writer can still change the total
/// between the two. Callers needing an exact pair run the page inside a
/// transaction at an appropriate isolation level.
pub struct ConnectionScope<DB: SqlxDriver> {
    pool: Pool<DB>,
    conn: Option<PoolConnection<DB>>,
    lifecycle: ScopeLifecycle,
    dialect: Dialect,
    command_timeout: Duration,
    observer: Arc<dyn SqlObserver>,
}

impl<DB> ConnectionScope<DB>
where
    DB: SqlxDriver,
    for<'c> &'c mut DB::Connection: Executor<'c, Database = DB>,
    for<'q> DB::Arguments<'q>: IntoArguments<'q, DB>,
    usize: ColumnIndex<DB::Row>,
    for<'r> i64: sqlx::Decode<'r, DB> + sqlx::Type<DB>,
{
    pub fn state(&self) -> ScopeState {
        self.lifecycle.state()
    }

    pub fn in_transaction(&self) -> bool {
        self.lifecycle.in_transaction()
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    // ── Typed queries ───────────────────────────────────────────────────

    /// All rows matching the predicate, in storage order.
    pub async fn query_list<T>(&mut self, predicate: &Predicate) -> Result<Vec<T>, DataError>
    where
        T: TableSchema + for<'r> FromRow<'r, DB::Row>,
    {
        let stmt = plan::select::<T>(predicate, &[], None)?;
        self.fetch_mapped(&stmt).await
    }

    /// All rows matching the predicate, with an explicit ordering.
    pub async fn query_list_ordered<T>(
        &mut self,
        predicate: &Predicate,
        order_by: &[SortSpec],
    ) -> Result<Vec<T>, DataError>
    where
        T: TableSchema + for<'r> FromRow<'r, DB::Row>,
    {
        let stmt = plan::select::<T>(predicate, order_by, None)?;
        self.fetch_mapped(&stmt).await
    }

    /// The first row matching the predicate, if any.
    pub async fn query_one<T>(&mut self, predicate: &Predicate) -> Result<Option<T>, DataError>
    where
        T: TableSchema + for<'r> FromRow<'r, DB::Row>,
    {
        let stmt = plan::select::<T>(predicate, &[], None)?;
        let row = self.fetch_one_row(&stmt).await?;
        row.map(|row| T::from_row(&row).map_err(|e| e.into_data_error()))
            .transpose()
    }

    /// Run caller-supplied SQL with named `@placeholder` parameters and map
    /// the rows.
    pub async fn query_list_sql<T>(
        &mut self,
        sql: impl Into<String>,
        params: Vec<(String, Value)>,
    ) -> Result<Vec<T>, DataError>
    where
        T: for<'r> FromRow<'r, DB::Row>,
    {
        let stmt = Statement::new(sql, params);
        self.fetch_mapped(&stmt).await
    }

    /// Like [`query_list_sql`](Self::query_list_sql) but for a single
    /// optional row.
    pub async fn query_one_sql<T>(
        &mut self,
        sql: impl Into<String>,
        params: Vec<(String, Value)>,
    ) -> Result<Option<T>, DataError>
    where
        T: for<'r> FromRow<'r, DB::Row>,
    {
        let stmt = Statement::new(sql, params);
        let row = self.fetch_one_row(&stmt).await?;
        row.map(|row| T::from_row(&row).map_err(|e| e.into_data_error()))
            .transpose()
    }

    // ── Mutations ───────────────────────────────────────────────────────

    /// Insert a model, skipping key fields (generated keys). The returned
    /// result carries the generated id on drivers that report one.
    pub async fn insert<T>(&mut self, model: &T) -> Result<ExecResult, DataError>
    where
        T: TableSchema + Serialize,
    {
        let descriptor = Descriptor::from_model(model)?;
        let stmt = plan::insert::<T>(&descriptor, false)?;
        self.execute(&stmt).await
    }

    /// Insert a model including its key fields (natural or caller-assigned
    /// keys).
    pub async fn insert_with_keys<T>(&mut self, model: &T) -> Result<ExecResult, DataError>
    where
        T: TableSchema + Serialize,
    {
        let descriptor = Descriptor::from_model(model)?;
        let stmt = plan::insert::<T>(&descriptor, true)?;
        self.execute(&stmt).await
    }

    /// Insert a batch of models, skipping key fields. The batch runs as one
    /// multi-row statement per chunk of [`INSERT_CHUNK_ROWS`]; wrap the call
    /// in a transaction for all-or-nothing semantics. Returns the total
    /// number of rows inserted.
    pub async fn insert_many<T>(&mut self, models: &[T]) -> Result<u64, DataError>
    where
        T: TableSchema + Serialize,
    {
        let mut total = 0;
        for chunk in models.chunks(INSERT_CHUNK_ROWS) {
            let descriptors = chunk
                .iter()
                .map(Descriptor::from_model)
                .collect::<Result<Vec<_>, _>>()?;
            let stmt = plan::insert_many::<T>(&descriptors, false)?;
            total += self.execute(&stmt).await?.rows_affected;
        }
        Ok(total)
    }

    /// Whole-model update keyed on the schema's key fields. Returns the
    /// number of rows affected.
    pub async fn update_model<T>(&mut self, model: &T) -> Result<u64, DataError>
    where
        T: TableSchema + Serialize,
    {
        let descriptor = Descriptor::from_model(model)?;
        let stmt = plan::update_by_key::<T>(&descriptor)?;
        Ok(self.execute(&stmt).await?.rows_affected)
    }

    /// Partial update from a combined set-and-where descriptor.
    pub async fn update<T>(&mut self, descriptor: &Descriptor) -> Result<u64, DataError>
    where
        T: TableSchema,
    {
        let mutation = MutationPlan::compile(descriptor, T::fields())?;
        let stmt = plan::update::<T>(&mutation)?;
        Ok(self.execute(&stmt).await?.rows_affected)
    }

    /// Delete all rows matching the predicate.
    pub async fn delete<T>(&mut self, predicate: &Predicate) -> Result<u64, DataError>
    where
        T: TableSchema,
    {
        let stmt = plan::delete::<T>(predicate)?;
        Ok(self.execute(&stmt).await?.rows_affected)
    }

    /// Delete a model by its key fields.
    pub async fn delete_model<T>(&mut self, model: &T) -> Result<u64, DataError>
    where
        T: TableSchema + Serialize,
    {
        let descriptor = Descriptor::from_model(model)?;
        let stmt = plan::delete_by_key::<T>(&descriptor)?;
        Ok(self.execute(&stmt).await?.rows_affected)
    }

    // ── Aggregates and paging ───────────────────────────────────────────

    pub async fn count<T>(&mut self, predicate: &Predicate) -> Result<u64, DataError>
    where
        T: TableSchema,
    {
        let stmt = plan::count::<T>(predicate)?;
        let value = self.fetch_scalar(&stmt).await?;
        Ok(u64::try_from(value).unwrap_or(0))
    }

    /// Sum an integer-valued field over the matching rows; zero for an
    /// empty match.
    pub async fn sum<T>(&mut self, field: &str, predicate: &Predicate) -> Result<i64, DataError>
    where
        T: TableSchema,
    {
        let stmt = plan::sum::<T>(field, predicate)?;
        self.fetch_scalar(&stmt).await
    }

    /// One page of matching rows plus the total count.
    pub async fn page<T>(
        &mut self,
        predicate: &Predicate,
        request: &PageRequest,
    ) -> Result<Page<T>, DataError>
    where
        T: TableSchema + for<'r> FromRow<'r, DB::Row>,
    {
        request.validate()?;
        let total = self.count::<T>(predicate).await?;
        let window = plan::window::<T>(predicate, request)?;
        let items = self.fetch_mapped(&window).await?;
        Ok(Page::new(items, request, total))
    }

    /// Page over caller-supplied SQL. The base query is wrapped in a
    /// subquery for both the count and the window.
    pub async fn page_over<T>(
        &mut self,
        base_sql: &str,
        params: &[(String, Value)],
        request: &PageRequest,
    ) -> Result<Page<T>, DataError>
    where
        T: for<'r> FromRow<'r, DB::Row>,
    {
        request.validate()?;
        let count_stmt = plan::count_over(base_sql, params);
        let total = u64::try_from(self.fetch_scalar(&count_stmt).await?).unwrap_or(0);
        let window = plan::window_over(base_sql, params, request)?;
        let items = self.fetch_mapped(&window).await?;
        Ok(Page::new(items, request, total))
    }

    // ── Raw statements ──────────────────────────────────────────────────

    /// Execute a compiled statement.
    pub async fn execute(&mut self, statement: &Statement) -> Result<ExecResult, DataError> {
        let (sql, values) = statement.lower(self.dialect)?;
        let result = self.run_execute(&sql, &values, "execute").await?;
        Ok(ExecResult {
            rows_affected: DB::rows_affected(&result),
            last_insert_id: DB::last_insert_id(&result),
        })
    }

    /// Execute caller-supplied SQL with named `@placeholder` parameters.
    pub async fn execute_sql(
        &mut self,
        sql: impl Into<String>,
        params: Vec<(String, Value)>,
    ) -> Result<ExecResult, DataError> {
        let stmt = Statement::new(sql, params);
        self.execute(&stmt).await
    }

    // ── Transactions ────────────────────────────────────────────────────

    /// Begin a transaction. Legal from `Unopened` (the connection opens
    /// lazily) and `Open`; nested transactions are rejected.
    pub async fn begin(&mut self) -> Result<(), DataError> {
        self.lifecycle.ensure_can_begin()?;
        self.run_execute(self.dialect.begin_sql(), &[], "begin")
            .await?;
        self.lifecycle.on_begin();
        Ok(())
    }

    /// Commit the active transaction. An error leaves the scope open, with
    /// the connection discarded: after a failed or timed-out `COMMIT` the
    /// session's transaction state is unknown, so the connection must not
    /// reach the pool. The next statement acquires a fresh one.
    pub async fn commit(&mut self) -> Result<(), DataError> {
        self.lifecycle.ensure_can_commit()?;
        match self
            .run_execute(self.dialect.commit_sql(), &[], "commit")
            .await
        {
            Ok(_) => {
                self.lifecycle.on_commit();
                Ok(())
            }
            Err(err) => {
                self.lifecycle.on_commit_failed();
                self.discard_conn("commit failed");
                Err(err)
            }
        }
    }

    /// Roll back the active transaction. A no-op outside a transaction, so
    /// cleanup paths can call it unconditionally. A failed physical rollback
    /// discards the connection, like a failed commit.
    pub async fn rollback(&mut self) -> Result<(), DataError> {
        if !self.lifecycle.in_transaction() {
            return Ok(());
        }
        let result = self
            .run_execute(self.dialect.rollback_sql(), &[], "rollback")
            .await;
        self.lifecycle.on_rollback();
        if result.is_err() {
            self.discard_conn("rollback failed");
        }
        result.map(|_| ())
    }

    /// Release the connection. A live transaction is rolled back first;
    /// failures are logged and swallowed. Idempotent.
    pub async fn close(&mut self) {
        match self.lifecycle.close() {
            CloseAction::AlreadyClosed => {}
            CloseAction::Release { rollback } => {
                let Some(mut conn) = self.conn.take() else {
                    return;
                };
                if rollback {
                    let outcome = sqlx::query::<DB>(self.dialect.rollback_sql())
                        .execute(&mut *conn)
                        .await;
                    if let Err(error) = outcome {
                        tracing::warn!(%error, "rollback on close failed; discarding connection");
                        drop(conn.detach());
                        return;
                    }
                }
                // Returns to the pool
                drop(conn);
            }
        }
    }

    // ── Internals ───────────────────────────────────────────────────────

    /// Close the physical connection instead of pooling it. Used after
    /// transaction-control failures, where session state is unknown.
    fn discard_conn(&mut self, reason: &'static str) {
        if let Some(conn) = self.conn.take() {
            tracing::warn!(reason, "discarding connection");
            drop(conn.detach());
        }
    }

    async fn ensure_conn(&mut self, operation: &'static str) -> Result<(), DataError> {
        self.lifecycle.ensure_usable(operation)?;
        if self.conn.is_none() {
            let conn = self.pool.acquire().await.map_err(DataError::connection)?;
            self.conn = Some(conn);
            self.lifecycle.mark_open();
        }
        Ok(())
    }

    async fn run_execute(
        &mut self,
        sql: &str,
        values: &[Value],
        operation: &'static str,
    ) -> Result<DB::QueryResult, DataError> {
        self.ensure_conn(operation).await?;
        let timeout = self.command_timeout;
        let conn = self.conn.as_mut().expect("connection acquired above");
        let mut query = sqlx::query::<DB>(sql);
        for value in values {
            query = DB::bind(query, value);
        }
        let started = Instant::now();
        let outcome = match tokio::time::timeout(timeout, query.execute(&mut **conn)).await {
            Err(_) => Err(DataError::driver(CommandTimeout { timeout })),
            Ok(Err(err)) => Err(err.into_data_error()),
            Ok(Ok(result)) => Ok(result),
        };
        self.observer
            .statement_executed(sql, started.elapsed(), outcome.is_ok());
        outcome
    }

    async fn fetch_all_rows(&mut self, statement: &Statement) -> Result<Vec<DB::Row>, DataError> {
        let (sql, values) = statement.lower(self.dialect)?;
        self.ensure_conn("query").await?;
        let timeout = self.command_timeout;
        let conn = self.conn.as_mut().expect("connection acquired above");
        let mut query = sqlx::query::<DB>(&sql);
        for value in &values {
            query = DB::bind(query, value);
        }
        let started = Instant::now();
        let outcome = match tokio::time::timeout(timeout, query.fetch_all(&mut **conn)).await {
            Err(_) => Err(DataError::driver(CommandTimeout { timeout })),
            Ok(Err(err)) => Err(err.into_data_error()),
            Ok(Ok(rows)) => Ok(rows),
        };
        self.observer
            .statement_executed(&sql, started.elapsed(), outcome.is_ok());
        outcome
    }

    async fn fetch_one_row(&mut self, statement: &Statement) -> Result<Option<DB::Row>, DataError> {
        let (sql, values) = statement.lower(self.dialect)?;
        self.ensure_conn("query").await?;
        let timeout = self.command_timeout;
        let conn = self.conn.as_mut().expect("connection acquired above");
        let mut query = sqlx::query::<DB>(&sql);
        for value in &values {
            query = DB::bind(query, value);
        }
        let started = Instant::now();
        let outcome = match tokio::time::timeout(timeout, query.fetch_optional(&mut **conn)).await {
            Err(_) => Err(DataError::driver(CommandTimeout { timeout })),
            Ok(Err(err)) => Err(err.into_data_error()),
            Ok(Ok(row)) => Ok(row),
        };
        self.observer
            .statement_executed(&sql, started.elapsed(), outcome.is_ok());
        outcome
    }

    async fn fetch_mapped<T>(&mut self, statement: &Statement) -> Result<Vec<T>, DataError>
    where
        T: for<'r> FromRow<'r, DB::Row>,
    {
        let rows = self.fetch_all_rows(statement).await?;
        rows.iter()
            .map(|row| T::from_row(row).map_err(|e| e.into_data_error()))
            .collect()
    }

    async fn fetch_scalar(&mut self, statement: &Statement) -> Result<i64, DataError> {
        let row = self
            .fetch_one_row(statement)
            .await?
            .ok_or_else(|| DataError::NotFound("Aggregate query returned no row".into()))?;
        row.try_get::<i64, _>(0).map_err(|e| e.into_data_error())
    }
}

impl<DB: SqlxDriver> Drop for ConnectionScope<DB> {
    /// A scope dropped mid-transaction must not hand its connection back to
    /// the pool: the next borrower would inherit the open transaction.
    /// Detaching closes the physical connection, which aborts the
    /// transaction server-side.
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if self.lifecycle.in_transaction() {
                tracing::warn!("scope dropped with an active transaction; discarding connection");
                drop(conn.detach());
            }
        }
    }
}
