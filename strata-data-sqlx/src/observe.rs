use std::time::Duration;

/// Hook invoked for every statement a connection scope executes.
///
/// The scope times the statement around the driver call; observers see the
/// lowered SQL text (positional placeholders), never parameter values.
pub trait SqlObserver: Send + Sync {
    fn statement_executed(&self, sql: &str, elapsed: Duration, success: bool);
}

/// Observer that does nothing. The default when SQL tracing is off.
pub struct NoopObserver;

impl SqlObserver for NoopObserver {
    fn statement_executed(&self, _sql: &str, _elapsed: Duration, _success: bool) {}
}

/// Observer that emits each statement through `tracing`.
///
/// Successful statements log at `debug`, failures at `warn`. Enabled by the
/// `trace-sql` datasource setting.
pub struct TracingObserver;

impl SqlObserver for TracingObserver {
    fn statement_executed(&self, sql: &str, elapsed: Duration, success: bool) {
        if success {
            tracing::debug!(sql, elapsed_ms = elapsed.as_millis() as u64, "statement executed");
        } else {
            tracing::warn!(sql, elapsed_ms = elapsed.as_millis() as u64, "statement failed");
        }
    }
}
