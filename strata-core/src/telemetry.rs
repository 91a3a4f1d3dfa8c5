use tracing_subscriber::EnvFilter;

/// Initializes a `tracing` subscriber with an env-filter.
///
/// Reads `RUST_LOG` if set, otherwise defaults to `info` with SQL statement
/// tracing at `debug`. Call once at startup; a second call panics, so tests
/// use `try_init_tracing`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,strata_data_sqlx=debug".parse().unwrap()),
        )
        .init();
}

/// Like [`init_tracing`] but tolerates an already-installed subscriber.
pub fn try_init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,strata_data_sqlx=debug".parse().unwrap()),
        )
        .try_init();
}
