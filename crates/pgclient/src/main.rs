//! pgclient - open a PostgreSQL pool, ping it, report its status.
//!
//! Options come from the JSON file named by the first argument or by
//! `PGCLIENT_CONFIG`, and otherwise from `PG_*` / `DATABASE_URL`.

use pgclient_core::logging::{init_logging, LogConfig};
use pgclient_core::{Client, Options, PgPool};
use std::process::ExitCode;

/// Environment variable naming a JSON options file.
const CONFIG_ENV_VAR: &str = "PGCLIENT_CONFIG";

#[tokio::main]
async fn main() -> ExitCode {
    let log_config = LogConfig::new(pgclient_core::logging::log_dir());
    let _logging_guard = init_logging(log_config);

    let options = match load_options() {
        Ok(options) => options,
        Err(e) => {
            tracing::error!(error = %e, hint = e.hint(), "Failed to load options");
            return ExitCode::FAILURE;
        }
    };

    let pool = match PgPool::connect(options).await {
        Ok(pool) => pool,
        Err(e) => {
            let cause = std::error::Error::source(&e).map(|s| s.to_string());
            tracing::error!(error = %e, cause = cause.as_deref(), hint = e.hint(), "Failed to open pool");
            return ExitCode::FAILURE;
        }
    };

    let status = pool.status();
    println!(
        "connected to {} (pool {}: size {}/{}, idle {})",
        pool.options().display_url(),
        pool.id(),
        status.size,
        status.max_size,
        status.available,
    );

    Client::close(&pool);
    ExitCode::SUCCESS
}

fn load_options() -> pgclient_core::Result<Options> {
    let path = std::env::args().nth(1).or_else(|| std::env::var(CONFIG_ENV_VAR).ok());
    match path {
        Some(path) => Options::from_json_file(path),
        None => Options::from_env(),
    }
}
