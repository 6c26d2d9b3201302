//! PostgreSQL connection pool bootstrap.
//!
//! Opens a deadpool-postgres pool from a flat set of options, proves it with
//! a single ping and hands it back behind a generic client capability:
//!
//! - **error**: Error type with fixed startup failure messages
//! - **models**: Options, pool tuning and status, command tags
//! - **services**: Pool bootstrap, the `Client` trait, transactions and batches
//! - **logging**: Structured logging setup for binaries

pub mod error;
pub mod logging;
pub mod models;
pub mod services;

pub use error::{PgClientError, Result};
pub use models::{CommandTag, Options, PoolStatus, PoolTuning};
pub use services::{Batch, BatchResults, BoxedParam, Client, PgPool, PooledConnection, Transaction};

pub use tokio_postgres::types::ToSql;
pub use tokio_postgres::Row;
