//! Backend services for pgclient.
//!
//! - `pool` - Pool bootstrap and connection checkout with deadpool-postgres
//! - `client` - The generic client capability, transactions and batches

pub mod client;
pub mod pool;

pub use client::{Batch, BatchResults, BoxedParam, Client, Transaction};
pub use pool::{PgPool, PooledConnection};
