//! Database connection pooling with deadpool-postgres.
//!
//! Opening a pool:
//! - builds the driver config from [`Options`]
//! - applies [`PoolTuning`]
//! - checks out one connection and pings it before returning
//! - starts a maintenance task that enforces lifetime, idle and minimum size

use crate::error::{PgClientError, Result};
use crate::models::options::MASKED_PASSWORD;
use crate::models::{CommandTag, Options, PoolStatus, PoolTuning};
use crate::services::client::Transaction;

use chrono::{DateTime, Utc};
use deadpool_postgres::{
    Manager, ManagerConfig, Pool, PoolError, RecyclingMethod, Runtime, Timeouts,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};
use tokio_util::sync::{CancellationToken, DropGuard};
use uuid::Uuid;

/// Application name reported to the server.
const APPLICATION_NAME: &str = "pgclient";

/// A verified pool of PostgreSQL connections.
///
/// Clones share the same pool. The maintenance task stops when the pool is
/// closed or when the last clone is dropped.
#[derive(Clone)]
pub struct PgPool {
    /// Identifier used in log events
    id: Uuid,
    /// Options the pool was opened with
    options: Arc<Options>,
    /// Tuning applied to the pool
    tuning: PoolTuning,
    /// The actual connection pool
    pool: Pool,
    /// When this pool was created
    created_at: DateTime<Utc>,
    /// Stops the maintenance task
    shutdown: CancellationToken,
    _shutdown_guard: Arc<DropGuard>,
}

impl PgPool {
    /// Open a pool with the default tuning and verify it with a ping.
    pub async fn connect(options: Options) -> Result<Self> {
        let tuning = PoolTuning::from_options(&options);
        Self::connect_with_tuning(options, tuning).await
    }

    /// Open a pool with custom tuning and verify it with a ping.
    ///
    /// # Errors
    /// * `Config` - options or tuning are invalid
    /// * `PoolCreation` - the pooling library refused the configuration
    /// * `Acquire` - no connection could be opened
    /// * `Ping` - the server did not answer
    pub async fn connect_with_tuning(options: Options, tuning: PoolTuning) -> Result<Self> {
        tracing::info!(
            host = %options.host,
            port = options.port,
            database = %options.database,
            username = %options.username,
            password = MASKED_PASSWORD,
            max_pool_size = options.max_pool_size,
            "New client options"
        );

        options.validate()?;
        tuning.validate()?;

        let pool = build_pool(&options, &tuning)?;

        {
            let client = pool.get().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to acquire connection from the pool");
                PgClientError::acquire(e)
            })?;

            ping_client(&client).await.map_err(|e| {
                tracing::error!(error = %e, "Ping failed");
                PgClientError::ping(e)
            })?;
        }

        warm_up(&pool, &tuning).await;

        let shutdown = CancellationToken::new();
        tokio::spawn(maintain(pool.clone(), tuning, shutdown.clone()));

        let id = Uuid::new_v4();
        tracing::info!(
            pool_id = %id,
            host = %options.host,
            database = %options.database,
            "postgresql connected"
        );

        Ok(Self {
            id,
            options: Arc::new(options),
            tuning,
            pool,
            created_at: Utc::now(),
            _shutdown_guard: Arc::new(shutdown.clone().drop_guard()),
            shutdown,
        })
    }

    /// Get the pool's identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Get the options the pool was opened with.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Get the tuning applied to the pool.
    pub fn tuning(&self) -> &PoolTuning {
        &self.tuning
    }

    /// Get when this pool was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Acquire a connection from the pool.
    ///
    /// Waits up to the connect timeout if the pool is exhausted.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        let object = self.pool.get().await.map_err(|e| match e {
            PoolError::Timeout(_) => {
                let waiting = self.pool.status().waiting;
                tracing::warn!(pool_id = %self.id, waiting, "Pool exhausted");
                PgClientError::pool_timeout(format!("Pool exhausted after timeout: {e}"), waiting)
            }
            PoolError::Backend(e) => PgClientError::from(e),
            other => PgClientError::connection_with_source("Failed to acquire connection", other),
        })?;

        Ok(PooledConnection { object, pool_id: self.id })
    }

    /// Check out a connection, ping it and give it back.
    pub async fn ping(&self) -> Result<()> {
        self.acquire().await?.ping().await
    }

    /// Get current pool status.
    pub fn status(&self) -> PoolStatus {
        let status = self.pool.status();
        PoolStatus {
            max_size: status.max_size,
            size: status.size,
            available: status.available,
            waiting: status.waiting,
        }
    }

    /// Close the pool, dropping all connections.
    pub fn close(&self) {
        self.shutdown.cancel();
        self.pool.close();
        tracing::info!(pool_id = %self.id, "Connection pool closed");
    }

    /// Check if the pool is closed.
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

impl std::fmt::Debug for PgPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgPool")
            .field("id", &self.id)
            .field("url", &self.options.display_url())
            .field("tuning", &self.tuning)
            .field("status", &self.status())
            .finish()
    }
}

/// Build the deadpool pool. Nothing is connected yet.
fn build_pool(options: &Options, tuning: &PoolTuning) -> Result<Pool> {
    let mut pg_config = tokio_postgres::Config::new();
    pg_config.host(&options.host);
    pg_config.port(options.port);
    pg_config.dbname(&options.database);
    pg_config.user(&options.username);
    pg_config.password(&options.password);
    pg_config.application_name(APPLICATION_NAME);
    pg_config.connect_timeout(tuning.connect_timeout);

    tracing::info!(url = %options.display_url(), "Database url");

    let manager = Manager::from_config(
        pg_config,
        NoTls,
        ManagerConfig { recycling_method: RecyclingMethod::Fast },
    );

    Pool::builder(manager)
        .max_size(tuning.max_size)
        .wait_timeout(Some(tuning.connect_timeout))
        .create_timeout(Some(tuning.connect_timeout))
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create pool");
            PgClientError::pool_creation(e)
        })
}

async fn ping_client(client: &tokio_postgres::Client) -> std::result::Result<(), tokio_postgres::Error> {
    client.batch_execute("SELECT 1").await
}

/// Open connections until the pool holds at least `min_size`.
///
/// Never waits for a free slot: if callers hold every slot the pass gives up
/// and the next one tries again. Returns how many connections were opened.
async fn warm_up(pool: &Pool, tuning: &PoolTuning) -> usize {
    let before = pool.status();
    let missing = tuning.min_size.saturating_sub(before.size);
    if missing == 0 {
        return 0;
    }

    let mut timeouts = Timeouts::default();
    timeouts.wait = Some(Duration::ZERO);
    timeouts.create = Some(tuning.connect_timeout);

    // Idle connections handed out here are held so the next get opens a new one.
    let mut held = Vec::with_capacity(missing + before.available);
    while pool.status().size < tuning.min_size && held.len() < missing + before.available {
        match pool.timeout_get(&timeouts).await {
            Ok(object) => held.push(object),
            Err(PoolError::Timeout(_)) => {
                tracing::debug!(min_size = tuning.min_size, "No free slot for warm-up");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, min_size = tuning.min_size, "Could not reach minimum pool size");
                break;
            }
        }
    }

    let opened = pool.status().size.saturating_sub(before.size);
    tracing::debug!(opened, size = pool.status().size, "Pool warmed up");
    opened
}

/// Periodic pass over idle connections until `shutdown` fires.
async fn maintain(pool: Pool, tuning: PoolTuning, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(tuning.health_check_period) => {}
        }
        if pool.is_closed() {
            break;
        }

        let result = pool.retain(|client, metrics| {
            !client.is_closed() && tuning.keeps(metrics.age(), metrics.last_used())
        });
        if !result.removed.is_empty() {
            tracing::debug!(removed = result.removed.len(), "Dropped stale connections");
        }

        warm_up(&pool, &tuning).await;
    }
    tracing::debug!("Pool maintenance stopped");
}

/// A connection acquired from the pool.
///
/// Automatically returns to the pool when dropped.
pub struct PooledConnection {
    object: deadpool_postgres::Object,
    pool_id: Uuid,
}

impl PooledConnection {
    /// Get the ID of the pool this connection belongs to.
    pub fn pool_id(&self) -> Uuid {
        self.pool_id
    }

    /// Send a trivial statement to prove the server answers.
    pub async fn ping(&self) -> Result<()> {
        ping_client(&self.object).await.map_err(PgClientError::ping)
    }

    /// Execute a statement that doesn't return rows.
    pub async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<CommandTag> {
        let rows = self.object.execute(sql, params).await?;
        Ok(CommandTag::new(rows))
    }

    /// Execute a query that returns rows.
    pub async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Vec<Row>> {
        Ok(self.object.query(sql, params).await?)
    }

    /// Execute a query that returns exactly one row.
    pub async fn query_row(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Row> {
        Ok(self.object.query_one(sql, params).await?)
    }

    /// Execute a query that returns at most one row.
    pub async fn query_opt(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Option<Row>> {
        Ok(self.object.query_opt(sql, params).await?)
    }

    /// Begin a transaction that owns this connection.
    pub async fn begin(self) -> Result<Transaction> {
        Transaction::begin(self.object).await
    }

    pub(crate) fn client(&self) -> &tokio_postgres::Client {
        &self.object
    }
}
