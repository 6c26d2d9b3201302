//! Generic database client capability.
//!
//! [`Client`] is what callers program against. [`PgPool`] implements it by
//! checking out a connection for the duration of each call.

use crate::error::{PgClientError, Result};
use crate::models::CommandTag;
use crate::services::pool::PgPool;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use std::collections::VecDeque;
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;

/// Owned statement parameter, as queued in a [`Batch`].
pub type BoxedParam = Box<dyn ToSql + Sync + Send>;

/// Capability set shared by every database client.
#[async_trait]
pub trait Client: Send + Sync {
    /// Execute a statement and report how many rows it touched.
    async fn exec(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<CommandTag>;

    /// Run a query and collect its rows.
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Vec<Row>>;

    /// Run a query that must return exactly one row.
    async fn query_row(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Row>;

    /// Start a transaction on a dedicated connection.
    async fn begin(&self) -> Result<Transaction>;

    /// Run every queued statement on one connection, in queue order.
    async fn send_batch(&self, batch: Batch) -> Result<BatchResults>;

    /// Release all resources held by the client.
    fn close(&self);
}

#[async_trait]
impl Client for PgPool {
    async fn exec(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<CommandTag> {
        self.acquire().await?.execute(sql, params).await
    }

    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Vec<Row>> {
        self.acquire().await?.query(sql, params).await
    }

    async fn query_row(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Row> {
        self.acquire().await?.query_row(sql, params).await
    }

    async fn begin(&self) -> Result<Transaction> {
        self.acquire().await?.begin().await
    }

    async fn send_batch(&self, batch: Batch) -> Result<BatchResults> {
        let conn = self.acquire().await?;
        tracing::debug!(pool_id = %self.id(), statements = batch.len(), "Sending batch");
        Ok(run_batch(conn.client(), batch).await)
    }

    fn close(&self) {
        PgPool::close(self);
    }
}

/// A statement waiting in a [`Batch`].
#[derive(Debug)]
struct QueuedStatement {
    sql: String,
    params: Vec<BoxedParam>,
}

/// Statements sent together with [`Client::send_batch`].
#[derive(Debug, Default)]
pub struct Batch {
    statements: Vec<QueuedStatement>,
}

impl Batch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a statement with owned parameters.
    pub fn queue(&mut self, sql: impl Into<String>, params: Vec<BoxedParam>) -> &mut Self {
        self.statements.push(QueuedStatement { sql: sql.into(), params });
        self
    }

    /// Number of queued statements.
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Check if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// One result per queued statement, in queue order.
#[derive(Debug)]
pub struct BatchResults {
    results: VecDeque<Result<Vec<Row>>>,
}

impl BatchResults {
    /// Number of results not yet taken.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Check if every result has been taken.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl Iterator for BatchResults {
    type Item = Result<Vec<Row>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.results.pop_front()
    }
}

/// Run the statements one after another, in queue order.
///
/// Each statement completes before the next is sent, so an error in one
/// never reaches the server ahead of the statements queued before it.
pub(crate) async fn run_batch(client: &tokio_postgres::Client, batch: Batch) -> BatchResults {
    let results: Vec<Result<Vec<Row>>> = stream::iter(batch.statements.iter())
        .then(|statement| run_statement(client, statement))
        .collect()
        .await;

    BatchResults { results: results.into() }
}

async fn run_statement(client: &tokio_postgres::Client, statement: &QueuedStatement) -> Result<Vec<Row>> {
    let params: Vec<&(dyn ToSql + Sync)> =
        statement.params.iter().map(|p| &**p as &(dyn ToSql + Sync)).collect();
    client.query(statement.sql.as_str(), &params).await.map_err(PgClientError::from)
}

/// A transaction that owns its pooled connection.
///
/// Dropping it without [`commit`](Self::commit) or
/// [`rollback`](Self::rollback) rolls back in the background.
pub struct Transaction {
    object: Option<deadpool_postgres::Object>,
}

impl Transaction {
    pub(crate) async fn begin(object: deadpool_postgres::Object) -> Result<Self> {
        object.batch_execute("BEGIN").await?;
        tracing::debug!("Transaction started");
        Ok(Self { object: Some(object) })
    }

    fn client(&self) -> Result<&tokio_postgres::Client> {
        match &self.object {
            Some(object) => {
                let client: &tokio_postgres::Client = object;
                Ok(client)
            }
            None => Err(PgClientError::connection("Transaction already finished")),
        }
    }

    /// Execute a statement within the transaction.
    pub async fn exec(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<CommandTag> {
        let rows = self.client()?.execute(sql, params).await?;
        Ok(CommandTag::new(rows))
    }

    /// Run a query within the transaction.
    pub async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Vec<Row>> {
        Ok(self.client()?.query(sql, params).await?)
    }

    /// Run a single-row query within the transaction.
    pub async fn query_row(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Row> {
        Ok(self.client()?.query_one(sql, params).await?)
    }

    /// Run a batch within the transaction.
    pub async fn send_batch(&self, batch: Batch) -> Result<BatchResults> {
        Ok(run_batch(self.client()?, batch).await)
    }

    /// Commit the transaction.
    pub async fn commit(mut self) -> Result<()> {
        self.finish("COMMIT").await
    }

    /// Roll the transaction back explicitly.
    pub async fn rollback(mut self) -> Result<()> {
        self.finish("ROLLBACK").await
    }

    async fn finish(&mut self, statement: &str) -> Result<()> {
        let Some(object) = self.object.take() else {
            return Err(PgClientError::connection("Transaction already finished"));
        };
        let result = object.batch_execute(statement).await;
        if let Err(e) = result {
            // Connection state is unknown; keep it out of the pool.
            let _ = deadpool_postgres::Object::take(object);
            return Err(e.into());
        }
        tracing::debug!(statement, "Transaction finished");
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        let Some(object) = self.object.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let result = object.batch_execute("ROLLBACK").await;
                    if let Err(e) = result {
                        tracing::warn!(error = %e, "Rollback of abandoned transaction failed");
                        let _ = deadpool_postgres::Object::take(object);
                    }
                });
            }
            Err(_) => {
                tracing::warn!("Transaction dropped outside a runtime; detaching connection");
                let _ = deadpool_postgres::Object::take(object);
            }
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction").field("finished", &self.object.is_none()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Options, PoolTuning};

    #[test]
    fn test_batch_queue() {
        let mut batch = Batch::new();
        assert!(batch.is_empty());

        batch
            .queue("INSERT INTO t (a) VALUES ($1)", vec![Box::new(1i32)])
            .queue("SELECT a FROM t WHERE a = $1", vec![Box::new(1i32)]);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.statements[0].sql, "INSERT INTO t (a) VALUES ($1)");
        assert_eq!(batch.statements[1].params.len(), 1);
    }

    #[test]
    fn test_batch_results_preserve_order() {
        let mut results = BatchResults {
            results: vec![Ok(Vec::new()), Err(PgClientError::connection("boom")), Ok(Vec::new())]
                .into(),
        };
        assert_eq!(results.len(), 3);
        assert!(results.next().unwrap().is_ok());
        assert!(results.next().unwrap().is_err());
        assert!(results.next().unwrap().is_ok());
        assert!(results.next().is_none());
        assert!(results.is_empty());
    }

    #[test]
    fn test_client_is_object_safe() {
        fn assert_dyn(_: Option<&dyn Client>) {}
        assert_dyn(None);
    }

    async fn live_pool() -> PgPool {
        let url = std::env::var("PGCLIENT_TEST_URL").expect("PGCLIENT_TEST_URL not set");
        let options = Options::from_url(&url).unwrap().with_max_pool_size(2);
        PgPool::connect_with_tuning(options.clone(), PoolTuning::from_options(&options))
            .await
            .unwrap()
    }

    /// Requires a live server at `PGCLIENT_TEST_URL`.
    #[tokio::test]
    #[ignore]
    async fn test_client_roundtrip_live() {
        let pool = live_pool().await;
        let client: &dyn Client = &pool;

        client.exec("CREATE TEMP TABLE IF NOT EXISTS pgclient_t (a INT4)", &[]).await.unwrap();
        let rows = client.query("SELECT generate_series(1, 3)", &[]).await.unwrap();
        assert_eq!(rows.len(), 3);
        let row = client.query_row("SELECT 'ok'::TEXT", &[]).await.unwrap();
        assert_eq!(row.get::<_, String>(0), "ok");

        client.close();
    }

    /// Requires a live server at `PGCLIENT_TEST_URL`.
    #[tokio::test]
    #[ignore]
    async fn test_transaction_and_batch_live() {
        let pool = live_pool().await;

        let tx = pool.begin().await.unwrap();
        tx.exec("CREATE TEMP TABLE pgclient_tx (a INT4)", &[]).await.unwrap();
        let tag = tx.exec("INSERT INTO pgclient_tx VALUES (1), (2)", &[]).await.unwrap();
        assert_eq!(tag.rows_affected(), 2);

        let mut batch = Batch::new();
        batch
            .queue("SELECT count(*)::INT4 FROM pgclient_tx", Vec::new())
            .queue("SELECT * FROM missing_table", Vec::new())
            .queue("SELECT $1::INT4", vec![Box::new(7i32)]);
        let mut results = tx.send_batch(batch).await.unwrap();
        assert_eq!(results.next().unwrap().unwrap()[0].get::<_, i32>(0), 2);
        assert_eq!(results.next().unwrap().unwrap_err().pg_code(), Some("42P01"));
        // The failure aborted the transaction; later statements are refused.
        assert_eq!(results.next().unwrap().unwrap_err().pg_code(), Some("25P02"));

        tx.rollback().await.unwrap();
        assert!(pool.status().available >= 1);
        pool.close();
    }

    /// Requires a live server at `PGCLIENT_TEST_URL`.
    #[tokio::test]
    #[ignore]
    async fn test_batch_failure_in_middle_live() {
        let pool = live_pool().await;

        let mut batch = Batch::new();
        batch
            .queue("SELECT 1::INT4", Vec::new())
            .queue("SELECT * FROM missing_table", Vec::new())
            .queue("SELECT 2::INT4", Vec::new());
        let results: Vec<_> = pool.send_batch(batch).await.unwrap().collect();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap()[0].get::<_, i32>(0), 1);
        assert_eq!(results[1].as_ref().unwrap_err().pg_code(), Some("42P01"));
        assert_eq!(results[2].as_ref().unwrap()[0].get::<_, i32>(0), 2);

        pool.close();
    }

    /// Requires a live server at `PGCLIENT_TEST_URL`.
    #[tokio::test]
    #[ignore]
    async fn test_transaction_batch_failure_in_middle_live() {
        let pool = live_pool().await;
        let tx = pool.begin().await.unwrap();

        let mut batch = Batch::new();
        batch
            .queue("SELECT 1::INT4", Vec::new())
            .queue("SELECT * FROM missing_table", Vec::new())
            .queue("SELECT 2::INT4", Vec::new());
        let codes: Vec<Option<String>> = tx
            .send_batch(batch)
            .await
            .unwrap()
            .map(|r| r.err().and_then(|e| e.pg_code().map(String::from)))
            .collect();
        assert_eq!(codes, vec![None, Some("42P01".to_string()), Some("25P02".to_string())]);

        // Rolling back an aborted transaction succeeds and the connection goes back.
        tx.rollback().await.unwrap();
        pool.acquire().await.unwrap().ping().await.unwrap();
        pool.close();
    }
}
