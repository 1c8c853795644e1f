//! The explicit connection object.
//!
//! A [`Session`] owns the shared [`Store`] and the execution settings that
//! apply to every statement sent through it. Builders are created from it:
//!
//! ```ignore
//! let session = Session::with_config(
//!     PgStore::connect(&url)?,
//!     SessionConfig::new().timeout(Duration::from_secs(5)),
//! );
//! let open = session.sql(Invoice::default()).filter(eq("status", "open")).find().await?;
//! ```

use crate::builder::Builder;
use crate::client::{CancelHook, Executor, Store};
use crate::error::{OrmError, OrmResult};
use crate::row::{Entity, Record};
use crate::sql::Fragment;
use crate::transaction::Transaction;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Execution settings for a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Per-statement timeout.
    pub query_timeout: Option<Duration>,
    /// Statements at or above this duration are logged at WARN.
    pub slow_query_threshold: Option<Duration>,
    /// Emit a DEBUG event for every statement.
    pub log_sql: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            query_timeout: None,
            slow_query_threshold: None,
            log_sql: true,
        }
    }
}

impl SessionConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set query timeout.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.query_timeout = Some(duration);
        self
    }

    /// Set slow query threshold.
    pub fn slow_threshold(mut self, duration: Duration) -> Self {
        self.slow_query_threshold = Some(duration);
        self
    }

    /// Disable per-statement DEBUG events. Slow query warnings still fire.
    pub fn no_logging(mut self) -> Self {
        self.log_sql = false;
        self
    }
}

/// Shared store plus execution settings. Cheap to clone.
pub struct Session<S> {
    store: Arc<S>,
    config: Arc<SessionConfig>,
}

impl<S> Clone for Session<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S> std::fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S: Store> Session<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, SessionConfig::default())
    }

    pub fn with_config(store: S, config: SessionConfig) -> Self {
        Self {
            store: Arc::new(store),
            config: Arc::new(config),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Start a builder for `entity`.
    pub fn sql<E: Entity>(&self, entity: E) -> Builder<S, E> {
        Builder::new(self.clone(), entity)
    }

    /// Begin a transaction on the shared store.
    pub async fn begin(&self) -> OrmResult<Transaction<S::Tx>> {
        let tx = self.with_timeout(self.store.begin()).await?;
        tracing::debug!(target: "entiorm.tx", "transaction started");
        Ok(Transaction::new(tx))
    }

    // ==================== Execution ====================

    pub(crate) async fn fetch<X: Executor>(&self, exec: &X, stmt: &Fragment) -> OrmResult<Vec<Record>> {
        let stmt = stmt.expand()?;
        let start = Instant::now();
        let result = self
            .with_cancel(exec.cancel_hook(), exec.query(&stmt.sql, &stmt.args))
            .await;
        self.log(&stmt, start.elapsed(), &result);
        result
    }

    pub(crate) async fn execute<X: Executor>(&self, exec: &X, stmt: &Fragment) -> OrmResult<u64> {
        let stmt = stmt.expand()?;
        let start = Instant::now();
        let result = self
            .with_cancel(exec.cancel_hook(), exec.execute(&stmt.sql, &stmt.args))
            .await;
        self.log(&stmt, start.elapsed(), &result);
        result
    }

    /// Execute with timeout if configured.
    pub(crate) async fn with_timeout<T, F>(&self, future: F) -> OrmResult<T>
    where
        F: Future<Output = OrmResult<T>> + Send,
    {
        self.with_cancel(None, future).await
    }

    /// Like [`with_timeout`](Self::with_timeout), firing `cancel` when the
    /// deadline passes so the server stops the statement too.
    async fn with_cancel<T, F>(&self, cancel: Option<CancelHook>, future: F) -> OrmResult<T>
    where
        F: Future<Output = OrmResult<T>> + Send,
    {
        match self.config.query_timeout {
            Some(timeout) => tokio::time::timeout(timeout, future).await.map_err(|_| {
                if let Some(cancel) = cancel {
                    tracing::warn!(
                        target: "entiorm.sql",
                        timeout_ms = timeout.as_millis() as u64,
                        "statement timed out; cancelling"
                    );
                    cancel();
                }
                OrmError::Timeout(timeout)
            })?,
            None => future.await,
        }
    }

    fn log<T>(&self, stmt: &Fragment, elapsed: Duration, result: &OrmResult<T>) {
        let slow = self
            .config
            .slow_query_threshold
            .is_some_and(|threshold| elapsed >= threshold);

        if slow {
            tracing::warn!(
                target: "entiorm.sql",
                sql = %stmt.sql,
                param_count = stmt.args.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "slow query"
            );
        } else if self.config.log_sql {
            tracing::debug!(
                target: "entiorm.sql",
                sql = %stmt.sql,
                param_count = stmt.args.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                ok = result.is_ok(),
                "statement"
            );
        }
    }
}
