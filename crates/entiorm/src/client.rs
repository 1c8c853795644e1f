//! Store traits: the narrow interface the query layer needs from a database driver.
//!
//! - [`Executor`]: run a statement, returning rows or an affected-row count.
//! - [`Store`]: the shared, non-transactional handle; can begin transactions.
//! - [`TxExecutor`]: a live transaction; commit, rollback, savepoints.
//!
//! SQL handed to these traits uses `?` placeholders with list arguments
//! already expanded. Drivers renumber placeholders for their dialect.

use crate::error::OrmResult;
use crate::row::Record;
use crate::value::Value;
use std::future::Future;

/// Stops a statement that is still running on the server.
///
/// Called at most once, from inside a tokio runtime; implementations spawn
/// whatever request they need and return immediately.
pub type CancelHook = Box<dyn FnOnce() + Send>;

/// Something that can execute SQL: the shared store or an open transaction.
pub trait Executor: Send + Sync {
    /// Execute a query and return all rows.
    fn query(
        &self,
        sql: &str,
        args: &[Value],
    ) -> impl Future<Output = OrmResult<Vec<Record>>> + Send;

    /// Execute a statement and return the number of affected rows.
    fn execute(&self, sql: &str, args: &[Value]) -> impl Future<Output = OrmResult<u64>> + Send;

    /// Hook the session fires when a statement on this executor times out.
    fn cancel_hook(&self) -> Option<CancelHook> {
        None
    }
}

/// The process-wide database handle.
///
/// Implementations are shared by every builder of a [`Session`](crate::Session)
/// and must allow concurrent use.
pub trait Store: Executor + 'static {
    type Tx: TxExecutor;

    /// Begin a transaction.
    fn begin(&self) -> impl Future<Output = OrmResult<Self::Tx>> + Send;
}

/// An open transaction.
pub trait TxExecutor: Executor + 'static {
    /// Commit the transaction.
    fn commit(self) -> impl Future<Output = OrmResult<()>> + Send;

    /// Roll back the whole transaction.
    fn rollback(self) -> impl Future<Output = OrmResult<()>> + Send;

    /// `SAVEPOINT name`
    fn savepoint(&self, name: &str) -> impl Future<Output = OrmResult<()>> + Send;

    /// `ROLLBACK TO SAVEPOINT name`. The transaction stays open.
    fn rollback_to(&self, name: &str) -> impl Future<Output = OrmResult<()>> + Send;

    /// `RELEASE SAVEPOINT name`
    fn release(&self, name: &str) -> impl Future<Output = OrmResult<()>> + Send;
}
