//! Transaction handles and the write discipline around them.
//!
//! A [`Transaction`] is begun by a builder (`begin()`, `insert_tx()`, ...) or by
//! [`Session::begin`](crate::Session::begin), and can be handed to another
//! builder with `set_tx` to chain writes across entities:
//!
//! ```ignore
//! let tx = session.sql(invoice).insert_tx().await?;          // open, not committed
//! session.sql(invoice_line).set_tx(tx, true).insert().await?;      // commits on success
//! ```
//!
//! Writes against an attached transaction follow one rule set:
//! - on failure, roll back (to the savepoint if one was requested, else the
//!   whole transaction) and return the failure joined with any rollback failure;
//! - on success, commit only when the builder asked for it.

use crate::client::{Store, TxExecutor};
use crate::error::{OrmError, OrmResult};
use crate::session::Session;
use crate::sql::Fragment;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, MutexGuard};

/// Global counter for anonymous savepoint naming.
static SAVEPOINT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a unique anonymous savepoint name.
pub(crate) fn next_savepoint_name() -> String {
    let n = SAVEPOINT_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("entiorm_sp_{n}")
}

pub(crate) enum TxSlot<T> {
    Active(T),
    Committed,
    RolledBack,
}

impl<T> TxSlot<T> {
    fn state(&self) -> &'static str {
        match self {
            TxSlot::Active(_) => "active",
            TxSlot::Committed => "committed",
            TxSlot::RolledBack => "rolled back",
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        matches!(self, TxSlot::Active(_))
    }
}

impl<T: TxExecutor> TxSlot<T> {
    pub(crate) fn active(&self) -> OrmResult<&T> {
        match self {
            TxSlot::Active(tx) => Ok(tx),
            other => Err(OrmError::transaction(format!(
                "transaction already {}",
                other.state()
            ))),
        }
    }

    pub(crate) async fn commit(&mut self) -> OrmResult<()> {
        match std::mem::replace(self, TxSlot::Committed) {
            TxSlot::Active(tx) => match tx.commit().await {
                Ok(()) => {
                    tracing::debug!(target: "entiorm.tx", "transaction committed");
                    Ok(())
                }
                Err(err) => {
                    *self = TxSlot::RolledBack;
                    tracing::error!(target: "entiorm.tx", error = %err, "commit failed");
                    Err(err)
                }
            },
            finished => {
                let err = OrmError::transaction(format!(
                    "cannot commit: transaction already {}",
                    finished.state()
                ));
                *self = finished;
                Err(err)
            }
        }
    }

    pub(crate) async fn rollback(&mut self) -> OrmResult<()> {
        match std::mem::replace(self, TxSlot::RolledBack) {
            TxSlot::Active(tx) => tx.rollback().await,
            finished => {
                let err = OrmError::transaction(format!(
                    "cannot roll back: transaction already {}",
                    finished.state()
                ));
                *self = finished;
                Err(err)
            }
        }
    }
}

struct Shared<T> {
    slot: Mutex<TxSlot<T>>,
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        if self.slot.get_mut().is_active() {
            // The store's transaction type decides what happens to the open
            // transaction (PgTx issues a background ROLLBACK).
            tracing::warn!(
                target: "entiorm.tx",
                "transaction dropped without commit or rollback"
            );
        }
    }
}

/// Handle to an open transaction.
///
/// Cloning shares the same transaction. Besides passing it to
/// `Builder::set_tx`, the only thing a caller can do with it is commit;
/// rollback is reserved to the write path so failures are never lost.
pub struct Transaction<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Transaction<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for Transaction<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.shared.slot.try_lock() {
            Ok(slot) => slot.state(),
            Err(_) => "in use",
        };
        f.debug_struct("Transaction").field("state", &state).finish()
    }
}

impl<T: TxExecutor> Transaction<T> {
    pub(crate) fn new(tx: T) -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(TxSlot::Active(tx)),
            }),
        }
    }

    /// Commit the transaction.
    ///
    /// Fails with [`OrmError::Transaction`] if it was already committed or rolled back.
    pub async fn commit(&self) -> OrmResult<()> {
        self.lock().await.commit().await
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, TxSlot<T>> {
        self.shared.slot.lock().await
    }
}

/// Per-builder transaction settings.
pub(crate) struct TxState<T> {
    pub(crate) handle: Option<Transaction<T>>,
    pub(crate) savepoint: Option<String>,
    pub(crate) commit: bool,
}

impl<T> Default for TxState<T> {
    fn default() -> Self {
        Self {
            handle: None,
            savepoint: None,
            commit: false,
        }
    }
}

impl<T: TxExecutor> TxState<T> {
    /// Run one write statement.
    ///
    /// Without a transaction the statement goes to the shared store and its
    /// error is returned as is.
    pub(crate) async fn write<S>(&self, session: &Session<S>, stmt: &Fragment) -> OrmResult<u64>
    where
        S: Store<Tx = T>,
    {
        let Some(handle) = &self.handle else {
            return session.execute(session.store(), stmt).await;
        };

        let mut slot = handle.lock().await;
        let outcome = match slot.active() {
            Ok(tx) => self.run_in(session, tx, stmt).await,
            Err(err) => return Err(err),
        };

        match outcome {
            Ok(affected) => {
                if self.commit {
                    slot.commit().await?;
                }
                Ok(affected)
            }
            Err(cause) => Err(self.rollback(&mut slot, cause).await),
        }
    }

    async fn run_in<S>(&self, session: &Session<S>, tx: &T, stmt: &Fragment) -> OrmResult<u64>
    where
        S: Store<Tx = T>,
    {
        if let Some(name) = &self.savepoint {
            tx.savepoint(name).await?;
        }
        let affected = session.execute(tx, stmt).await?;
        if let Some(name) = &self.savepoint {
            tx.release(name).await?;
        }
        Ok(affected)
    }

    /// Undo a failed write, returning `cause` joined with any rollback failure.
    async fn rollback(&self, slot: &mut TxSlot<T>, cause: OrmError) -> OrmError {
        let result = match &self.savepoint {
            Some(name) => match slot.active() {
                Ok(tx) => tx.rollback_to(name).await,
                Err(err) => Err(err),
            },
            None => slot.rollback().await,
        };

        match result {
            Ok(()) => {
                tracing::warn!(
                    target: "entiorm.tx",
                    savepoint = self.savepoint.as_deref(),
                    error = %cause,
                    "write failed, rolled back"
                );
                cause
            }
            Err(rollback_err) => {
                tracing::error!(
                    target: "entiorm.tx",
                    savepoint = self.savepoint.as_deref(),
                    error = %cause,
                    rollback_error = %rollback_err,
                    "write failed and rollback failed"
                );
                cause.join(rollback_err)
            }
        }
    }
}
