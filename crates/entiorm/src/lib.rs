//! # entiorm
//!
//! Fluent entity queries with deferred scopes and managed transactions.
//!
//! ## Features
//!
//! - **Clause builder**: typed comparisons with AND/OR/NOT, rendered to one
//!   SQL fragment and a positional argument list
//! - **Deferred shaping**: select/filter/order/limit/group/having/join are
//!   recorded and replayed against whichever connection runs the query
//! - **Managed transactions**: writes inside a transaction roll back on
//!   failure (to a savepoint when one is set) and never lose a rollback error
//! - **Explicit session**: no global handle; a [`Session`] carries the store
//!   and its timeouts, so tests can swap in an in-memory [`Store`]
//!
//! ## Example
//!
//! ```ignore
//! use entiorm::prelude::*;
//!
//! let session = Session::new(PgStore::connect(&database_url)?);
//!
//! // SELECT * FROM invoices WHERE (status = $1 AND amount > $2) ORDER BY amount DESC LIMIT 20
//! let big = session
//!     .sql(Invoice::default())
//!     .filter(eq("status", "open").and().gt("amount", 100))
//!     .order_by("amount", Order::Desc)
//!     .limit(20)
//!     .find()
//!     .await?;
//!
//! // Two inserts, one transaction, committed by the second write.
//! let tx = session.sql(invoice).insert_tx().await?;
//! session.sql(invoice_line).set_tx(tx, true).insert().await?;
//! ```

pub mod builder;
pub mod clause;
pub mod client;
pub mod error;
pub mod join;
pub mod prelude;
pub mod row;
pub mod scope;
pub mod session;
pub mod sql;
pub mod transaction;
pub mod value;

#[cfg(feature = "pool")]
pub mod pool;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::{Builder, TableSql};
pub use clause::{Clause, Connective, Op, Predicate, between, eq, gt, gte, in_list, like, lt, lte, not};
pub use client::{CancelHook, Executor, Store, TxExecutor};
pub use error::{OrmError, OrmResult};
pub use join::JoinInstruction;
pub use row::{Entity, Record, Relation};
pub use scope::{Order, Scope, ScopeList, Statement};
pub use session::{Session, SessionConfig};
pub use sql::Fragment;
pub use transaction::Transaction;
pub use value::{FromValue, Value};

#[cfg(feature = "pool")]
pub use pool::{PgStore, PgTx, create_pool, create_pool_with_config, create_pool_with_manager_config};
