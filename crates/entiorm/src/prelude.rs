//! Convenient imports for typical `entiorm` usage.
//!
//! ```ignore
//! use entiorm::prelude::*;
//! ```

pub use crate::{
    Builder, Clause, Entity, FromValue, Order, OrmError, OrmResult, Record, Relation, Session,
    SessionConfig, Store, Transaction, Value,
};
pub use crate::{between, eq, gt, gte, in_list, like, lt, lte, not};

#[cfg(feature = "pool")]
pub use crate::{PgStore, create_pool};
