//! Row mapping: records and the entity capability.

use crate::error::{OrmError, OrmResult};
use crate::value::{FromValue, Value};

/// One row as an ordered list of `column -> value` pairs.
///
/// Stores hand rows to the facade as records, and entities convert to and
/// from them. Column order is preserved, which keeps rendered INSERT and
/// UPDATE statements deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    columns: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Record::set`].
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Set a column, replacing an existing value in place.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let column = column.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => *slot = value,
            None => self.columns.push((column, value)),
        }
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Decode a column into `T`.
    ///
    /// A missing column is a decode error; a present `NULL` decodes only into `Option<T>`.
    pub fn try_get<T: FromValue>(&self, column: &str) -> OrmResult<T> {
        let value = self
            .get(column)
            .ok_or_else(|| OrmError::decode(column, "column not present in row"))?;
        T::from_value(value).map_err(|e| OrmError::decode(column, e.to_string()))
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        let idx = self.columns.iter().position(|(name, _)| name == column)?;
        Some(self.columns.remove(idx).1)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

impl<C: Into<String>, V: Into<Value>> FromIterator<(C, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (C, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (column, value) in iter {
            record.set(column, value);
        }
        record
    }
}

/// A has-many relation from an entity to a child table.
///
/// Used to link qualified joins and to batch-load preloaded children:
/// `<table>.<foreign_key> = <parent>.<local_key>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    pub table: &'static str,
    pub foreign_key: &'static str,
    pub local_key: &'static str,
}

impl Relation {
    pub const fn has_many(table: &'static str, foreign_key: &'static str) -> Self {
        Self {
            table,
            foreign_key,
            local_key: "id",
        }
    }

    pub const fn local_key(mut self, local_key: &'static str) -> Self {
        self.local_key = local_key;
        self
    }
}

/// A type that maps to one table.
///
/// The table identity is declared, never inferred at runtime.
///
/// # Example
///
/// ```ignore
/// struct Order { id: Option<i64>, status: String, amount: i64 }
///
/// impl Entity for Order {
///     const TABLE: &'static str = "orders";
///     const NAME: &'static str = "Order";
///
///     fn to_record(&self) -> Record {
///         Record::new()
///             .with("id", self.id)
///             .with("status", &self.status)
///             .with("amount", self.amount)
///     }
///
///     fn from_record(r: &Record) -> OrmResult<Self> {
///         Ok(Self { id: r.try_get("id")?, status: r.try_get("status")?, amount: r.try_get("amount")? })
///     }
/// }
/// ```
pub trait Entity: Send + Sync + Sized + 'static {
    /// Table name (the collection name, usually plural).
    const TABLE: &'static str;
    /// Singular type name.
    const NAME: &'static str;
    /// Primary key column. Omitted from INSERT when `NULL`, used as the
    /// fallback filter for UPDATE and DELETE.
    const PRIMARY_KEY: &'static str = "id";

    fn to_record(&self) -> Record;

    fn from_record(record: &Record) -> OrmResult<Self>;

    /// Look up a named relation (e.g. `"Orders"`).
    fn relation(name: &str) -> Option<Relation> {
        let _ = name;
        None
    }

    /// Receive preloaded child rows for `relation`.
    fn attach(&mut self, relation: &str, rows: Vec<Record>) -> OrmResult<()> {
        let _ = rows;
        Err(OrmError::validation(format!(
            "{} does not accept preloaded relation '{relation}'",
            Self::NAME
        )))
    }
}
