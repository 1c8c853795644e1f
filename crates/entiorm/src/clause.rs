//! Boolean predicate builder for WHERE / HAVING / JOIN conditions.
//!
//! A [`Clause`] accumulates comparisons and connectives in call order and
//! renders to one SQL fragment with `?` placeholders plus the matching
//! argument list.
//!
//! # Example
//! ```ignore
//! use entiorm::clause::{eq, not};
//!
//! let clause = eq("status", "open").and().gt("amount", 100);
//! assert_eq!(clause.to_sql().0, "status = ? AND amount > ?");
//!
//! let clause = not().like("name", "tmp%");
//! assert_eq!(clause.to_sql().0, "NOT name LIKE ?");
//! ```

use crate::value::Value;
use std::fmt;

/// Comparison operator of one predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Between,
    In,
}

impl Op {
    pub fn as_str(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Gt => ">",
            Op::Gte => ">=",
            Op::Lt => "<",
            Op::Lte => "<=",
            Op::Like => "LIKE",
            Op::Between => "BETWEEN",
            Op::In => "IN",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boolean connective joining a predicate to the one after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    And,
    Or,
}

impl fmt::Display for Connective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connective::And => f.write_str("AND"),
            Connective::Or => f.write_str("OR"),
        }
    }
}

/// One `column op ?` comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub op: Op,
    pub value: Value,
    pub negated: bool,
    /// Connective to the next predicate, if any.
    pub next: Option<Connective>,
}

/// An ordered list of predicates.
///
/// Clauses never hold a connection and render without side effects, so one
/// clause can be rendered (or attached to builders) any number of times.
#[derive(Debug, Clone, Default, PartialEq)]
#[must_use]
pub struct Clause {
    predicates: Vec<Predicate>,
    negate_next: bool,
}

impl Clause {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, column: impl Into<String>, op: Op, value: Value) -> Self {
        let negated = std::mem::take(&mut self.negate_next);
        self.predicates.push(Predicate {
            column: column.into(),
            op,
            value,
            negated,
            next: None,
        });
        self
    }

    /// `column = ?`
    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, Op::Eq, value.into())
    }

    /// `column > ?`
    pub fn gt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, Op::Gt, value.into())
    }

    /// `column >= ?`
    pub fn gte(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, Op::Gte, value.into())
    }

    /// `column < ?`
    pub fn lt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, Op::Lt, value.into())
    }

    /// `column <= ?`
    pub fn lte(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, Op::Lte, value.into())
    }

    /// `column LIKE ?`
    pub fn like(self, column: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.push(column, Op::Like, Value::Text(pattern.into()))
    }

    /// `column BETWEEN ?`, both bounds bound as one list argument.
    pub fn between(
        self,
        column: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.push(column, Op::Between, Value::List(vec![low.into(), high.into()]))
    }

    /// `column IN ?`, the values bound as one list argument.
    pub fn in_list<T: Into<Value>>(
        self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = T>,
    ) -> Self {
        self.push(column, Op::In, Value::list(values))
    }

    /// Negate the next comparison only.
    pub fn not(mut self) -> Self {
        self.negate_next = true;
        self
    }

    /// Join the last predicate to the next one with `AND`.
    ///
    /// # Panics
    /// Panics when the clause has no predicate yet.
    pub fn and(self) -> Self {
        self.connect(Connective::And)
    }

    /// Join the last predicate to the next one with `OR`.
    ///
    /// # Panics
    /// Panics when the clause has no predicate yet.
    pub fn or(self) -> Self {
        self.connect(Connective::Or)
    }

    fn connect(mut self, connective: Connective) -> Self {
        match self.predicates.last_mut() {
            Some(last) => last.next = Some(connective),
            None => panic!("Clause::{connective:?} called before any comparison"),
        }
        self
    }

    /// Render to `(fragment, args)`.
    ///
    /// Placeholders and arguments correspond 1:1 in call order. A connective
    /// after the last predicate is dropped; adjacent predicates without an
    /// explicit connective are joined with `AND`.
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        let mut sql = String::new();
        let mut args = Vec::with_capacity(self.predicates.len());

        for (i, p) in self.predicates.iter().enumerate() {
            if i > 0 {
                let connective = self.predicates[i - 1].next.unwrap_or(Connective::And);
                sql.push(' ');
                sql.push_str(&connective.to_string());
                sql.push(' ');
            }
            if p.negated {
                sql.push_str("NOT ");
            }
            sql.push_str(&p.column);
            sql.push(' ');
            sql.push_str(p.op.as_str());
            sql.push_str(" ?");
            args.push(p.value.clone());
        }

        (sql, args)
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

// ==================== Standalone constructors ====================

pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Clause {
    Clause::new().eq(column, value)
}

pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Clause {
    Clause::new().gt(column, value)
}

pub fn gte(column: impl Into<String>, value: impl Into<Value>) -> Clause {
    Clause::new().gte(column, value)
}

pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Clause {
    Clause::new().lt(column, value)
}

pub fn lte(column: impl Into<String>, value: impl Into<Value>) -> Clause {
    Clause::new().lte(column, value)
}

pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Clause {
    Clause::new().like(column, pattern)
}

pub fn between(
    column: impl Into<String>,
    low: impl Into<Value>,
    high: impl Into<Value>,
) -> Clause {
    Clause::new().between(column, low, high)
}

pub fn in_list<T: Into<Value>>(
    column: impl Into<String>,
    values: impl IntoIterator<Item = T>,
) -> Clause {
    Clause::new().in_list(column, values)
}

/// Start a clause whose first comparison is negated.
pub fn not() -> Clause {
    Clause::new().not()
}
