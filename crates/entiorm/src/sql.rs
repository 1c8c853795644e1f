//! SQL fragments and placeholder handling.
//!
//! Everything above the store speaks `?` placeholders. Two rewrites happen
//! on the way down:
//! - [`Fragment::expand`] turns list arguments into one placeholder per value.
//! - [`number_placeholders`] turns `?` into PostgreSQL's `$1, $2, ...`.
//!
//! Both skip `?` inside single-quoted literals and double-quoted identifiers.

use crate::clause::Clause;
use crate::error::{OrmError, OrmResult};
use crate::value::Value;

/// SQL text plus its positional arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    pub sql: String,
    pub args: Vec<Value>,
}

impl Fragment {
    pub fn new(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }

    /// A fragment without arguments.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.sql.trim().is_empty()
    }

    /// Append another fragment's text and arguments.
    pub fn push(&mut self, other: &Fragment) -> &mut Self {
        self.sql.push_str(&other.sql);
        self.args.extend(other.args.iter().cloned());
        self
    }

    pub fn push_str(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Expand list arguments into individual placeholders.
    ///
    /// - after `BETWEEN`: a two-value list becomes `? AND ?`
    /// - elsewhere: a list becomes `(?, ?, ...)`, an empty list `(NULL)`
    ///
    /// Errors when placeholder and argument counts differ.
    pub fn expand(&self) -> OrmResult<Fragment> {
        let mut sql = String::with_capacity(self.sql.len() + 8);
        let mut args = Vec::with_capacity(self.args.len());
        let mut pending = self.args.iter();
        let mut used = 0usize;

        for (ch, quoted) in scan(&self.sql) {
            if ch != '?' || quoted {
                sql.push(ch);
                continue;
            }
            let arg = pending.next().ok_or_else(|| self.mismatch())?;
            used += 1;
            match arg {
                Value::List(items) if follows_between(&sql) => {
                    if items.len() != 2 {
                        return Err(OrmError::validation(format!(
                            "BETWEEN expects 2 bounds, got {}",
                            items.len()
                        )));
                    }
                    sql.push_str("? AND ?");
                    args.extend(items.iter().cloned());
                }
                Value::List(items) if items.is_empty() => sql.push_str("(NULL)"),
                Value::List(items) => {
                    sql.push('(');
                    sql.push_str(&vec!["?"; items.len()].join(", "));
                    sql.push(')');
                    args.extend(items.iter().cloned());
                }
                other => {
                    sql.push('?');
                    args.push(other.clone());
                }
            }
        }

        if used != self.args.len() {
            return Err(self.mismatch());
        }
        Ok(Fragment { sql, args })
    }

    fn mismatch(&self) -> OrmError {
        OrmError::validation(format!(
            "placeholder mismatch: '{}' has {} '?', but {} values provided",
            self.sql,
            count_placeholders(&self.sql),
            self.args.len()
        ))
    }
}

impl From<&Clause> for Fragment {
    fn from(clause: &Clause) -> Self {
        let (sql, args) = clause.to_sql();
        Fragment { sql, args }
    }
}

/// Count `?` placeholders outside quotes.
pub fn count_placeholders(sql: &str) -> usize {
    scan(sql).filter(|&(ch, quoted)| ch == '?' && !quoted).count()
}

/// Rewrite `?` placeholders to `$1, $2, ...`.
pub fn number_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut n = 0usize;
    for (ch, quoted) in scan(sql) {
        if ch == '?' && !quoted {
            n += 1;
            out.push('$');
            out.push_str(&n.to_string());
        } else {
            out.push(ch);
        }
    }
    out
}

fn follows_between(sql: &str) -> bool {
    let trimmed = sql.trim_end();
    trimmed
        .len()
        .checked_sub("BETWEEN".len())
        .and_then(|start| trimmed.get(start..))
        .is_some_and(|tail| tail.eq_ignore_ascii_case("BETWEEN"))
}

/// Iterate characters with a flag telling whether each one is inside quotes.
fn scan(sql: &str) -> impl Iterator<Item = (char, bool)> + '_ {
    let mut quote: Option<char> = None;
    sql.chars().map(move |ch| match quote {
        Some(q) if ch == q => {
            quote = None;
            (ch, true)
        }
        Some(_) => (ch, true),
        None if ch == '\'' || ch == '"' => {
            quote = Some(ch);
            (ch, true)
        }
        None => (ch, false),
    })
}
