//! Deferred query shaping.
//!
//! Builder calls such as `select`, `filter` or `limit` do not touch a
//! connection. Each one records a [`Scope`], a closure over the arguments it
//! was given. At execution the [`ScopeList`] is replayed, in append order,
//! onto a fresh [`Statement`], which then renders the SQL for the terminal
//! operation. Replaying never consumes the list, so the same shaping can run
//! against the shared store or against an attached transaction.

use crate::error::{OrmError, OrmResult};
use crate::row::Record;
use crate::sql::Fragment;
use std::fmt;
use std::sync::Arc;

/// Sort direction for ORDER BY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Order::Asc => f.write_str("ASC"),
            Order::Desc => f.write_str("DESC"),
        }
    }
}

/// Query state that scopes mutate before a statement is rendered.
#[derive(Debug, Clone, Default)]
pub struct Statement {
    table: String,
    select: Vec<String>,
    joins: Vec<Fragment>,
    preloads: Vec<String>,
    wheres: Vec<Fragment>,
    group_by: Vec<String>,
    havings: Vec<Fragment>,
    orders: Vec<(String, Order)>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Statement {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn select<I, S>(&mut self, cols: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select.extend(cols.into_iter().map(Into::into));
        self
    }

    pub fn filter(&mut self, cond: Fragment) -> &mut Self {
        if !cond.is_empty() {
            self.wheres.push(cond);
        }
        self
    }

    pub fn having(&mut self, cond: Fragment) -> &mut Self {
        if !cond.is_empty() {
            self.havings.push(cond);
        }
        self
    }

    pub fn order_by(&mut self, column: impl Into<String>, order: Order) -> &mut Self {
        self.orders.push((column.into(), order));
        self
    }

    pub fn group_by(&mut self, column: impl Into<String>) -> &mut Self {
        self.group_by.push(column.into());
        self
    }

    /// Later calls override earlier ones.
    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    /// Later calls override earlier ones.
    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    /// Add a rendered `... JOIN ... ON ...` fragment.
    pub fn join(&mut self, join: Fragment) -> &mut Self {
        self.joins.push(join);
        self
    }

    pub fn preload(&mut self, relation: impl Into<String>) -> &mut Self {
        self.preloads.push(relation.into());
        self
    }

    pub fn preloads(&self) -> &[String] {
        &self.preloads
    }

    /// Columns requested with `select`, empty for `*`.
    pub fn selected(&self) -> &[String] {
        &self.select
    }

    pub fn has_where(&self) -> bool {
        !self.wheres.is_empty()
    }

    pub fn has_order(&self) -> bool {
        !self.orders.is_empty()
    }

    // ==================== Rendering ====================

    fn push_from(&self, sql: &mut Fragment) {
        sql.push_str(" FROM ").push_str(&self.table);
        for join in &self.joins {
            sql.push_str(" ").push(join);
        }
    }

    fn push_where(&self, sql: &mut Fragment) {
        push_conditions(sql, " WHERE ", &self.wheres);
    }

    fn push_grouping(&self, sql: &mut Fragment) {
        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ").push_str(&self.group_by.join(", "));
        }
        push_conditions(sql, " HAVING ", &self.havings);
    }

    fn select_list(&self) -> String {
        if !self.select.is_empty() {
            self.select.join(", ")
        } else if self.joins.is_empty() {
            "*".to_string()
        } else {
            format!("{}.*", self.table)
        }
    }

    /// `SELECT ... FROM ... [JOIN] [WHERE] [GROUP BY] [HAVING] [ORDER BY] [LIMIT] [OFFSET]`
    pub fn to_select(&self) -> Fragment {
        let mut sql = Fragment::raw(format!("SELECT {}", self.select_list()));
        self.push_from(&mut sql);
        self.push_where(&mut sql);
        self.push_grouping(&mut sql);

        if !self.orders.is_empty() {
            let orders: Vec<String> = self
                .orders
                .iter()
                .map(|(col, order)| format!("{col} {order}"))
                .collect();
            sql.push_str(" ORDER BY ").push_str(&orders.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
        sql
    }

    /// `SELECT COUNT(*)`; grouped statements count their groups.
    pub fn to_count(&self) -> Fragment {
        if self.group_by.is_empty() && self.havings.is_empty() {
            let mut sql = Fragment::raw("SELECT COUNT(*)");
            self.push_from(&mut sql);
            self.push_where(&mut sql);
            return sql;
        }

        let mut sql = Fragment::raw("SELECT COUNT(*) FROM (SELECT 1");
        self.push_from(&mut sql);
        self.push_where(&mut sql);
        self.push_grouping(&mut sql);
        sql.push_str(") AS grouped");
        sql
    }

    /// `UPDATE table SET c = ?, ... WHERE ...`
    pub fn to_update(&self, set: &Record) -> OrmResult<Fragment> {
        if set.is_empty() {
            return Err(OrmError::validation(format!(
                "UPDATE {} has no columns to set",
                self.table
            )));
        }
        let assignments: Vec<String> = set.columns().map(|c| format!("{c} = ?")).collect();
        let mut sql = Fragment::new(
            format!("UPDATE {} SET {}", self.table, assignments.join(", ")),
            set.iter().map(|(_, v)| v.clone()).collect(),
        );
        self.push_where(&mut sql);
        Ok(sql)
    }

    /// `DELETE FROM table WHERE ...`
    pub fn to_delete(&self) -> Fragment {
        let mut sql = Fragment::raw(format!("DELETE FROM {}", self.table));
        self.push_where(&mut sql);
        sql
    }
}

fn push_conditions(sql: &mut Fragment, keyword: &str, conds: &[Fragment]) {
    if conds.is_empty() {
        return;
    }
    sql.push_str(keyword);
    for (i, cond) in conds.iter().enumerate() {
        if i > 0 {
            sql.push_str(" AND ");
        }
        sql.push_str("(").push(cond).push_str(")");
    }
}

/// `INSERT INTO table (cols) VALUES (?, ...), (?, ...)` for one or more records.
///
/// `primary_key` is left out when it is `NULL` in every record. All records
/// must share the same columns in the same order.
pub fn insert(table: &str, primary_key: &str, records: &[Record]) -> OrmResult<Fragment> {
    let Some(first) = records.first() else {
        return Err(OrmError::validation(format!("INSERT INTO {table} without rows")));
    };

    let skip_pk = records
        .iter()
        .all(|r| r.get(primary_key).is_none_or(|v| v.is_null()));
    let columns: Vec<&str> = first
        .columns()
        .filter(|c| !(skip_pk && *c == primary_key))
        .collect();
    if columns.is_empty() {
        return Err(OrmError::validation(format!(
            "INSERT INTO {table} has no columns"
        )));
    }

    let row_placeholders = format!("({})", vec!["?"; columns.len()].join(", "));
    let mut args = Vec::with_capacity(columns.len() * records.len());
    for record in records {
        let record_columns: Vec<&str> = record
            .columns()
            .filter(|c| !(skip_pk && *c == primary_key))
            .collect();
        if record_columns != columns {
            return Err(OrmError::validation(format!(
                "INSERT INTO {table}: rows have different columns"
            )));
        }
        for column in &columns {
            args.push(record.get(column).cloned().unwrap_or_default());
        }
    }

    let sql = format!(
        "INSERT INTO {table} ({}) VALUES {}",
        columns.join(", "),
        vec![row_placeholders; records.len()].join(", ")
    );
    Ok(Fragment::new(sql, args))
}

/// One deferred shaping operation.
pub type Scope = Arc<dyn Fn(&mut Statement) + Send + Sync>;

/// Ordered, append-only list of scopes.
#[derive(Clone, Default)]
pub struct ScopeList {
    scopes: Vec<Scope>,
}

impl ScopeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F>(&mut self, scope: F)
    where
        F: Fn(&mut Statement) + Send + Sync + 'static,
    {
        self.scopes.push(Arc::new(scope));
    }

    /// Apply every scope in append order.
    pub fn apply(&self, stmt: &mut Statement) {
        for scope in &self.scopes {
            scope(stmt);
        }
    }

    /// Replay onto a fresh statement for `table`.
    pub fn build(&self, table: &str) -> Statement {
        let mut stmt = Statement::new(table);
        self.apply(&mut stmt);
        stmt
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

impl fmt::Debug for ScopeList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeList")
            .field("len", &self.scopes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clause::{eq, gt};
    use crate::value::Value;

    #[test]
    fn simple_select() {
        let stmt = Statement::new("users");
        assert_eq!(stmt.to_select().sql, "SELECT * FROM users");
    }

    #[test]
    fn full_select_in_clause_order() {
        let mut stmt = Statement::new("orders");
        stmt.select(["status", "SUM(amount)"])
            .filter(Fragment::from(&eq("region", "eu")))
            .group_by("status")
            .having(Fragment::from(&gt("SUM(amount)", 100)))
            .order_by("status", Order::Desc)
            .limit(10)
            .offset(20);

        let sql = stmt.to_select();
        assert_eq!(
            sql.sql,
            "SELECT status, SUM(amount) FROM orders WHERE (region = ?) GROUP BY status \
             HAVING (SUM(amount) > ?) ORDER BY status DESC LIMIT 10 OFFSET 20"
        );
        assert_eq!(sql.args, vec![Value::from("eu"), Value::Int(100)]);
    }

    #[test]
    fn multiple_filters_are_parenthesised() {
        let mut stmt = Statement::new("t");
        stmt.filter(Fragment::from(&eq("a", 1).or().eq("b", 2)))
            .filter(Fragment::from(&eq("c", 3)));
        assert_eq!(
            stmt.to_select().sql,
            "SELECT * FROM t WHERE (a = ? OR b = ?) AND (c = ?)"
        );
    }

    #[test]
    fn join_args_precede_where_args() {
        let mut stmt = Statement::new("users");
        stmt.filter(Fragment::from(&eq("users.active", true)))
            .join(Fragment::new("INNER JOIN orders ON orders.status = ?", vec!["open".into()]));

        let sql = stmt.to_select();
        assert_eq!(
            sql.sql,
            "SELECT users.* FROM users INNER JOIN orders ON orders.status = ? WHERE (users.active = ?)"
        );
        assert_eq!(sql.args, vec![Value::from("open"), Value::Bool(true)]);
    }

    #[test]
    fn count_ignores_order_and_paging() {
        let mut stmt = Statement::new("t");
        stmt.filter(Fragment::from(&eq("a", 1)))
            .order_by("a", Order::Asc)
            .limit(5);
        assert_eq!(stmt.to_count().sql, "SELECT COUNT(*) FROM t WHERE (a = ?)");
    }

    #[test]
    fn grouped_count_wraps_a_subquery() {
        let mut stmt = Statement::new("t");
        stmt.group_by("kind");
        assert_eq!(
            stmt.to_count().sql,
            "SELECT COUNT(*) FROM (SELECT 1 FROM t GROUP BY kind) AS grouped"
        );
    }

    #[test]
    fn update_and_delete() {
        let mut stmt = Statement::new("t");
        stmt.filter(Fragment::from(&eq("id", 7)));

        let set = Record::new().with("status", "closed");
        let update = stmt.to_update(&set).unwrap();
        assert_eq!(update.sql, "UPDATE t SET status = ? WHERE (id = ?)");
        assert_eq!(update.args, vec![Value::from("closed"), Value::Int(7)]);

        assert_eq!(stmt.to_delete().sql, "DELETE FROM t WHERE (id = ?)");
        assert!(stmt.to_update(&Record::new()).is_err());
    }

    #[test]
    fn batch_insert_is_one_statement() {
        let rows = vec![
            Record::new().with("id", Value::Null).with("name", "a"),
            Record::new().with("id", Value::Null).with("name", "b"),
        ];
        let sql = insert("t", "id", &rows).unwrap();
        assert_eq!(sql.sql, "INSERT INTO t (name) VALUES (?), (?)");
        assert_eq!(sql.args, vec![Value::from("a"), Value::from("b")]);
    }

    #[test]
    fn insert_keeps_explicit_primary_key() {
        let rows = vec![Record::new().with("id", 5).with("name", "a")];
        let sql = insert("t", "id", &rows).unwrap();
        assert_eq!(sql.sql, "INSERT INTO t (id, name) VALUES (?, ?)");
    }

    #[test]
    fn insert_rejects_mismatched_rows() {
        let rows = vec![
            Record::new().with("name", "a"),
            Record::new().with("title", "b"),
        ];
        assert!(insert("t", "id", &rows).is_err());
        assert!(insert("t", "id", &[]).is_err());
    }

    #[test]
    fn scopes_apply_in_append_order_and_replay() {
        let mut scopes = ScopeList::new();
        scopes.push(|s: &mut Statement| {
            s.limit(1);
        });
        scopes.push(|s: &mut Statement| {
            s.limit(2);
        });
        scopes.push(|s: &mut Statement| {
            s.order_by("a", Order::Asc);
        });

        let first = scopes.build("t").to_select();
        let second = scopes.build("t").to_select();
        assert_eq!(first.sql, "SELECT * FROM t ORDER BY a ASC LIMIT 2");
        assert_eq!(first, second);
        assert_eq!(scopes.len(), 3);
    }
}
