//! Join resolution.
//!
//! Join conditions are written in shorthand with bare column names
//! (`"id = ? AND status = ?"`). The resolver decides which side of each
//! comparison belongs to the joined table and qualifies it:
//! `"Orders.id = ? AND Orders.status = ?"`.
//!
//! The rewrite is lexical. It handles flat conjunctions/disjunctions of
//! `column <op> ?` comparisons (optionally prefixed by `NOT`). Parenthesised
//! groups, function calls and comparisons between two columns are passed
//! through untouched.

use crate::sql::Fragment;

/// Comparison tokens that may sit between a column and its placeholder.
const OPERATORS: &[&str] = &[
    "=", "!=", "<>", ">", ">=", "<", "<=", "LIKE", "ILIKE", "IN", "BETWEEN",
];

/// What a join declaration resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinInstruction {
    /// Load the named relation with a follow-up query, no join condition.
    Preload(String),
    /// Join `table` on an already qualified predicate.
    Inner { table: String, on: Fragment },
}

/// Resolve a join target and optional raw condition.
///
/// Without a condition (or with an empty one) the target becomes a preload.
pub fn resolve(table: &str, condition: Option<Fragment>) -> JoinInstruction {
    match condition {
        Some(cond) if !cond.is_empty() => JoinInstruction::Inner {
            table: table.to_string(),
            on: Fragment::new(qualify(table, &cond.sql), cond.args),
        },
        _ => JoinInstruction::Preload(table.to_string()),
    }
}

/// Qualify the column of every `column <op> ?` comparison with `table.`.
///
/// Tokens that already contain a `.` are left as they are. The number and
/// order of placeholders never change.
pub fn qualify(table: &str, condition: &str) -> String {
    let mut tokens = tokenize(condition);

    for i in 0..tokens.len() {
        if tokens[i] != "?" || i < 2 {
            continue;
        }
        let op = tokens[i - 1].to_ascii_uppercase();
        if !OPERATORS.contains(&op.as_str()) {
            continue;
        }
        let column = &tokens[i - 2];
        // Qualified names, placeholders, groups and function calls stay as written.
        if column.contains('.') || column.contains('(') || column.contains(')') || column == "?" {
            continue;
        }
        let qualified = format!("{table}.{column}");
        tokens[i - 2] = qualified;
    }

    tokens.join(" ")
}

/// Split on whitespace, then split bare `=` out of tokens like `id=?`.
fn tokenize(condition: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in condition.split_whitespace() {
        if OPERATORS.contains(&word) || !word.contains('=') {
            tokens.push(word.to_string());
            continue;
        }
        split_equals(word, &mut tokens);
    }
    tokens
}

/// Split a word on every `=` that is not part of `>=`, `<=` or `!=`.
fn split_equals(word: &str, tokens: &mut Vec<String>) {
    let mut current = String::new();
    let mut prev: Option<char> = None;
    for ch in word.chars() {
        let bare = ch == '=' && !matches!(prev, Some('<' | '>' | '!'));
        if bare {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            tokens.push("=".to_string());
        } else {
            current.push(ch);
        }
        prev = Some(ch);
    }
    if !current.is_empty() {
        tokens.push(current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clause::{eq, gt};
    use crate::value::Value;

    #[test]
    fn qualifies_every_equality() {
        assert_eq!(
            qualify("Orders", "id = ? AND status = ?"),
            "Orders.id = ? AND Orders.status = ?"
        );
    }

    #[test]
    fn preserves_argument_count() {
        let cond = Fragment::from(&eq("id", 1).and().eq("status", "open"));
        match resolve("Orders", Some(cond)) {
            JoinInstruction::Inner { table, on } => {
                assert_eq!(table, "Orders");
                assert_eq!(on.sql, "Orders.id = ? AND Orders.status = ?");
                assert_eq!(on.args, vec![Value::Int(1), Value::from("open")]);
            }
            other => panic!("expected inner join, got {other:?}"),
        }
    }

    #[test]
    fn compact_equalities_are_split() {
        assert_eq!(qualify("T", "id=? OR code =?"), "T.id = ? OR T.code = ?");
    }

    #[test]
    fn already_qualified_columns_are_kept() {
        assert_eq!(
            qualify("Orders", "users.id = ? AND status = ?"),
            "users.id = ? AND Orders.status = ?"
        );
    }

    #[test]
    fn other_operators_and_negation() {
        let cond = Fragment::from(&gt("amount", 5).or().not().eq("status", "void"));
        assert_eq!(
            qualify("Orders", &cond.sql),
            "Orders.amount > ? OR NOT Orders.status = ?"
        );
        assert_eq!(qualify("T", "a >= ? AND b<=?"), "T.a >= ? AND b<=?");
    }

    #[test]
    fn function_calls_are_not_qualified() {
        assert_eq!(
            qualify("Orders", "LOWER(status) = ? AND id = ?"),
            "LOWER(status) = ? AND Orders.id = ?"
        );
        assert_eq!(
            qualify("Orders", "COALESCE(note,'') LIKE ?"),
            "COALESCE(note,'') LIKE ?"
        );
    }

    #[test]
    fn no_condition_is_a_preload() {
        assert_eq!(
            resolve("Orders", None),
            JoinInstruction::Preload("Orders".into())
        );
        assert_eq!(
            resolve("Orders", Some(Fragment::raw(""))),
            JoinInstruction::Preload("Orders".into())
        );
    }
}
