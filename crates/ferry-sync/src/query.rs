//! SQL text for the copy: source selects, the target cursor lookup and the
//! per-row insert.

use std::collections::HashMap;

use ferry_connect::Dialect;
use ferry_core::{EngineKind, SqlValue};

pub fn select_all(kind: EngineKind, table: &str) -> String {
    format!("SELECT * FROM {}", kind.quote_table(table))
}

/// Rows whose `cursor` is strictly greater than the first bound parameter,
/// cast to `cursor_type` when one is given.
pub fn select_since(
    kind: EngineKind,
    table: &str,
    cursor: &str,
    cursor_type: Option<&str>,
) -> String {
    format!(
        "SELECT * FROM {} WHERE {} > {}",
        kind.quote_table(table),
        kind.quote_identifier(cursor),
        typed_placeholder(kind, 1, cursor_type)
    )
}

fn typed_placeholder(kind: EngineKind, index: usize, ty: Option<&str>) -> String {
    match ty {
        Some(ty) => format!("CAST({} AS {ty})", kind.placeholder(index)),
        None => kind.placeholder(index),
    }
}

pub fn select_max(kind: EngineKind, table: &str, cursor: &str) -> String {
    format!(
        "SELECT MAX({}) FROM {}",
        kind.quote_identifier(cursor),
        kind.quote_table(table)
    )
}

/// Insert statement for one result set, built once from its column list.
///
/// NULL values are written as a literal `NULL` rather than bound, so
/// placeholders are numbered over the non-null values only. Callers bind
/// exactly those values, in order. Columns with an entry in `column_types`
/// get their placeholder wrapped in a `CAST` to that type.
#[derive(Debug, Clone)]
pub struct InsertPlan {
    kind: EngineKind,
    head: String,
    casts: Vec<Option<String>>,
}

impl InsertPlan {
    pub fn new(
        kind: EngineKind,
        table: &str,
        columns: &[String],
        column_types: &HashMap<String, String>,
    ) -> Self {
        let quoted: Vec<String> = columns.iter().map(|c| kind.quote_identifier(c)).collect();
        Self {
            kind,
            head: format!(
                "INSERT INTO {} ({}) VALUES (",
                kind.quote_table(table),
                quoted.join(", ")
            ),
            casts: columns.iter().map(|c| column_types.get(c).cloned()).collect(),
        }
    }

    /// Statement text for a row of `values`.
    pub fn statement(&self, values: &[SqlValue]) -> String {
        debug_assert_eq!(values.len(), self.casts.len());
        let mut sql = self.head.clone();
        let mut bound = 0;
        for (i, (value, cast)) in values.iter().zip(&self.casts).enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            if value.is_null() {
                sql.push_str("NULL");
            } else {
                bound += 1;
                sql.push_str(&typed_placeholder(self.kind, bound, cast.as_deref()));
            }
        }
        sql.push(')');
        sql
    }
}

/// The values an [`InsertPlan::statement`] expects to be bound.
pub fn bound_values(values: &[SqlValue]) -> impl Iterator<Item = &SqlValue> + Send {
    values.iter().filter(|v| !v.is_null())
}
