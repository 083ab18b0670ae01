//! Builds parameterized SELECT, INSERT/UPSERT and DELETE statements for entity tables.
//! Identifiers come from model declarations only; values are always parameters.

use crate::store::{Condition, FetchSpec, Row};
use serde_json::Value;

/// Quote identifier for PostgreSQL. A dotted name is treated as `schema.table`.
pub fn quoted(s: &str) -> String {
    s.split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Placeholder for a value. Nulls are inlined so they never carry a parameter type.
    fn placeholder(&mut self, v: &Value) -> String {
        if v.is_null() {
            return "NULL".into();
        }
        self.params.push(v.clone());
        format!("${}", self.params.len())
    }
}

/// SELECT for a fetch spec. Pivot conditions become a semi-join on the link table.
pub fn select(spec: &FetchSpec, limit: Option<u32>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = quoted(&spec.table);
    let filter = match &spec.condition {
        Condition::All => String::new(),
        Condition::Eq { column, value } if value.is_null() => format!(" WHERE {} IS NULL", quoted(column)),
        Condition::Eq { column, value } => {
            let ph = q.placeholder(value);
            format!(" WHERE {} = {}", quoted(column), ph)
        }
        Condition::ViaPivot {
            pivot_table,
            pivot_parent_key,
            pivot_related_key,
            related_key,
            parent_value,
        } => {
            let ph = q.placeholder(parent_value);
            format!(
                " WHERE {} IN (SELECT {} FROM {} WHERE {} = {})",
                quoted(related_key),
                quoted(pivot_related_key),
                quoted(pivot_table),
                quoted(pivot_parent_key),
                ph
            )
        }
    };
    q.sql = format!("SELECT * FROM {}{}", table, filter);
    if let Some(n) = limit {
        q.sql.push_str(&format!(" LIMIT {}", n));
    }
    q
}

/// INSERT ... RETURNING *. With a key value present, conflicts on the key update every other
/// column.
pub fn upsert(table: &str, key_column: &str, row: &Row) -> QueryBuf {
    let mut q = QueryBuf::new();
    let has_key = row.get(key_column).map(|v| !v.is_null()).unwrap_or(false);
    let columns: Vec<&String> = row
        .keys()
        .filter(|c| has_key || c.as_str() != key_column)
        .collect();
    if columns.is_empty() {
        q.sql = format!("INSERT INTO {} DEFAULT VALUES RETURNING *", quoted(table));
        return q;
    }
    let placeholders: Vec<String> = columns.iter().map(|c| q.placeholder(&row[c.as_str()])).collect();
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quoted(table),
        columns.iter().map(|c| quoted(c)).collect::<Vec<_>>().join(", "),
        placeholders.join(", ")
    );
    if has_key {
        let updates: Vec<String> = columns
            .iter()
            .filter(|c| c.as_str() != key_column)
            .map(|c| format!("{} = EXCLUDED.{}", quoted(c), quoted(c)))
            .collect();
        if updates.is_empty() {
            q.sql.push_str(&format!(" ON CONFLICT ({}) DO NOTHING", quoted(key_column)));
        } else {
            q.sql.push_str(&format!(
                " ON CONFLICT ({}) DO UPDATE SET {}",
                quoted(key_column),
                updates.join(", ")
            ));
        }
    }
    q.sql.push_str(" RETURNING *");
    q
}

pub fn delete(table: &str, key_column: &str, key: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.placeholder(key);
    q.sql = format!("DELETE FROM {} WHERE {} = {}", quoted(table), quoted(key_column), ph);
    q
}
