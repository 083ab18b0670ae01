//! In-process engine: tables of JSON rows behind a lock. Used when no database is configured and
//! throughout the tests.

use super::{Condition, FetchSpec, PersistenceEngine, Row};
use crate::error::StoreError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

#[derive(Default)]
struct Table {
    rows: Vec<Row>,
    next_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
    fetches: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row as-is, bypassing the ORM. Integer ids advance the table's id counter.
    pub fn seed(&self, table: &str, row: Value) {
        let Value::Object(row) = row else {
            tracing::warn!(table = %table, "ignoring non-object seed row");
            return;
        };
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        let t = tables.entry(table.to_string()).or_default();
        if let Some(id) = row.get("id").and_then(Value::as_i64) {
            t.next_id = t.next_id.max(id);
        }
        t.rows.push(row);
    }

    /// Number of fetch calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        tables.get(table).map(|t| t.rows.clone()).unwrap_or_default()
    }

    fn select(&self, spec: &FetchSpec, limit: Option<usize>) -> Vec<Row> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(table = %spec.table, condition = ?spec.condition, "memory fetch");
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        let Some(table) = tables.get(&spec.table) else {
            return Vec::new();
        };
        let matching = table.rows.iter().filter(|row| match &spec.condition {
            Condition::All => true,
            Condition::Eq { column, value } => row.get(column).map(|v| loose_eq(v, value)).unwrap_or(false),
            Condition::ViaPivot {
                pivot_table,
                pivot_parent_key,
                pivot_related_key,
                related_key,
                parent_value,
            } => {
                let Some(own) = row.get(related_key) else {
                    return false;
                };
                tables
                    .get(pivot_table)
                    .map(|pivot| {
                        pivot.rows.iter().any(|p| {
                            p.get(pivot_parent_key).map(|v| loose_eq(v, parent_value)).unwrap_or(false)
                                && p.get(pivot_related_key).map(|v| loose_eq(v, own)).unwrap_or(false)
                        })
                    })
                    .unwrap_or(false)
            }
        });
        match limit {
            Some(n) => matching.take(n).cloned().collect(),
            None => matching.cloned().collect(),
        }
    }
}

impl PersistenceEngine for MemoryStore {
    fn fetch_one(&self, spec: &FetchSpec) -> Result<Option<Row>, StoreError> {
        Ok(self.select(spec, Some(1)).into_iter().next())
    }

    fn fetch_many(&self, spec: &FetchSpec) -> Result<Vec<Row>, StoreError> {
        Ok(self.select(spec, None))
    }

    fn save(&self, table: &str, key_column: &str, row: &Row) -> Result<Row, StoreError> {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        let t = tables.entry(table.to_string()).or_default();
        let mut row = row.clone();
        let key = row.get(key_column).filter(|v| !v.is_null()).cloned();
        match key {
            Some(key) => {
                if let Some(n) = key.as_i64() {
                    t.next_id = t.next_id.max(n);
                }
                match t
                    .rows
                    .iter_mut()
                    .find(|r| r.get(key_column).map(|v| loose_eq(v, &key)).unwrap_or(false))
                {
                    Some(existing) => {
                        for (k, v) in row {
                            existing.insert(k, v);
                        }
                        Ok(existing.clone())
                    }
                    None => {
                        t.rows.push(row.clone());
                        Ok(row)
                    }
                }
            }
            None => {
                t.next_id += 1;
                row.insert(key_column.to_string(), Value::from(t.next_id));
                t.rows.push(row.clone());
                Ok(row)
            }
        }
    }

    fn delete(&self, table: &str, key_column: &str, key: &Value) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        let Some(t) = tables.get_mut(table) else {
            return Ok(false);
        };
        let before = t.rows.len();
        t.rows
            .retain(|r| !r.get(key_column).map(|v| loose_eq(v, key)).unwrap_or(false));
        Ok(t.rows.len() != before)
    }
}

/// Equality that treats `1`, `1.0` and `"1"` as the same key, as path variables arrive as text.
pub(crate) fn loose_eq(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            s.trim().parse::<f64>().ok() == n.as_f64()
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: Value) -> Row {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn save_assigns_increasing_ids_after_seeds() {
        let store = MemoryStore::new();
        store.seed("users", json!({"id": 7, "name": "ada"}));
        let saved = store.save("users", "id", &row(json!({"name": "bob"}))).unwrap();
        assert_eq!(saved["id"], 8);
        assert_eq!(store.rows("users").len(), 2);
    }

    #[test]
    fn save_with_key_updates_in_place() {
        let store = MemoryStore::new();
        store.seed("users", json!({"id": 1, "name": "ada", "email": "a@x"}));
        let saved = store.save("users", "id", &row(json!({"id": 1, "name": "grace"}))).unwrap();
        assert_eq!(saved, row(json!({"id": 1, "name": "grace", "email": "a@x"})));
        assert_eq!(store.rows("users").len(), 1);
    }

    #[test]
    fn eq_matches_string_keys_against_numbers() {
        let store = MemoryStore::new();
        store.seed("users", json!({"id": 3}));
        let found = store.fetch_one(&FetchSpec::eq("users", "id", json!("3"))).unwrap();
        assert!(found.is_some());
        assert_eq!(store.fetch_count(), 1);
    }

    #[test]
    fn pivot_condition_joins_through_link_rows() {
        let store = MemoryStore::new();
        store.seed("tags", json!({"id": 1, "name": "rust"}));
        store.seed("tags", json!({"id": 2, "name": "php"}));
        store.seed("post_tag", json!({"post_id": 10, "tag_id": 2}));
        let spec = FetchSpec {
            table: "tags".into(),
            condition: Condition::ViaPivot {
                pivot_table: "post_tag".into(),
                pivot_parent_key: "post_id".into(),
                pivot_related_key: "tag_id".into(),
                related_key: "id".into(),
                parent_value: json!(10),
            },
        };
        let rows = store.fetch_many(&spec).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "php");
    }

    #[test]
    fn delete_reports_whether_a_row_was_removed() {
        let store = MemoryStore::new();
        store.seed("users", json!({"id": 1}));
        assert!(store.delete("users", "id", &json!(1)).unwrap());
        assert!(!store.delete("users", "id", &json!(1)).unwrap());
        assert!(!store.delete("ghosts", "id", &json!(1)).unwrap());
    }
}
