//! Persistence boundary. The ORM never talks to a database directly; it asks a
//! [`PersistenceEngine`] for rows matching a [`FetchSpec`] and hands rows back to save.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgEngine;

use crate::error::StoreError;
use serde_json::{Map, Value};

/// Column-keyed raw attributes of one stored row.
pub type Row = Map<String, Value>;

#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    All,
    Eq { column: String, value: Value },
    /// Rows of the related table whose `related_key` appears in `pivot_table.pivot_related_key`
    /// for pivot rows with `pivot_table.pivot_parent_key = parent_value`.
    ViaPivot {
        pivot_table: String,
        pivot_parent_key: String,
        pivot_related_key: String,
        related_key: String,
        parent_value: Value,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct FetchSpec {
    pub table: String,
    pub condition: Condition,
}

impl FetchSpec {
    pub fn all(table: impl Into<String>) -> Self {
        FetchSpec {
            table: table.into(),
            condition: Condition::All,
        }
    }

    pub fn eq(table: impl Into<String>, column: impl Into<String>, value: Value) -> Self {
        FetchSpec {
            table: table.into(),
            condition: Condition::Eq {
                column: column.into(),
                value,
            },
        }
    }
}

/// Storage backend used by entities. Calls are blocking from the caller's point of view.
pub trait PersistenceEngine: Send + Sync {
    fn fetch_one(&self, spec: &FetchSpec) -> Result<Option<Row>, StoreError>;

    fn fetch_many(&self, spec: &FetchSpec) -> Result<Vec<Row>, StoreError>;

    /// Insert when `row` has no value for `key_column`, otherwise upsert. Returns the stored row,
    /// including a generated key.
    fn save(&self, table: &str, key_column: &str, row: &Row) -> Result<Row, StoreError>;

    /// Returns whether a row was removed.
    fn delete(&self, table: &str, key_column: &str, key: &Value) -> Result<bool, StoreError>;
}
