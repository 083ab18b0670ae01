//! PostgreSQL engine over a sqlx pool.
//!
//! The ORM is synchronous; each call blocks on the pool from inside a blocking section of the
//! tokio runtime (the dispatcher always runs on `spawn_blocking`).

use super::{FetchSpec, PersistenceEngine, Row};
use crate::error::StoreError;
use crate::sql::{self, PgBindValue, QueryBuf};
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::PgPool;
use tokio::runtime::Handle;

#[derive(Clone)]
pub struct PgEngine {
    pool: PgPool,
    handle: Handle,
}

impl PgEngine {
    /// Must be called from within a tokio runtime.
    pub fn new(pool: PgPool) -> Result<Self, StoreError> {
        let handle = Handle::try_current().map_err(|e| StoreError::Other(e.to_string()))?;
        Ok(PgEngine { pool, handle })
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new().max_connections(10).connect(database_url).await?;
        Self::new(pool)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn fetch_all(&self, q: &QueryBuf) -> Result<Vec<Row>, StoreError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from(p));
        }
        let rows = self.handle.block_on(query.fetch_all(&self.pool))?;
        Ok(rows.iter().map(row_to_map).collect())
    }

    fn execute(&self, q: &QueryBuf) -> Result<u64, StoreError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from(p));
        }
        let done = self.handle.block_on(query.execute(&self.pool))?;
        Ok(done.rows_affected())
    }
}

impl PersistenceEngine for PgEngine {
    fn fetch_one(&self, spec: &FetchSpec) -> Result<Option<Row>, StoreError> {
        Ok(self.fetch_all(&sql::select(spec, Some(1)))?.into_iter().next())
    }

    fn fetch_many(&self, spec: &FetchSpec) -> Result<Vec<Row>, StoreError> {
        self.fetch_all(&sql::select(spec, None))
    }

    fn save(&self, table: &str, key_column: &str, row: &Row) -> Result<Row, StoreError> {
        let q = sql::upsert(table, key_column, row);
        match self.fetch_all(&q)?.into_iter().next() {
            Some(stored) => Ok(stored),
            // ON CONFLICT DO NOTHING returns no row when only the key was written.
            None => Ok(row.clone()),
        }
    }

    fn delete(&self, table: &str, key_column: &str, key: &Value) -> Result<bool, StoreError> {
        Ok(self.execute(&sql::delete(table, key_column, key))? > 0)
    }
}

fn row_to_map(row: &PgRow) -> Row {
    use sqlx::{Column, Row as _};
    let mut map = Row::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    map
}

fn cell_to_value(row: &PgRow, name: &str) -> Value {
    use sqlx::Row as _;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::from(n);
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::from(n);
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::from(n);
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%d %H:%M:%S").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<serde_json::Value>, _>(name) {
        return j;
    }
    Value::Null
}
