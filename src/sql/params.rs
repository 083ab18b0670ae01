//! Binding of entity attribute values to PostgreSQL parameters.

use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgTypeInfo, Postgres};
use sqlx::Database;

type EncodeResult = Result<IsNull, Box<dyn std::error::Error + Send + Sync>>;

/// One attribute value in the wire type its JSON shape implies. UUID-shaped strings bind as
/// `uuid`; arrays and objects as `jsonb`.
#[derive(Clone, Debug, PartialEq)]
pub enum PgBindValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(uuid::Uuid),
    Jsonb(Value),
}

impl From<&Value> for PgBindValue {
    fn from(v: &Value) -> Self {
        match v {
            Value::Null => PgBindValue::Null,
            Value::Bool(b) => PgBindValue::Bool(*b),
            Value::Number(n) => n
                .as_i64()
                .map(PgBindValue::Int)
                .unwrap_or_else(|| PgBindValue::Float(n.as_f64().unwrap_or(0.0))),
            Value::String(s) => uuid::Uuid::parse_str(s)
                .map(PgBindValue::Uuid)
                .unwrap_or_else(|_| PgBindValue::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => PgBindValue::Jsonb(v.clone()),
        }
    }
}

impl PgBindValue {
    fn type_name(&self) -> &'static str {
        match self {
            PgBindValue::Null | PgBindValue::Text(_) => "TEXT",
            PgBindValue::Bool(_) => "BOOL",
            PgBindValue::Int(_) => "INT8",
            PgBindValue::Float(_) => "FLOAT8",
            PgBindValue::Uuid(_) => "UUID",
            PgBindValue::Jsonb(_) => "JSONB",
        }
    }
}

impl<'q> Encode<'q, Postgres> for PgBindValue {
    fn encode_by_ref(&self, buf: &mut <Postgres as Database>::ArgumentBuffer<'q>) -> EncodeResult {
        match self {
            PgBindValue::Null => Ok(IsNull::Yes),
            PgBindValue::Bool(b) => <bool as Encode<Postgres>>::encode_by_ref(b, buf),
            PgBindValue::Int(n) => <i64 as Encode<Postgres>>::encode_by_ref(n, buf),
            PgBindValue::Float(n) => <f64 as Encode<Postgres>>::encode_by_ref(n, buf),
            PgBindValue::Text(s) => <String as Encode<Postgres>>::encode_by_ref(s, buf),
            PgBindValue::Uuid(u) => <uuid::Uuid as Encode<Postgres>>::encode_by_ref(u, buf),
            PgBindValue::Jsonb(v) => <Value as Encode<Postgres>>::encode_by_ref(v, buf),
        }
    }

    /// Declared per value so integer and boolean keys compare against typed columns.
    fn produces(&self) -> Option<PgTypeInfo> {
        Some(PgTypeInfo::with_name(self.type_name()))
    }
}

impl sqlx::Type<Postgres> for PgBindValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_shapes_pick_wire_types() {
        assert_eq!(PgBindValue::from(&json!(7)), PgBindValue::Int(7));
        assert_eq!(PgBindValue::from(&json!(1.5)), PgBindValue::Float(1.5));
        assert_eq!(PgBindValue::from(&json!("ada")), PgBindValue::Text("ada".into()));
        assert!(matches!(
            PgBindValue::from(&json!("67e55044-10b1-426f-9247-bb680e5fe0c8")),
            PgBindValue::Uuid(_)
        ));
        assert_eq!(PgBindValue::from(&json!({"a": 1})).type_name(), "JSONB");
    }
}
