//! # SQL Values
//!
//! The scalar values a filter compares against, an entity writes, or a
//! cursor points at.
//!
//! ## Mapping to SQLite Storage Classes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Rust                         Value             SQLite                  │
//! │  ───────────────────────────  ───────────────   ──────────────────      │
//! │  None                         Null              NULL                    │
//! │  bool                         Bool              INTEGER (0/1)           │
//! │  i32 / i64 / u32              Integer           INTEGER                 │
//! │  f64                          Real              REAL                    │
//! │  &str / String / Uuid / JSON  Text              TEXT                    │
//! │  DateTime<Utc>                Timestamp         TEXT (RFC 3339)         │
//! │  Vec<u8>                      Blob              BLOB                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A single SQL scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Blob(Vec<u8>),
}

impl Value {
    /// Returns true for [`Value::Null`].
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Real(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
            Value::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Real(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Text(s.clone())
    }
}

impl From<Uuid> for Value {
    fn from(id: Uuid) -> Self {
        Value::Text(id.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Timestamp(t)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Blob(b)
    }
}

/// JSON documents are stored as TEXT.
impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::Text(json.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_conversions() {
        assert_eq!(Value::from(42_i32), Value::Integer(42));
        assert_eq!(Value::from(7_u32), Value::Integer(7));
        assert_eq!(Value::from("abc"), Value::Text("abc".to_string()));
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(5_i64)), Value::Integer(5));
    }

    #[test]
    fn test_uuid_and_json_become_text() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(
            Value::from(id),
            Value::Text("550e8400-e29b-41d4-a716-446655440000".to_string())
        );

        let json = serde_json::json!({ "tags": ["a", "b"] });
        assert_eq!(
            Value::from(json),
            Value::Text(r#"{"tags":["a","b"]}"#.to_string())
        );
    }

    #[test]
    fn test_display() {
        let t = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(Value::Timestamp(t).to_string(), "2024-01-02T03:04:05+00:00");
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Blob(vec![1, 2, 3]).to_string(), "<3 bytes>");
    }
}
