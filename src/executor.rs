//! Executor Boundary
//!
//! The interface consumed from the database driver layer, plus the value and
//! row-set types that cross it.

use std::collections::BTreeSet;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::statement;

// == Value ==
/// A bound parameter or a cell of a returned row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// Canonical, type-tagged text form used for fingerprinting.
    ///
    /// Equal values always give equal output, however they were built:
    /// `-0.0` and `0.0` coincide and every NaN renders the same.
    pub fn canonical(&self) -> String {
        match self {
            Value::Null => "n".to_string(),
            Value::Bool(b) => format!("b:{}", u8::from(*b)),
            Value::Int(i) => format!("i:{}", i),
            Value::Float(f) => {
                if f.is_nan() {
                    "f:NaN".to_string()
                } else if *f == 0.0 {
                    "f:0".to_string()
                } else {
                    format!("f:{:?}", f)
                }
            }
            Value::Text(s) => format!("s:{}:{}", s.len(), s),
            Value::Bytes(bytes) => {
                let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
                format!("x:{}", hex)
            }
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

// == Row Set ==
/// A decoded result set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// A single-cell result, as returned by `COUNT(*)` and friends.
    pub fn scalar(column: impl Into<String>, value: Value) -> Self {
        Self {
            columns: vec![column.into()],
            rows: vec![vec![value]],
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// == Exec Outcome ==
/// What a statement produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecOutcome {
    Rows(RowSet),
    Affected(u64),
}

// == Executor ==
/// Runs parameterized SQL against a database.
///
/// Implemented by the driver layer. Failures are reported as opaque
/// [`anyhow::Error`] values and reach callers unchanged.
pub trait Executor: Send + Sync {
    /// Executes a statement with its bound parameters.
    fn execute(
        &self,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = anyhow::Result<ExecOutcome>> + Send;

    /// Tables a statement touches. Best-effort; may over-approximate.
    fn tables_referenced_by(&self, sql: &str) -> BTreeSet<String> {
        statement::referenced_tables(sql)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_is_type_tagged() {
        assert_ne!(Value::Int(1).canonical(), Value::Text("1".into()).canonical());
        assert_ne!(Value::Bool(true).canonical(), Value::Int(1).canonical());
        assert_ne!(Value::Null.canonical(), Value::Text("n".into()).canonical());
    }

    #[test]
    fn test_canonical_float_zero_and_nan() {
        assert_eq!(Value::Float(0.0).canonical(), Value::Float(-0.0).canonical());
        assert_eq!(
            Value::Float(f64::NAN).canonical(),
            Value::Float(-f64::NAN).canonical()
        );
        assert_ne!(Value::Float(1.5).canonical(), Value::Float(1.25).canonical());
    }

    #[test]
    fn test_canonical_equal_regardless_of_construction() {
        let a = Value::from("alice");
        let b = Value::Text(String::from("ali") + "ce");
        assert_eq!(a.canonical(), b.canonical());
        assert_eq!(Value::from(7i32).canonical(), Value::from(7i64).canonical());
    }

    #[test]
    fn test_option_into_value() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
    }

    #[test]
    fn test_value_serialize() {
        let json = serde_json::to_string(&Value::Int(3)).unwrap();
        assert_eq!(json, r#"{"type":"int","value":3}"#);
    }

    #[test]
    fn test_row_set_scalar() {
        let rows = RowSet::scalar("count", Value::Int(4));
        assert_eq!(rows.len(), 1);
        assert!(!rows.is_empty());
        assert_eq!(rows.columns, vec!["count".to_string()]);
    }
}
