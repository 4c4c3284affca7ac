//! Bindable values.
//!
//! Every placeholder in a compiled statement carries a [`Value`] together with
//! the [`BindType`] the driver should bind it as.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Bind type tag handed to the driver with each parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindType {
    /// String parameter.
    Str,
    /// Integer parameter.
    Int,
    /// Boolean parameter.
    Bool,
    /// Floating point parameter.
    Float,
}

impl BindType {
    /// Derives the bind type from a declared SQL column type.
    ///
    /// Only the base type name is inspected, so `int(10) unsigned` and
    /// `tinyint(1)` are integers while `point` stays a string.
    #[must_use]
    pub fn from_sql_type(sql_type: &str) -> Self {
        let lower = sql_type.trim().to_ascii_lowercase();
        let base: String = lower
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();

        if lower.starts_with("set") || lower.starts_with("enum") {
            return BindType::Str;
        }

        match base.as_str() {
            "tinyint" | "smallint" | "mediumint" | "int" | "bigint" | "integer" | "int2"
            | "int4" | "int8" | "serial" | "bigserial" | "smallserial" | "bit" => BindType::Int,
            "float" | "double" | "decimal" | "real" | "numeric" => BindType::Float,
            "bool" | "boolean" => BindType::Bool,
            _ => BindType::Str,
        }
    }

    /// Coerces a value before binding it with this type.
    ///
    /// An empty string bound as an integer becomes `0`.
    #[must_use]
    pub fn coerce(self, value: &Value) -> Value {
        match (self, value) {
            (BindType::Int, Value::Str(s)) if s.is_empty() => Value::Int(0),
            _ => value.clone(),
        }
    }

    /// Returns the tag name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            BindType::Str => "STR",
            BindType::Int => "INT",
            BindType::Bool => "BOOL",
            BindType::Float => "FLOAT",
        }
    }
}

impl fmt::Display for BindType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scalar value that can be bound to a statement or read from a row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// SQL NULL.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// String value.
    Str(String),
}

impl Value {
    /// Returns true if the value is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Tries to get as boolean.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    /// Tries to get as integer.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Tries to get as float.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Tries to get as string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the bind type implied by the value itself.
    #[must_use]
    pub fn bind_type(&self) -> BindType {
        match self {
            Value::Null | Value::Str(_) => BindType::Str,
            Value::Bool(_) => BindType::Bool,
            Value::Int(_) => BindType::Int,
            Value::Float(_) => BindType::Float,
        }
    }

    /// Renders the value as a SQL literal, used to reconstruct statements
    /// for logs and error messages.
    #[must_use]
    pub fn to_sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(fl) => write!(f, "{fl}"),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u64> for Value {
    #[allow(clippy::cast_possible_wrap)]
    fn from(v: u64) -> Self {
        Value::Int(v as i64)
    }
}

impl From<usize> for Value {
    #[allow(clippy::cast_possible_wrap)]
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
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
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Str(v.clone())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}
