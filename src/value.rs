//! Runtime values exchanged with the database and the value type hierarchy.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A column value, as read from or written to the database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    /// Value rendered HTML-escaped when displayed.
    Html(HtmlEscaped),
}

impl Value {
    /// Concrete type of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Boolean,
            Value::Int(_) => ValueType::Integer,
            Value::Float(_) => ValueType::Float,
            Value::Text(_) => ValueType::Text,
            Value::Bytes(_) => ValueType::Bytes,
            Value::Date(_) => ValueType::Date,
            Value::Timestamp(_) => ValueType::Timestamp,
            Value::Html(_) => ValueType::Html,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(fl) => write!(f, "{}", fl),
            Value::Text(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            Value::Date(d) => write!(f, "{}", d),
            Value::Timestamp(ts) => write!(f, "{}", ts),
            Value::Html(h) => write!(f, "{}", h),
        }
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

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Wrapper whose display form is the HTML-escaped display of the inner value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HtmlEscaped(pub Box<Value>);

impl HtmlEscaped {
    pub fn new(value: Value) -> Self {
        Self(Box::new(value))
    }

    pub fn inner(&self) -> &Value {
        &self.0
    }
}

impl fmt::Display for HtmlEscaped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_null() {
            return Ok(());
        }
        f.write_str(&escape_html(&self.0.to_string()))
    }
}

/// Escape the five HTML special characters.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Value types, organized as a single-inheritance hierarchy rooted at `Any`.
///
/// Type filters registered on an abstract type (`Number`, `Temporal`, `Any`)
/// apply to every concrete type beneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Any,
    Null,
    Boolean,
    Number,
    Integer,
    Float,
    Text,
    Html,
    Bytes,
    Temporal,
    Date,
    Timestamp,
}

impl ValueType {
    /// Direct supertype, `None` for the root.
    pub fn parent(self) -> Option<ValueType> {
        match self {
            ValueType::Any => None,
            ValueType::Integer | ValueType::Float => Some(ValueType::Number),
            ValueType::Html => Some(ValueType::Text),
            ValueType::Date | ValueType::Timestamp => Some(ValueType::Temporal),
            ValueType::Null
            | ValueType::Boolean
            | ValueType::Number
            | ValueType::Text
            | ValueType::Bytes
            | ValueType::Temporal => Some(ValueType::Any),
        }
    }

    /// This type followed by all of its supertypes, most specific first.
    pub fn ancestry(self) -> impl Iterator<Item = ValueType> {
        std::iter::successors(Some(self), |t| t.parent())
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueType::Any => "any",
            ValueType::Null => "null",
            ValueType::Boolean => "boolean",
            ValueType::Number => "number",
            ValueType::Integer => "integer",
            ValueType::Float => "float",
            ValueType::Text => "text",
            ValueType::Html => "html",
            ValueType::Bytes => "bytes",
            ValueType::Temporal => "temporal",
            ValueType::Date => "date",
            ValueType::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" | "object" => Ok(ValueType::Any),
            "null" => Ok(ValueType::Null),
            "boolean" | "bool" => Ok(ValueType::Boolean),
            "number" => Ok(ValueType::Number),
            "integer" | "int" | "long" => Ok(ValueType::Integer),
            "float" | "double" => Ok(ValueType::Float),
            "text" | "string" => Ok(ValueType::Text),
            "html" => Ok(ValueType::Html),
            "bytes" | "binary" => Ok(ValueType::Bytes),
            "temporal" => Ok(ValueType::Temporal),
            "date" => Ok(ValueType::Date),
            "timestamp" | "datetime" => Ok(ValueType::Timestamp),
            other => Err(format!("unknown value type: {}", other)),
        }
    }
}
