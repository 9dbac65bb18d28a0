//! Row value model shared by the whole step.
//!
//! This module contains the core data structures that flow through a run:
//!
//! - [`ValueType`] - Type tag of a field (host type descriptions)
//! - [`Value`] - A single non-null field value
//! - [`ValueMeta`] - Field descriptor (name, type, origin)
//! - [`RowMeta`] - Ordered schema of a row
//! - [`Row`] - Values positionally aligned with a [`RowMeta`]

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Value Type
// =============================================================================

/// Type tag of a field.
///
/// `None` is only meaningful in configuration, where it asks the schema
/// transformer to infer the output type from the candidate fields.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ValueType {
    #[default]
    None,
    Number,
    String,
    Date,
    Boolean,
    Integer,
    Binary,
}

impl ValueType {
    /// All concrete types, in host order.
    pub const CONCRETE: [ValueType; 6] = [
        ValueType::Number,
        ValueType::String,
        ValueType::Date,
        ValueType::Boolean,
        ValueType::Integer,
        ValueType::Binary,
    ];

    /// Host type description, also used as the persisted name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::None => "None",
            ValueType::Number => "Number",
            ValueType::String => "String",
            ValueType::Date => "Date",
            ValueType::Boolean => "Boolean",
            ValueType::Integer => "Integer",
            ValueType::Binary => "Binary",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ValueType::None)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a type name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownValueType(pub String);

impl fmt::Display for UnknownValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown value type '{}'", self.0)
    }
}

impl std::error::Error for UnknownValueType {}

impl FromStr for ValueType {
    type Err = UnknownValueType;

    /// Parse a type description, case-insensitive. An empty string is `None`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" | "-" => Ok(ValueType::None),
            "number" => Ok(ValueType::Number),
            "string" => Ok(ValueType::String),
            "date" => Ok(ValueType::Date),
            "boolean" => Ok(ValueType::Boolean),
            "integer" => Ok(ValueType::Integer),
            "binary" => Ok(ValueType::Binary),
            _ => Err(UnknownValueType(s.to_string())),
        }
    }
}

// =============================================================================
// Value
// =============================================================================

/// A non-null field value. Nulls are represented as `None` in a [`Row`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    String(String),
    Date(NaiveDateTime),
    Boolean(bool),
    Integer(i64),
    Binary(Vec<u8>),
}

impl Value {
    /// The type tag matching this value's representation.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Number(_) => ValueType::Number,
            Value::String(_) => ValueType::String,
            Value::Date(_) => ValueType::Date,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Integer(_) => ValueType::Integer,
            Value::Binary(_) => ValueType::Binary,
        }
    }

    /// Whether the textual representation of this value is empty.
    pub fn is_empty_text(&self) -> bool {
        match self {
            Value::String(s) => s.is_empty(),
            Value::Binary(b) => b.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => f.write_str(s),
            Value::Date(d) => write!(f, "{}", d.format(crate::convert::DATE_FORMAT)),
            Value::Boolean(b) => f.write_str(if *b { "Y" } else { "N" }),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Binary(b) => f.write_str(&String::from_utf8_lossy(b)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

/// Values of one row, aligned with a [`RowMeta`]. `None` is null.
pub type Row = Vec<Option<Value>>;

// =============================================================================
// Field descriptors
// =============================================================================

/// Describes one field of a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueMeta {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    /// Name of the step that produced the field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl ValueMeta {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

impl fmt::Display for ValueMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.value_type)
    }
}

/// Ordered schema of a row.
///
/// Name lookups are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowMeta {
    fields: Vec<ValueMeta>,
}

impl RowMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields(fields: Vec<ValueMeta>) -> Self {
        Self { fields }
    }

    /// Build a schema where every field is a `String`.
    pub fn strings<S: AsRef<str>>(names: &[S]) -> Self {
        Self {
            fields: names
                .iter()
                .map(|n| ValueMeta::new(n.as_ref(), ValueType::String))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[ValueMeta] {
        &self.fields
    }

    pub fn get(&self, index: usize) -> Option<&ValueMeta> {
        self.fields.get(index)
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Position of the field with the given name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        if name.is_empty() {
            return None;
        }
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Descriptor of the field with the given name.
    pub fn search(&self, name: &str) -> Option<&ValueMeta> {
        self.index_of(name).map(|i| &self.fields[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn push(&mut self, meta: ValueMeta) {
        self.fields.push(meta);
    }

    /// Remove the field with the given name, returning it if it existed.
    pub fn remove(&mut self, name: &str) -> Option<ValueMeta> {
        self.index_of(name).map(|i| self.fields.remove(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_parse() {
        assert_eq!("number".parse::<ValueType>().unwrap(), ValueType::Number);
        assert_eq!("String".parse::<ValueType>().unwrap(), ValueType::String);
        assert_eq!("".parse::<ValueType>().unwrap(), ValueType::None);
        assert_eq!(" NONE ".parse::<ValueType>().unwrap(), ValueType::None);
        assert!("bignumber".parse::<ValueType>().is_err());
    }

    #[test]
    fn test_value_type_roundtrips_through_description() {
        for t in ValueType::CONCRETE {
            assert_eq!(t.as_str().parse::<ValueType>().unwrap(), t);
        }
    }

    #[test]
    fn test_empty_text() {
        assert!(Value::from("").is_empty_text());
        assert!(!Value::from(" ").is_empty_text());
        assert!(!Value::Number(0.0).is_empty_text());
        assert!(Value::Binary(vec![]).is_empty_text());
    }

    #[test]
    fn test_row_meta_lookup_is_case_insensitive() {
        let meta = RowMeta::strings(&["Phone", "mobile"]);
        assert_eq!(meta.index_of("phone"), Some(0));
        assert_eq!(meta.index_of("MOBILE"), Some(1));
        assert_eq!(meta.index_of(""), None);
        assert!(meta.search("fax").is_none());
    }

    #[test]
    fn test_row_meta_remove() {
        let mut meta = RowMeta::strings(&["a", "b", "c"]);
        assert!(meta.remove("B").is_some());
        assert_eq!(meta.names(), vec!["a", "c"]);
        assert!(meta.remove("b").is_none());
    }

    #[test]
    fn test_value_json_shape() {
        let row: Row = vec![Some(Value::from("x")), None, Some(Value::Integer(3))];
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json, serde_json::json!(["x", null, 3]));
    }
}
