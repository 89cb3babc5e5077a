//! Runtime values for the mapping engine

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use crate::path::format_path;
use crate::{Error, Result};

/// A dynamically typed value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absence of a result. Assigning it performs no mutation.
    Nothing,

    /// Explicit null
    Null,

    /// Boolean value
    Bool(bool),

    /// Integer value
    Integer(i64),

    /// Floating point value
    Float(f64),

    /// String value
    String(String),

    /// Raw bytes
    Bytes(Vec<u8>),

    /// Ordered sequence of values
    Array(Vec<Value>),

    /// String-keyed mapping of values
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Create an empty object
    pub fn object() -> Self {
        Value::Object(BTreeMap::new())
    }

    /// Name of the value's type, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nothing => "nothing",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Check if value is the absence marker
    pub fn is_nothing(&self) -> bool {
        matches!(self, Value::Nothing)
    }

    /// Check if value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Boolean content, if this is a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric content as a float, if this is a number
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// String content, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Elements, if this is an array
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Entries, if this is an object
    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a nested value. Array elements are addressed by decimal index.
    pub fn get_path(&self, path: &[String]) -> Option<&Value> {
        let mut current = self;
        for segment in path {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Write a nested value, creating intermediate objects as needed.
    ///
    /// Scalars found along the way are replaced by objects. Array elements
    /// can be overwritten but not appended.
    pub fn set_path(&mut self, path: &[String], value: Value) -> Result<()> {
        let Some((last, parents)) = path.split_last() else {
            *self = value;
            return Ok(());
        };

        let mut current = self;
        for (depth, segment) in parents.iter().enumerate() {
            current = current.entry_mut(segment, &path[..=depth])?;
        }
        *current.entry_mut(last, path)? = value;
        Ok(())
    }

    /// Remove a nested value, returning it if it existed.
    ///
    /// Deleting the root path leaves [`Value::Nothing`] behind.
    pub fn delete_path(&mut self, path: &[String]) -> Option<Value> {
        let Some((last, parents)) = path.split_last() else {
            return Some(std::mem::replace(self, Value::Nothing));
        };

        let mut current = self;
        for segment in parents {
            current = match current {
                Value::Object(map) => map.get_mut(segment)?,
                Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }

        match current {
            Value::Object(map) => map.remove(last),
            Value::Array(items) => {
                let index = last.parse::<usize>().ok()?;
                (index < items.len()).then(|| items.remove(index))
            }
            _ => None,
        }
    }

    fn entry_mut(&mut self, segment: &str, at: &[String]) -> Result<&mut Value> {
        match self {
            Value::Object(map) => Ok(map.entry(segment.to_string()).or_insert(Value::Nothing)),
            Value::Array(items) => {
                let len = items.len();
                segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| items.get_mut(index))
                    .ok_or_else(|| {
                        Error::invalid_path(
                            format_path(at),
                            format!("no element '{segment}' in array of length {len}"),
                        )
                    })
            }
            other => {
                *other = Value::object();
                other.entry_mut(segment, at)
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nothing => f.write_str("<nothing>"),
            Value::String(s) => f.write_str(s),
            Value::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            other => match serde_json::to_string(other) {
                Ok(json) => f.write_str(&json),
                Err(_) => Err(fmt::Error),
            },
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
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

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Object(map)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Nothing | Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serializer.serialize_str(&String::from_utf8_lossy(b)),
            Value::Array(items) => items.serialize(serializer),
            Value::Object(map) => map.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::parse_path;
    use serde_json::json;

    fn order() -> Value {
        Value::from(json!({
            "id": "ORD-1",
            "items": [
                {"sku": "ABC", "qty": 2},
                {"sku": "DEF", "qty": 1.5}
            ]
        }))
    }

    #[test]
    fn test_from_json_numbers() {
        let value = order();
        assert_eq!(
            value.get_path(&parse_path("items.0.qty").unwrap()),
            Some(&Value::Integer(2))
        );
        assert_eq!(
            value.get_path(&parse_path("items.1.qty").unwrap()),
            Some(&Value::Float(1.5))
        );
    }

    #[test]
    fn test_get_missing_path() {
        let value = order();
        assert_eq!(value.get_path(&parse_path("items.7.sku").unwrap()), None);
        assert_eq!(value.get_path(&parse_path("id.nested").unwrap()), None);
        assert_eq!(value.get_path(&[]), Some(&value));
    }

    #[test]
    fn test_set_path_creates_objects() {
        let mut value = Value::Nothing;
        value
            .set_path(&parse_path("a.b.c").unwrap(), Value::Integer(1))
            .unwrap();
        assert_eq!(value, Value::from(json!({"a": {"b": {"c": 1}}})));
    }

    #[test]
    fn test_set_path_replaces_scalars() {
        let mut value = Value::from(json!({"a": "scalar"}));
        value
            .set_path(&parse_path("a.b").unwrap(), Value::Bool(true))
            .unwrap();
        assert_eq!(value, Value::from(json!({"a": {"b": true}})));
    }

    #[test]
    fn test_set_path_array_bounds() {
        let mut value = order();
        value
            .set_path(&parse_path("items.1.sku").unwrap(), Value::from("XYZ"))
            .unwrap();
        assert_eq!(
            value.get_path(&parse_path("items.1.sku").unwrap()),
            Some(&Value::from("XYZ"))
        );

        let err = value
            .set_path(&parse_path("items.5.sku").unwrap(), Value::Null)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPath { ref path, .. } if path == "items.5"));
    }

    #[test]
    fn test_delete_path() {
        let mut value = order();
        assert_eq!(
            value.delete_path(&parse_path("items.0").unwrap()),
            Some(Value::from(json!({"sku": "ABC", "qty": 2})))
        );
        assert_eq!(value.as_object().unwrap()["items"].as_array().unwrap().len(), 1);
        assert_eq!(value.delete_path(&parse_path("missing.key").unwrap()), None);

        let root = value.delete_path(&[]);
        assert!(root.is_some());
        assert!(value.is_nothing());
    }

    #[test]
    fn test_accessors_do_not_coerce() {
        assert_eq!(Value::from("true").as_bool(), None);
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::from("1").as_f64(), None);
        assert_eq!(Value::Integer(3).as_f64(), Some(3.0));
        assert_eq!(Value::Null.type_name(), "null");
        assert_eq!(Value::Nothing.type_name(), "nothing");
    }

    #[test]
    fn test_serialize_round_trip_through_json() {
        let value = order();
        let text = serde_json::to_string(&value).unwrap();
        let back: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::from("plain").to_string(), "plain");
        assert_eq!(Value::Integer(4).to_string(), "4");
        assert_eq!(Value::from(json!({"a": [1, null]})).to_string(), r#"{"a":[1,null]}"#);
        assert_eq!(Value::Nothing.to_string(), "<nothing>");
    }
}
