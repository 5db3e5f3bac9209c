use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RoutingError;

/// A dot-separated path into a JSON payload, e.g. `data.object.amount`.
///
/// Segments that parse as an unsigned integer also index into arrays, so
/// `items.0.sku` addresses the `sku` field of the first element of `items`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath {
    raw: String,
    segments: Vec<String>,
}

impl FieldPath {
    /// Parse a dot-path. Empty paths and empty segments are rejected.
    pub fn parse(raw: &str) -> Result<Self, RoutingError> {
        if raw.is_empty() {
            return Err(RoutingError::InvalidPath {
                path: raw.to_owned(),
                reason: "path must not be empty".into(),
            });
        }
        let segments: Vec<String> = raw.split('.').map(str::to_owned).collect();
        if segments.iter().any(String::is_empty) {
            return Err(RoutingError::InvalidPath {
                path: raw.to_owned(),
                reason: "path segments must not be empty".into(),
            });
        }
        Ok(Self {
            raw: raw.to_owned(),
            segments,
        })
    }

    /// Return the path as originally written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Resolve the path against a payload, returning `None` when any segment
    /// is missing.
    pub fn resolve<'a>(&self, payload: &'a serde_json::Value) -> Option<&'a serde_json::Value> {
        let mut current = payload;
        for segment in &self.segments {
            current = match current {
                serde_json::Value::Object(map) => map.get(segment)?,
                serde_json::Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<String> for FieldPath {
    type Error = RoutingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.raw
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn resolves_nested_objects() {
        let payload = json!({"data": {"object": {"amount": 4200}}});
        let path = FieldPath::parse("data.object.amount").unwrap();
        assert_eq!(path.resolve(&payload), Some(&json!(4200)));
    }

    #[test]
    fn resolves_array_indices() {
        let payload = json!({"items": [{"sku": "a"}, {"sku": "b"}]});
        let path = FieldPath::parse("items.1.sku").unwrap();
        assert_eq!(path.resolve(&payload), Some(&json!("b")));
    }

    #[test]
    fn missing_segment_resolves_to_none() {
        let payload = json!({"data": {}});
        assert!(FieldPath::parse("data.object").unwrap().resolve(&payload).is_none());
        assert!(FieldPath::parse("data.x.y").unwrap().resolve(&payload).is_none());
        assert!(
            FieldPath::parse("items.9")
                .unwrap()
                .resolve(&json!({"items": []}))
                .is_none()
        );
    }

    #[test]
    fn scalar_in_the_middle_resolves_to_none() {
        let payload = json!({"data": 5});
        assert!(FieldPath::parse("data.amount").unwrap().resolve(&payload).is_none());
    }

    #[test]
    fn rejects_empty_paths() {
        assert!(FieldPath::parse("").is_err());
        assert!(FieldPath::parse("data..amount").is_err());
        assert!(FieldPath::parse(".data").is_err());
        assert!(FieldPath::parse("data.").is_err());
    }

    #[test]
    fn deserializes_from_string() {
        let path: FieldPath = serde_json::from_value(json!("a.b")).unwrap();
        assert_eq!(path.as_str(), "a.b");
        assert!(serde_json::from_value::<FieldPath>(json!("a..b")).is_err());
    }
}
