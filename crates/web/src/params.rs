//! Request parameter resolution.
//!
//! Every request exposes one merged key/value mapping built from three
//! sources, overlaid in a fixed precedence order:
//!
//! 1. Path variables supplied by an external router (lowest precedence)
//! 2. Top-level keys of a JSON object request body
//! 3. Query-string fields and, for url-encoded bodies, form fields
//!    (highest precedence)
//!
//! The query layer wins over the body layer, which wins over path
//! variables. A field occurring once in the query/form layer resolves to a
//! single string; occurring several times it resolves to the ordered list
//! of its values.
//!
//! Values are stored as `serde_json::Value`, so coercion is an exhaustive
//! match over a closed set of shapes rather than a runtime downcast.

use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use wisp_http::protocol::RequestHeader;

/// Errors surfaced when arguments can't be shaped the way a caller asked.
#[derive(Error, Debug)]
pub enum ParamError {
    #[error("can't convert arguments: {source}")]
    Convert {
        #[from]
        source: serde_json::Error,
    },

    #[error("ids must be a string or a list of strings, got {found}")]
    BadIds { found: &'static str },
}

impl ParamError {
    pub fn bad_ids(found: &'static str) -> Self {
        Self::BadIds { found }
    }
}

/// The resolved parameter mapping of one request.
///
/// Keys are unique; a later overlay write for a key replaces the earlier
/// value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    inner: Map<String, Value>,
}

impl Params {
    /// Builds the mapping from the three request sources, in overlay order.
    ///
    /// Body decoding is best-effort: a malformed or non-object body is
    /// skipped and resolution proceeds with the remaining layers.
    pub(crate) fn resolve(header: &RequestHeader, body: &Bytes, path_vars: &HashMap<String, String>) -> Self {
        let mut inner = Map::new();

        // layer 1: router-supplied path variables
        for (key, value) in path_vars {
            inner.insert(key.clone(), Value::String(value.clone()));
        }

        // layer 2: JSON object body, overwriting path variables
        if !body.is_empty() {
            if let Ok(Value::Object(object)) = serde_json::from_slice::<Value>(body) {
                for (key, value) in object {
                    inner.insert(key, value);
                }
            }
        }

        // layer 3: query string plus url-encoded form fields
        let mut pairs: Vec<(String, String)> = Vec::new();
        if let Some(query) = header.uri().query() {
            if let Ok(parsed) = serde_urlencoded::from_str::<Vec<(String, String)>>(query) {
                pairs.extend(parsed);
            }
        }
        if is_form(header) {
            if let Ok(parsed) = serde_urlencoded::from_bytes::<Vec<(String, String)>>(body) {
                pairs.extend(parsed);
            }
        }

        // the first occurrence of a key replaces lower layers; repeats
        // within this layer accumulate into an ordered list
        let mut seen: HashSet<String> = HashSet::new();
        for (key, value) in pairs {
            if seen.contains(&key) {
                // the first occurrence already wrote this key
                match inner.get_mut(&key) {
                    Some(Value::Array(items)) => items.push(Value::String(value)),
                    Some(existing) => {
                        let first = existing.take();
                        *existing = Value::Array(vec![first, Value::String(value)]);
                    }
                    None => {}
                }
            } else {
                seen.insert(key.clone());
                inner.insert(key, Value::String(value));
            }
        }

        Self { inner }
    }

    /// Looks up a single key; an absent key is `None`, not an error.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.inner.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.inner.iter()
    }

    /// Coerces the whole mapping into a caller-supplied typed destination.
    ///
    /// A shape mismatch is reported as an error so callers can rely on the
    /// typed value for downstream validation.
    pub fn convert<T: DeserializeOwned>(&self) -> Result<T, ParamError> {
        Ok(serde_json::from_value(Value::Object(self.inner.clone()))?)
    }

    /// Coerces one entry into a typed destination; an absent key
    /// deserializes from null, so `Option<T>` destinations resolve to
    /// `None`.
    pub fn convert_key<T: DeserializeOwned>(&self, key: &str) -> Result<T, ParamError> {
        let value = self.inner.get(key).cloned().unwrap_or(Value::Null);
        Ok(serde_json::from_value(value)?)
    }
}

fn is_form(header: &RequestHeader) -> bool {
    header
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|content_type| content_type.starts_with(mime::APPLICATION_WWW_FORM_URLENCODED.as_ref()))
}

/// Reads a value as an integer: native integers pass through, floats are
/// truncated toward zero, numeric strings are parsed. Anything else
/// falls back.
pub(crate) fn coerce_int(value: &Value, fallback: i64) -> i64 {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float as i64))
            .unwrap_or(fallback),
        Value::String(text) => text.parse::<i64>().unwrap_or(fallback),
        _ => fallback,
    }
}

/// Reads a value as text: strings pass through, integers are formatted.
/// Anything else yields the empty string.
pub(crate) fn coerce_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) if number.is_i64() || number.is_u64() => number.to_string(),
        _ => String::new(),
    }
}

/// Human-readable shape name for error reporting.
pub(crate) fn shape_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use http::Request;
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    fn header(uri: &str, content_type: Option<&str>) -> RequestHeader {
        let mut builder = Request::builder().method(http::Method::POST).uri(uri);
        if let Some(value) = content_type {
            builder = builder.header(http::header::CONTENT_TYPE, value);
        }
        RequestHeader::from(builder.body(()).unwrap())
    }

    fn path_vars(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn query_wins_over_body_wins_over_path() {
        let header = header("/items?a=query", None);
        let body = Bytes::from(r#"{"a":"body","b":"body"}"#);
        let vars = path_vars(&[("a", "path"), ("c", "path")]);

        let params = Params::resolve(&header, &body, &vars);

        assert_eq!(params.get("a"), Some(&json!("query")));
        assert_eq!(params.get("b"), Some(&json!("body")));
        assert_eq!(params.get("c"), Some(&json!("path")));
    }

    #[test]
    fn repeated_query_field_becomes_ordered_list() {
        let header = header("/items?tag=a&tag=b&tag=c&one=x", None);
        let params = Params::resolve(&header, &Bytes::new(), &HashMap::new());

        assert_eq!(params.get("tag"), Some(&json!(["a", "b", "c"])));
        assert_eq!(params.get("one"), Some(&json!("x")));
    }

    #[test]
    fn single_query_occurrence_replaces_body_value() {
        let header = header("/items?tag=query", None);
        let body = Bytes::from(r#"{"tag":["body1","body2"]}"#);
        let params = Params::resolve(&header, &body, &HashMap::new());

        // the body's list must not leak through as an accumulation target
        assert_eq!(params.get("tag"), Some(&json!("query")));
    }

    #[test]
    fn malformed_body_is_tolerated() {
        let header = header("/items?a=1", None);
        let body = Bytes::from("{not json at all");
        let params = Params::resolve(&header, &body, &HashMap::new());

        assert_eq!(params.get("a"), Some(&json!("1")));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn non_object_body_is_ignored() {
        let header = header("/items", None);
        let body = Bytes::from("[1,2,3]");
        let params = Params::resolve(&header, &body, &HashMap::new());

        assert!(params.is_empty());
    }

    #[test]
    fn form_body_overlays_like_query() {
        let header = header("/items", Some("application/x-www-form-urlencoded"));
        let body = Bytes::from("a=1&b=2&b=3");
        let params = Params::resolve(&header, &body, &HashMap::new());

        assert_eq!(params.get("a"), Some(&json!("1")));
        assert_eq!(params.get("b"), Some(&json!(["2", "3"])));
    }

    #[test]
    fn json_body_keeps_nested_values() {
        let header = header("/items", None);
        let body = Bytes::from(r#"{"filter":{"kind":"active"},"count":2}"#);
        let params = Params::resolve(&header, &body, &HashMap::new());

        assert_eq!(params.get("filter"), Some(&json!({"kind": "active"})));
        assert_eq!(params.get("count"), Some(&json!(2)));
    }

    #[test]
    fn convert_into_typed_destination() {
        #[derive(Deserialize, Debug, PartialEq)]
        struct Filter {
            name: String,
            count: i64,
        }

        let header = header("/items", None);
        let body = Bytes::from(r#"{"name":"abc","count":7}"#);
        let params = Params::resolve(&header, &body, &HashMap::new());

        let filter: Filter = params.convert().unwrap();
        assert_eq!(filter, Filter { name: "abc".to_string(), count: 7 });
    }

    #[test]
    fn convert_reports_shape_mismatch() {
        #[derive(Deserialize, Debug)]
        #[allow(dead_code, reason = "only the conversion failure is under test")]
        struct Filter {
            count: i64,
        }

        let header = header("/items?count=not-a-number", None);
        let params = Params::resolve(&header, &Bytes::new(), &HashMap::new());

        assert!(matches!(params.convert::<Filter>(), Err(ParamError::Convert { .. })));
    }

    #[test]
    fn convert_key_absent_is_none() {
        let header = header("/items", None);
        let params = Params::resolve(&header, &Bytes::new(), &HashMap::new());

        let missing: Option<String> = params.convert_key("nope").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn coerce_int_shapes() {
        assert_eq!(coerce_int(&json!(5), 0), 5);
        assert_eq!(coerce_int(&json!(5.9), 0), 5);
        assert_eq!(coerce_int(&json!(-5.9), 0), -5);
        assert_eq!(coerce_int(&json!("12"), 0), 12);
        assert_eq!(coerce_int(&json!("nope"), 7), 7);
        assert_eq!(coerce_int(&json!(null), 7), 7);
        assert_eq!(coerce_int(&json!([1]), 7), 7);
    }

    #[test]
    fn coerce_string_shapes() {
        assert_eq!(coerce_string(&json!("abc")), "abc");
        assert_eq!(coerce_string(&json!(42)), "42");
        assert_eq!(coerce_string(&json!(1.5)), "");
        assert_eq!(coerce_string(&json!(["a"])), "");
    }
}
