//! Absolute URL composition for gateway calls.
//!
//! Base URLs come from trusted configuration; paths and query parameters come
//! from feature code. Composition never fails: a missing value is simply left
//! out of the query string.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// Query parameters for a gateway call.
///
/// Keys are unique and ordering is irrelevant to the backend, so parameters are
/// kept sorted to make the produced URLs deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: BTreeMap<String, String>,
}

impl QueryParams {
    /// Creates an empty parameter set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a parameter, replacing any previous value for `key`
    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        self.pairs.insert(key.into(), value.to_string());
    }

    /// Adds a parameter
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.insert(key, value);
        self
    }

    /// Adds a parameter only when `value` is present
    #[must_use]
    pub fn with_opt<V: ToString>(mut self, key: impl Into<String>, value: Option<V>) -> Self {
        if let Some(v) = value {
            self.insert(key, v);
        }
        self
    }

    /// Flattens a serializable struct or map into query parameters.
    ///
    /// `null` fields (including `None` options) are omitted, strings are used
    /// verbatim, numbers and booleans are stringified, and nested arrays or
    /// objects are sent as compact JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` fails to serialize or does not serialize to
    /// a JSON object.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        let Value::Object(map) = serde_json::to_value(value)? else {
            return Err(<serde_json::Error as serde::ser::Error>::custom(
                "query parameters must serialize to an object",
            ));
        };

        let mut params = Self::new();
        for (key, value) in map {
            match value {
                Value::Null => {}
                Value::String(s) => params.insert(key, s),
                Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => {
                    params.insert(key, value);
                }
            }
        }
        Ok(params)
    }

    /// Returns the value for `key`, if present
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs.get(key).map(String::as_str)
    }

    /// Returns `true` when no parameters are set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Number of parameters
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Iterates over `(key, value)` pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Percent-encodes the parameters as an `application/x-www-form-urlencoded` string
    #[must_use]
    pub fn encode(&self) -> String {
        let mut ser = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &self.pairs {
            ser.append_pair(k, v);
        }
        ser.finish()
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// Joins `base` and `path` with exactly one `/` and appends the encoded query.
#[must_use]
pub fn build_url(base: &str, path: &str, query: &QueryParams) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    let mut url = format!("{base}/{path}");

    if !query.is_empty() {
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(&query.encode());
    }
    url
}
