//! Response header collection.
//!
//! Header names are lower-cased on insertion. Repeated headers keep every
//! value in arrival order, so `set-cookie` lines and other duplicates stay
//! individually retrievable.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Ordered mapping from lower-cased header name to its values.
///
/// ```
/// use fetchcache_core::ResponseHeaders;
///
/// let mut headers = ResponseHeaders::new();
/// headers.append("Set-Cookie", "a=1");
/// headers.append("set-cookie", "b=2");
///
/// assert_eq!(headers.get("SET-COOKIE"), Some("a=1"));
/// assert_eq!(headers.get_nth("set-cookie", 1), Some("b=2"));
/// assert_eq!(headers.get_all("set-cookie").len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseHeaders(IndexMap<String, Vec<String>>);

impl ResponseHeaders {
    /// Creates an empty header collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value, keeping earlier values for the same name.
    pub fn append(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.0
            .entry(name.as_ref().to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// Returns the first value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_nth(name, 0)
    }

    /// Returns the `index`-th value for `name`, counting from zero.
    pub fn get_nth(&self, name: &str, index: usize) -> Option<&str> {
        self.0
            .get(&name.to_ascii_lowercase())
            .and_then(|values| values.get(index))
            .map(String::as_str)
    }

    /// Returns every value for `name`, empty when the header is absent.
    pub fn get_all(&self, name: &str) -> &[String] {
        self.0
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Whether at least one value exists for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&name.to_ascii_lowercase())
    }

    /// Number of distinct header names.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when no headers are present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over `(name, value)` pairs, duplicates included.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().flat_map(|(name, values)| {
            values
                .iter()
                .map(move |value| (name.as_str(), value.as_str()))
        })
    }
}

impl<K, V> FromIterator<(K, V)> for ResponseHeaders
where
    K: AsRef<str>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.append(name, value);
        }
        headers
    }
}
