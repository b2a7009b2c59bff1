//! Case-insensitive, multi-valued header store.
//!
//! Keys are lowercased on the way in, and every key maps to an ordered list of
//! values. A single value is stored as a one-element list, so `get` and
//! `get_all` behave the same whether a header arrived once or many times.

use http::header::{HeaderMap, HeaderName, HeaderValue};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, Vec<String>)>,
}

/// Anything that can be stored under a header key.
pub trait IntoHeaderValues {
    fn into_header_values(self) -> Vec<String>;
}

impl IntoHeaderValues for &str {
    fn into_header_values(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl IntoHeaderValues for String {
    fn into_header_values(self) -> Vec<String> {
        vec![self]
    }
}

impl IntoHeaderValues for &String {
    fn into_header_values(self) -> Vec<String> {
        vec![self.clone()]
    }
}

impl IntoHeaderValues for Vec<String> {
    fn into_header_values(self) -> Vec<String> {
        self
    }
}

impl IntoHeaderValues for Vec<&str> {
    fn into_header_values(self) -> Vec<String> {
        self.into_iter().map(str::to_string).collect()
    }
}

impl<const N: usize> IntoHeaderValues for [&str; N] {
    fn into_header_values(self) -> Vec<String> {
        self.iter().map(|v| v.to_string()).collect()
    }
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(key))
    }

    /// Replaces whatever is stored under `key`.
    pub fn set(&mut self, key: &str, value: impl IntoHeaderValues) -> &mut Self {
        let values = value.into_header_values();
        match self.position(key) {
            Some(idx) => self.entries[idx].1 = values,
            None => self.entries.push((key.to_ascii_lowercase(), values)),
        }
        self
    }

    /// Adds to the values stored under `key`, keeping the existing ones.
    pub fn append(&mut self, key: &str, value: impl IntoHeaderValues) -> &mut Self {
        let values = value.into_header_values();
        match self.position(key) {
            Some(idx) => self.entries[idx].1.extend(values),
            None => self.entries.push((key.to_ascii_lowercase(), values)),
        }
        self
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_all(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn get_all(&self, key: &str) -> Option<&[String]> {
        self.position(key).map(|idx| self.entries[idx].1.as_slice())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.position(key).map(|idx| self.entries.remove(idx).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates `(key, values)` in insertion order. Keys are lowercase.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Layers `self` over `defaults`: keys present here win, everything else is
    /// taken from `defaults`. Neither input is modified.
    pub fn layered_over(&self, defaults: &Headers) -> Headers {
        let mut merged = defaults.clone();
        for (key, values) in self.iter() {
            merged.set(key, values.to_vec());
        }
        merged
    }

    /// Converts into a wire header map, one entry per stored value.
    pub fn to_header_map(&self) -> Result<HeaderMap, http::Error> {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for (key, values) in self.iter() {
            let name = HeaderName::from_bytes(key.as_bytes())?;
            for value in values {
                map.append(name.clone(), HeaderValue::from_str(value)?);
            }
        }
        Ok(map)
    }
}

impl From<&HeaderMap> for Headers {
    fn from(map: &HeaderMap) -> Self {
        let mut headers = Headers::new();
        for (name, value) in map.iter() {
            // Non-visible-ASCII values are kept as lossy text rather than dropped
            let value = match value.to_str() {
                Ok(v) => v.to_string(),
                Err(_) => String::from_utf8_lossy(value.as_bytes()).into_owned(),
            };
            headers.append(name.as_str(), value);
        }
        headers
    }
}

impl<K: AsRef<str>, V: IntoHeaderValues> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (key, value) in iter {
            headers.append(key.as_ref(), value);
        }
        headers
    }
}
