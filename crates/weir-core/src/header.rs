//! Record headers.
//!
//! Headers form an ordered multi-map: the same key may appear more than
//! once, and a header may carry a null value, which is distinct from an
//! empty one.

use crate::serde_utils::option_bytes_serde;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A single record header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub key: String,
    #[serde(with = "option_bytes_serde")]
    value: Option<Bytes>,
}

impl Header {
    pub fn new(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// A header with a null value (not the same as an empty value).
    pub fn null(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    pub fn value(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }
}

/// An ordered collection of record headers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers {
    entries: Vec<Header>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a header, keeping any existing headers with the same key.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<Bytes>) -> &mut Self {
        self.entries.push(Header::new(key, value));
        self
    }

    /// Appends a null-valued header.
    pub fn add_null(&mut self, key: impl Into<String>) -> &mut Self {
        self.entries.push(Header::null(key));
        self
    }

    /// Removes every header with the given key.
    pub fn remove(&mut self, key: &str) {
        self.entries.retain(|h| h.key != key);
    }

    /// The most recently added header with the given key.
    pub fn last(&self, key: &str) -> Option<&Header> {
        self.entries.iter().rev().find(|h| h.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<Header>> for Headers {
    fn from(entries: Vec<Header>) -> Self {
        Self { entries }
    }
}

impl IntoIterator for Headers {
    type Item = Header;
    type IntoIter = std::vec::IntoIter<Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_keys_are_kept_in_order() {
        let mut headers = Headers::new();
        headers.add("trace", b"a".as_slice());
        headers.add("trace", b"b".as_slice());

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.last("trace").unwrap().value(), Some(b"b".as_slice()));
    }

    #[test]
    fn null_value_is_distinct_from_empty() {
        let mut headers = Headers::new();
        headers.add_null("null-header");
        headers.add("empty-header", Bytes::new());

        assert_eq!(headers.last("null-header").unwrap().value(), None);
        assert_eq!(
            headers.last("empty-header").unwrap().value(),
            Some(b"".as_slice())
        );
    }

    #[test]
    fn remove_drops_all_matching_keys() {
        let mut headers = Headers::new();
        headers.add("a", b"1".as_slice());
        headers.add("b", b"2".as_slice());
        headers.add("a", b"3".as_slice());

        headers.remove("a");
        assert_eq!(headers.len(), 1);
        assert!(headers.last("a").is_none());
        assert!(headers.last("b").is_some());
    }
}
