//! Header containers trace context is read from and written to.

use std::collections::HashMap;

use axum::http::{HeaderMap, HeaderName, HeaderValue};

/// Read/write access to a set of headers.
///
/// Keys are lowercase header names; lookups are case-insensitive.
pub trait Carrier {
    /// Get a header value.
    fn get(&self, key: &str) -> Option<&str>;

    /// Set a header value, replacing any previous value.
    fn set(&mut self, key: &str, value: String);
}

impl Carrier for HeaderMap {
    fn get(&self, key: &str) -> Option<&str> {
        HeaderMap::get(self, key).and_then(|v| v.to_str().ok())
    }

    fn set(&mut self, key: &str, value: String) {
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(&value),
        ) else {
            tracing::debug!(header = %key, "Skipping unrepresentable header");
            return;
        };
        self.insert(name, value);
    }
}

impl Carrier for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<&str> {
        if let Some(v) = HashMap::get(self, key) {
            return Some(v.as_str());
        }
        self.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_ascii_lowercase(), value);
    }
}

/// Get a header and trim it; empty values count as absent.
pub(crate) fn get_trimmed<'a>(carrier: &'a dyn Carrier, key: &str) -> Option<&'a str> {
    carrier
        .get(key)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_map_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("TraceParent", HeaderValue::from_static("x"));
        assert_eq!(Carrier::get(&headers, "traceparent"), Some("x"));
    }

    #[test]
    fn test_hash_map_case_insensitive() {
        let mut map = HashMap::new();
        map.insert("X-B3-TraceId".to_string(), "abc".to_string());
        assert_eq!(Carrier::get(&map, "x-b3-traceid"), Some("abc"));
    }

    #[test]
    fn test_empty_is_absent() {
        let mut map = HashMap::new();
        map.insert("b3".to_string(), "  ".to_string());
        assert_eq!(get_trimmed(&map, "b3"), None);
    }
}
