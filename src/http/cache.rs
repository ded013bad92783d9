//! Per-route cache of the last good upstream payload.
//!
//! Written by a route's compensation step after every successful call and
//! read by its fallback when the upstream payload signals an error.

use axum::body::Bytes;
use axum::http::HeaderValue;
use dashmap::DashMap;

use crate::resilience::HookError;

/// A fully buffered upstream response body.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamPayload {
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

impl UpstreamPayload {
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self {
            content_type: Some(HeaderValue::from_static("application/json")),
            body: body.into(),
        }
    }

    /// True when the body is a JSON object carrying a top-level `field`.
    pub fn has_top_level_field(&self, field: &str) -> bool {
        match serde_json::from_slice::<serde_json::Value>(&self.body) {
            Ok(serde_json::Value::Object(map)) => map.contains_key(field),
            _ => false,
        }
    }
}

#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: DashMap<String, UpstreamPayload>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `payload` as the route's last good payload.
    ///
    /// Fails without touching the cache when the body exceeds `max_bytes`.
    pub fn store(&self, route: &str, payload: &UpstreamPayload, max_bytes: usize) -> Result<(), HookError> {
        if payload.body.len() > max_bytes {
            return Err(HookError::new(format!(
                "payload of {} bytes exceeds cache limit of {max_bytes} bytes",
                payload.body.len()
            )));
        }
        self.entries.insert(route.to_string(), payload.clone());
        Ok(())
    }

    pub fn get(&self, route: &str) -> Option<UpstreamPayload> {
        self.entries.get(route).map(|entry| entry.value().clone())
    }

    /// Drop the route's entry. Removing a missing entry is not an error.
    pub fn invalidate(&self, route: &str) {
        self.entries.remove(route);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_respects_limit() {
        let cache = ResponseCache::new();
        let small = UpstreamPayload::json(r#"{"ok":true}"#);
        let large = UpstreamPayload::json(vec![b'x'; 100]);

        cache.store("data", &small, 64).unwrap();
        assert!(cache.store("data", &large, 64).is_err());
        assert_eq!(cache.get("data"), Some(small));
    }

    #[test]
    fn test_invalidate_is_idempotent() {
        let cache = ResponseCache::new();
        cache.store("data", &UpstreamPayload::json("{}"), 64).unwrap();

        cache.invalidate("data");
        cache.invalidate("data");
        assert!(cache.is_empty());
    }

    #[test]
    fn test_error_field_detection() {
        assert!(UpstreamPayload::json(r#"{"error":"boom"}"#).has_top_level_field("error"));
        assert!(!UpstreamPayload::json(r#"{"data":{"error":1}}"#).has_top_level_field("error"));
        assert!(!UpstreamPayload::json("[1,2]").has_top_level_field("error"));
        assert!(!UpstreamPayload::json("not json").has_top_level_field("error"));
    }
}
