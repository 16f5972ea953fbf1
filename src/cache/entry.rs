//! The stored cache envelope.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A cached response together with the time it was written.
///
/// Serialized as camelCase JSON:
///
/// ```json
/// {"writtenAt":1700000000000,"requestParams":{},"requestBody":null,"payload":{"a":1}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Wall-clock milliseconds since the Unix epoch at write time.
    pub written_at: u64,
    #[serde(default)]
    pub request_params: Value,
    #[serde(default)]
    pub request_body: Value,
    pub payload: Value,
}

impl CacheEntry {
    pub fn new(written_at: u64, request_params: Value, request_body: Value, payload: Value) -> Self {
        Self {
            written_at,
            request_params,
            request_body,
            payload,
        }
    }

    /// Milliseconds elapsed since the entry was written. Entries stamped in
    /// the future report an age of zero.
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.written_at)
    }

    /// Fresh while `now - writtenAt < ttl`.
    pub fn is_fresh(&self, now_ms: u64, ttl: Duration) -> bool {
        u128::from(self.age_ms(now_ms)) < ttl.as_millis()
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TTL: Duration = Duration::from_millis(100_000);

    #[test]
    fn freshness_boundary() {
        let entry = CacheEntry::new(1_000, Value::Null, Value::Null, json!(1));
        assert!(entry.is_fresh(1_000, TTL));
        assert!(entry.is_fresh(1_000 + 99_999, TTL));
        assert!(!entry.is_fresh(1_000 + 100_000, TTL));
        assert!(!entry.is_fresh(1_000 + 100_001, TTL));
    }

    #[test]
    fn future_timestamp_counts_as_fresh() {
        let entry = CacheEntry::new(5_000, Value::Null, Value::Null, json!(1));
        assert_eq!(entry.age_ms(1_000), 0);
        assert!(entry.is_fresh(1_000, TTL));
    }

    #[test]
    fn zero_ttl_is_never_fresh() {
        let entry = CacheEntry::new(1_000, Value::Null, Value::Null, json!(1));
        assert!(!entry.is_fresh(1_000, Duration::ZERO));
    }

    #[test]
    fn wire_format_is_camel_case() {
        let entry = CacheEntry::new(42, json!({"p": "1"}), Value::Null, json!({"a": 1}));
        let raw = entry.encode().unwrap();
        assert!(raw.contains("\"writtenAt\":42"));
        assert!(raw.contains("\"requestParams\""));
        assert_eq!(CacheEntry::decode(&raw).unwrap(), entry);
    }

    #[test]
    fn missing_request_fields_default_to_null() {
        let entry = CacheEntry::decode(r#"{"writtenAt":1,"payload":[1,2]}"#).unwrap();
        assert_eq!(entry.request_params, Value::Null);
        assert_eq!(entry.payload, json!([1, 2]));
    }
}
