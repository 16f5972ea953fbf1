//! Cache key derivation.
//!
//! A key has the shape `<url>?cacheParams=<identity>` where the identity is
//! the request body when there is one, otherwise the encoded query params
//! (empty when there are none). The marker doubles as the naming convention
//! the teardown sweep uses to recognise cache-owned keys in durable storage.

use std::borrow::Borrow;
use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::http::{Body, Params, Request};

/// Separates the URL from the request identity inside every cache key.
pub const CACHE_PARAMS_MARKER: &str = "?cacheParams=";

/// Errors raised while deriving a cache key.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("request body for {url} is not valid UTF-8")]
    NonUtf8Body { url: String },

    #[error("request body for {url} cannot be serialized: {source}")]
    Serialize {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Deterministic identifier of a logical request.
///
/// # Examples
///
/// ```
/// use recache::cache::CacheKey;
/// use recache::http::Request;
///
/// let req = Request::post("/search").json(serde_json::json!({ "b": 2, "a": 1 }));
/// let key = CacheKey::for_request(&req).unwrap();
/// assert_eq!(key.as_str(), r#"/search?cacheParams={"a":1,"b":2}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives the key for `url` with an optional body and params.
    ///
    /// The body wins when both are present. An empty text or byte body and a
    /// JSON `null` body count as absent. Text bodies are used verbatim; JSON bodies are serialized
    /// with object keys in sorted order.
    ///
    /// # Errors
    ///
    /// - [`KeyError::NonUtf8Body`]: a raw byte body is not UTF-8.
    /// - [`KeyError::Serialize`]: a JSON body could not be serialized.
    pub fn derive(
        url: &str,
        body: Option<&Body>,
        params: Option<&Params>,
    ) -> Result<Self, KeyError> {
        let identity = match body {
            Some(Body::Text(text)) if !text.is_empty() => text.clone(),
            Some(Body::Json(value)) if !value.is_null() => {
                serde_json::to_string(&canonicalize(value)).map_err(|source| KeyError::Serialize {
                    url: url.to_owned(),
                    source,
                })?
            }
            Some(Body::Bytes(raw)) if !raw.is_empty() => std::str::from_utf8(raw)
                .map_err(|_| KeyError::NonUtf8Body {
                    url: url.to_owned(),
                })?
                .to_owned(),
            _ => params.map(Params::to_string).unwrap_or_default(),
        };
        Ok(Self(format!("{url}{CACHE_PARAMS_MARKER}{identity}")))
    }

    /// Derives the key for a full request.
    pub fn for_request(request: &Request) -> Result<Self, KeyError> {
        Self::derive(request.url(), request.body(), request.params())
    }

    /// Prefix shared by every key derived from `url`.
    pub fn url_prefix(url: &str) -> String {
        format!("{url}{CACHE_PARAMS_MARKER}")
    }

    /// Returns `true` when a raw storage key follows the cache naming convention.
    pub fn is_cache_key(raw: &str) -> bool {
        raw.contains(CACHE_PARAMS_MARKER)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Rebuilds objects with their keys inserted in sorted order, so the output is
// stable even if serde_json's `preserve_order` feature gets unified in.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<_> = map.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for CacheKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
