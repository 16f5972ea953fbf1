//! Outbound request description.
//!
//! A [`Request`] is what the caller hands to
//! [`CachingClient::send`](crate::client::CachingClient::send). Besides the
//! usual method, URL, headers and body it carries [`CacheOptions`], the
//! per-request overrides merged with the process-wide
//! [`CacheDefaults`](crate::config::CacheDefaults).

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;

use super::{Headers, Method};
use crate::storage::StorageClass;

/// A request body.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Used verbatim in the cache key.
    Text(String),
    /// Canonicalized (sorted object keys) before it enters the cache key.
    Json(Value),
    /// Raw bytes; must be valid UTF-8 to be cacheable.
    Bytes(Bytes),
}

impl Body {
    /// Returns the body as a JSON value for storage inside a cache entry.
    ///
    /// Raw bytes that are not UTF-8 are recorded as `null`.
    pub fn to_value(&self) -> Value {
        match self {
            Body::Text(s) => Value::String(s.clone()),
            Body::Json(v) => v.clone(),
            Body::Bytes(b) => std::str::from_utf8(b)
                .map(|s| Value::String(s.to_owned()))
                .unwrap_or(Value::Null),
        }
    }
}

/// Query parameters, kept sorted by name so that their encoding is stable.
///
/// # Examples
///
/// ```
/// use recache::http::Params;
///
/// let params: Params = [("page", "2"), ("q", "rust")].into_iter().collect();
/// assert_eq!(params.to_string(), "page=2&q=rust");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    map: BTreeMap<String, String>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.map.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the params as a JSON object for storage inside a cache entry.
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.map
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.map.iter().enumerate() {
            if i > 0 {
                f.write_str("&")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// Per-request cache overrides. `None` falls back to the process-wide default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheOptions {
    pub cache: Option<bool>,
    pub ttl: Option<Duration>,
    pub storage: Option<StorageClass>,
}

/// An outbound HTTP request.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use recache::http::{Method, Request};
/// use recache::storage::StorageClass;
///
/// let request = Request::post("/api/search")
///     .header("Accept", "application/json")
///     .json(serde_json::json!({ "q": "rust" }))
///     .cache(true)
///     .ttl(Duration::from_secs(30))
///     .storage(StorageClass::Durable);
///
/// assert_eq!(request.method(), &Method::Post);
/// assert_eq!(request.cache_options().cache, Some(true));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Request {
    method: Method,
    url: String,
    headers: Headers,
    body: Option<Body>,
    params: Option<Params>,
    cache: CacheOptions,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    /// Appends a request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets a plain-text body.
    #[must_use]
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = Some(Body::Text(body.into()));
        self
    }

    /// Sets a structured JSON body.
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(Body::Json(body));
        self
    }

    /// Sets a raw byte body.
    #[must_use]
    pub fn bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(Body::Bytes(body.into()));
        self
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.get_or_insert_with(Params::new).insert(key, value);
        self
    }

    /// Opts this request in or out of caching.
    #[must_use]
    pub fn cache(mut self, enabled: bool) -> Self {
        self.cache.cache = Some(enabled);
        self
    }

    /// Overrides the freshness window for this request.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.cache.ttl = Some(ttl);
        self
    }

    /// Selects the storage class entries for this request are written to.
    #[must_use]
    pub fn storage(mut self, class: StorageClass) -> Self {
        self.cache.storage = Some(class);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = url.into();
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    pub fn params(&self) -> Option<&Params> {
        self.params.as_ref()
    }

    pub fn cache_options(&self) -> &CacheOptions {
        &self.cache
    }

    /// Mutable access for request hooks that rewrite cache settings.
    pub fn cache_options_mut(&mut self) -> &mut CacheOptions {
        &mut self.cache
    }
}
