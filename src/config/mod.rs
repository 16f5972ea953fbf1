//! Process-wide cache defaults and per-request resolution.
//!
//! Every request carries optional [`CacheOptions`]; whatever it leaves unset
//! falls back to the [`CacheDefaults`] the client was built with.
//!
//! | Setting   | Default     |
//! |-----------|-------------|
//! | `cache`   | `false`     |
//! | `ttlMs`   | `100000`    |
//! | `storage` | `"session"` |

use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::http::CacheOptions;
use crate::storage::StorageClass;

/// Freshness window applied when neither the request nor the defaults set one.
pub const DEFAULT_TTL: Duration = Duration::from_millis(100_000);

/// Defaults applied to requests that do not override them.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use recache::config::CacheDefaults;
/// use recache::storage::StorageClass;
///
/// let defaults = CacheDefaults::from_json(r#"{ "cache": true, "ttlMs": 5000 }"#).unwrap();
/// assert!(defaults.cache);
/// assert_eq!(defaults.ttl, Duration::from_secs(5));
/// assert_eq!(defaults.storage, StorageClass::Session);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheDefaults {
    pub cache: bool,
    #[serde(rename = "ttlMs", deserialize_with = "duration_from_ms")]
    pub ttl: Duration,
    pub storage: StorageClass,
}

impl Default for CacheDefaults {
    fn default() -> Self {
        Self {
            cache: false,
            ttl: DEFAULT_TTL,
            storage: StorageClass::Session,
        }
    }
}

impl CacheDefaults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses defaults from a JSON document. Missing fields keep their defaults.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    #[must_use]
    pub fn cache(mut self, enabled: bool) -> Self {
        self.cache = enabled;
        self
    }

    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub fn storage(mut self, class: StorageClass) -> Self {
        self.storage = class;
        self
    }

    /// Merges per-request overrides over these defaults.
    pub fn resolve(&self, options: &CacheOptions) -> EffectiveCache {
        EffectiveCache {
            enabled: options.cache.unwrap_or(self.cache),
            ttl: options.ttl.unwrap_or(self.ttl),
            storage: options.storage.unwrap_or(self.storage),
        }
    }
}

/// The cache settings actually in force for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveCache {
    pub enabled: bool,
    pub ttl: Duration,
    pub storage: StorageClass,
}

fn duration_from_ms<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}
