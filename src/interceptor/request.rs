use std::sync::Arc;

use tracing::debug;

use super::{Decision, Hit, RequestHook, Ticket};
use crate::cache::{CacheKey, CacheManager, Lookup};
use crate::client::ClientError;
use crate::http::Request;

/// Pre-flight half of the cache.
///
/// For each call:
///
/// 1. Runs the optional request hook and adopts the request it returns.
/// 2. Resolves the effective `cache`, `ttl` and storage class.
/// 3. Caching off: purges every stored entry for the URL from both classes,
///    then proceeds uncached.
/// 4. Caching on: derives the key and looks it up. A fresh entry
///    short-circuits; a stale one is evicted and the call proceeds; a miss
///    proceeds.
#[derive(Clone)]
pub struct RequestInterceptor {
    manager: Arc<CacheManager>,
    hook: Option<RequestHook>,
}

impl RequestInterceptor {
    pub fn new(manager: Arc<CacheManager>) -> Self {
        Self {
            manager,
            hook: None,
        }
    }

    #[must_use]
    pub fn with_hook(mut self, hook: RequestHook) -> Self {
        self.hook = Some(hook);
        self
    }

    /// # Errors
    ///
    /// - [`ClientError::Key`]: the cache key cannot be derived from the body.
    /// - Whatever the request hook returns.
    pub async fn intercept(&self, req: Request) -> Result<Decision, ClientError> {
        let req = match &self.hook {
            Some(hook) => hook(req).await?,
            None => req,
        };

        let effective = self.manager.defaults().resolve(req.cache_options());

        if !effective.enabled {
            self.manager.invalidate_url(req.url());
            return Ok(Decision::Proceed {
                request: req,
                ticket: Ticket::uncached(effective.storage),
            });
        }

        let key = CacheKey::for_request(&req)?;
        match self.manager.lookup(&key, &effective) {
            Lookup::Fresh(entry) => {
                debug!(%key, "answering from cache");
                Ok(Decision::ShortCircuit(Hit { key, entry }))
            }
            Lookup::Stale | Lookup::Miss => {
                let ticket = Ticket {
                    key: Some(key),
                    storage: effective.storage,
                    request_params: req.params().map(|p| p.to_value()).unwrap_or_default(),
                    request_body: req.body().map(|b| b.to_value()).unwrap_or_default(),
                };
                Ok(Decision::Proceed { request: req, ticket })
            }
        }
    }
}
