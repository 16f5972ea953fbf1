use std::sync::Arc;

use tracing::debug;

use super::{Flight, ResponseHook};
use crate::cache::{CacheEntry, CacheManager};
use crate::client::ClientError;
use crate::http::Response;

/// Post-flight half of the cache.
///
/// | Flight                              | Result                                 |
/// |-------------------------------------|----------------------------------------|
/// | short-circuited hit                 | `200 OK` carrying the stored payload   |
/// | transport or hook error             | the error, unchanged                   |
/// | non-`2xx` response                  | the response, not cached               |
/// | `2xx` response, caching on          | the response, written to storage       |
/// | `2xx` response, caching off         | the response                           |
#[derive(Clone)]
pub struct ResponseInterceptor {
    manager: Arc<CacheManager>,
    hook: Option<ResponseHook>,
}

impl ResponseInterceptor {
    pub fn new(manager: Arc<CacheManager>) -> Self {
        Self {
            manager,
            hook: None,
        }
    }

    #[must_use]
    pub fn with_hook(mut self, hook: ResponseHook) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Turns a finished [`Flight`] into the response handed to the caller.
    ///
    /// A short-circuited hit becomes `200 OK` with the stored payload. A
    /// completed call passes through the response hook; a `2xx` result is
    /// then written under the ticket's key when the ticket carries one.
    /// Write failures are logged, not returned.
    ///
    /// # Errors
    ///
    /// - The transport error carried by the flight, unchanged.
    /// - Whatever the response hook returns.
    pub async fn resolve(&self, flight: Flight) -> Result<Response, ClientError> {
        let (ticket, result) = match flight {
            Flight::ShortCircuited(hit) => {
                debug!(key = %hit.key, "resolved from cache");
                return Ok(Response::ok(hit.entry.payload));
            }
            Flight::Completed { ticket, result } => (ticket, result),
        };

        let response = match &self.hook {
            Some(hook) => hook(result?).await?,
            None => result?,
        };

        if !response.status().is_success() {
            return Ok(response);
        }

        if let Some(key) = ticket.key {
            let entry = CacheEntry::new(
                self.manager.now_ms(),
                ticket.request_params,
                ticket.request_body,
                response.payload_ref().clone(),
            );
            self.manager.record(key, ticket.storage, &entry);
        }

        Ok(response)
    }
}
