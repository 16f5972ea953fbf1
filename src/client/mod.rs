//! Caching HTTP client facade.
//!
//! [`CachingClient`] bundles a [`Transport`], the [`CacheManager`] and the
//! middleware chain. Build one per application, share it by reference, and
//! call [`close`](CachingClient::close) once when the host shuts down.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use recache::client::CachingClient;
//! use recache::config::CacheDefaults;
//! use recache::http::{Request, Response};
//! use recache::transport::TransportError;
//!
//! # async fn demo() -> Result<(), recache::client::ClientError> {
//! let client = CachingClient::builder()
//!     .transport(|_req: Request| async {
//!         Ok::<_, TransportError>(Response::ok(serde_json::json!({ "id": 1 })))
//!     })
//!     .defaults(CacheDefaults::new().ttl(Duration::from_secs(60)))
//!     .durable_path("cache.json")
//!     .build()?;
//!
//! let user = client.send(Request::get("/users/1").cache(true)).await?;
//! assert_eq!(user["id"], 1);
//!
//! client.close();
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::cache::{CacheManager, Clock, KeyError, ReconcileReport, SystemClock};
use crate::config::CacheDefaults;
use crate::http::{Request, Response};
use crate::interceptor::{
    CacheMiddleware, RequestHook, RequestInterceptor, ResponseHook, ResponseInterceptor,
};
use crate::middleware::{Middleware, MiddlewareHandler, Next, from_middleware};
use crate::storage::{FileStorage, MemoryStorage, Storage, StorageError, Storages};
use crate::transport::{Transport, TransportError};

/// Errors surfaced to callers of [`CachingClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("a transport is required to build a caching client")]
    MissingTransport,

    #[error("failed to derive cache key: {0}")]
    Key(#[from] KeyError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("{stage} hook failed: {message}")]
    Hook { stage: &'static str, message: String },

    #[error("failed to open cache storage: {0}")]
    Storage(#[from] StorageError),
}

impl ClientError {
    /// Convenience for request/response hooks that need to reject a call.
    pub fn hook(stage: &'static str, message: impl Into<String>) -> Self {
        Self::Hook {
            stage,
            message: message.into(),
        }
    }
}

/// An HTTP client that answers repeat requests from storage.
pub struct CachingClient {
    manager: Arc<CacheManager>,
    chain: Arc<[MiddlewareHandler]>,
    transport: Arc<dyn Transport>,
}

impl CachingClient {
    pub fn builder() -> CachingClientBuilder {
        CachingClientBuilder::default()
    }

    /// Sends `req` through the chain and returns the response payload.
    ///
    /// Cache hits and network responses are indistinguishable here; non-`2xx`
    /// responses are returned as their payload too.
    pub async fn send(&self, req: Request) -> Result<Value, ClientError> {
        self.execute(req).await.map(Response::into_payload)
    }

    /// Like [`send`](Self::send) but keeps the status and headers.
    pub async fn execute(&self, req: Request) -> Result<Response, ClientError> {
        Next::new(Arc::clone(&self.chain), Arc::clone(&self.transport))
            .run(req)
            .await
    }

    pub fn manager(&self) -> &Arc<CacheManager> {
        &self.manager
    }

    /// Teardown: sweeps orphaned durable entries. Only the first call does work.
    pub fn close(&self) -> ReconcileReport {
        self.manager.reconcile()
    }
}

/// Builder for [`CachingClient`].
#[derive(Default)]
pub struct CachingClientBuilder {
    transport: Option<Arc<dyn Transport>>,
    defaults: CacheDefaults,
    session: Option<Arc<dyn Storage>>,
    durable: Option<Arc<dyn Storage>>,
    durable_path: Option<PathBuf>,
    clock: Option<Arc<dyn Clock>>,
    request_hook: Option<RequestHook>,
    response_hook: Option<ResponseHook>,
    layers: Vec<MiddlewareHandler>,
}

impl CachingClientBuilder {
    #[must_use]
    pub fn transport<T: Transport>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    #[must_use]
    pub fn defaults(mut self, defaults: CacheDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    #[must_use]
    pub fn session_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.session = Some(storage);
        self
    }

    #[must_use]
    pub fn durable_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.durable = Some(storage);
        self
    }

    /// Persists the durable class to a JSON file, opened at [`build`](Self::build).
    /// Ignored when [`durable_storage`](Self::durable_storage) is also set.
    #[must_use]
    pub fn durable_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.durable_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn request_hook(mut self, hook: RequestHook) -> Self {
        self.request_hook = Some(hook);
        self
    }

    #[must_use]
    pub fn response_hook(mut self, hook: ResponseHook) -> Self {
        self.response_hook = Some(hook);
        self
    }

    /// Adds a layer outside the cache. Layers run in the order they are added.
    #[must_use]
    pub fn layer<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.layers.push(from_middleware(Arc::new(middleware)));
        self
    }

    /// # Errors
    ///
    /// - [`ClientError::MissingTransport`]: no transport was supplied.
    /// - [`ClientError::Storage`]: the durable file cannot be opened.
    pub fn build(self) -> Result<CachingClient, ClientError> {
        let transport = self.transport.ok_or(ClientError::MissingTransport)?;

        let durable: Arc<dyn Storage> = match (self.durable, self.durable_path) {
            (Some(storage), _) => storage,
            (None, Some(path)) => Arc::new(FileStorage::open(path)?),
            (None, None) => Arc::new(MemoryStorage::new()),
        };
        let session: Arc<dyn Storage> = match self.session {
            Some(storage) => storage,
            None => Arc::new(MemoryStorage::new()),
        };
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };

        let manager = Arc::new(CacheManager::new(
            Storages::new(session, durable),
            self.defaults,
            clock,
        ));

        let mut request = RequestInterceptor::new(Arc::clone(&manager));
        if let Some(hook) = self.request_hook {
            request = request.with_hook(hook);
        }
        let mut response = ResponseInterceptor::new(Arc::clone(&manager));
        if let Some(hook) = self.response_hook {
            response = response.with_hook(hook);
        }

        let mut layers = self.layers;
        layers.push(from_middleware(Arc::new(CacheMiddleware::new(
            request, response,
        ))));
        debug!(layers = layers.len(), defaults = ?self.defaults, "caching client built");

        Ok(CachingClient {
            manager,
            chain: layers.into(),
            transport,
        })
    }
}
