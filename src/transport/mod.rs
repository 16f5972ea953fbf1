//! The seam to the HTTP client that actually performs I/O.
//!
//! The cache never opens sockets. It wraps a [`Transport`] and only decides
//! whether a call reaches it. Any `Fn(Request) -> impl Future` closure is a
//! transport, which is how tests and thin adapters plug in:
//!
//! ```rust,no_run
//! use recache::http::{Request, Response};
//! use recache::transport::{Transport, TransportError};
//!
//! let transport = |req: Request| async move {
//!     Ok::<_, TransportError>(Response::ok(serde_json::json!({ "url": req.url() })))
//! };
//! # fn assert_transport<T: Transport>(_: &T) {}
//! # assert_transport(&transport);
//! ```

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::http::{Request, Response};

/// Boxed, `Send` future used at every async seam in the crate.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Failures reported by a transport. The cache passes these through as-is.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} failed: {message}")]
    Failed { url: String, message: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl TransportError {
    pub fn failed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            url: url.into(),
            message: message.into(),
        }
    }
}

/// Sends a request over the network and yields the decoded response.
///
/// Non-`2xx` statuses are responses, not errors: implementations should
/// return them as `Ok` and leave interpretation to the caller.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, request: Request) -> BoxFuture<Result<Response, TransportError>>;
}

impl<T, F> Transport for T
where
    T: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Result<Response, TransportError>> + Send + 'static,
{
    fn send(&self, request: Request) -> BoxFuture<Result<Response, TransportError>> {
        Box::pin((self)(request))
    }
}
