//! Pre- and post-flight cache hooks.
//!
//! A cached call is split in two halves around the transport:
//!
//! 1. [`RequestInterceptor::intercept`] decides, before any I/O, whether the
//!    call may be answered from storage. It returns a [`Decision`]:
//!    [`Decision::ShortCircuit`] carries the stored entry, and
//!    [`Decision::Proceed`] carries the request on to the network together
//!    with a [`Ticket`] describing how to cache the result.
//! 2. [`ResponseInterceptor::resolve`] turns the [`Flight`], either the
//!    short-circuited hit or the completed network call, into the response
//!    the caller sees, writing fresh entries on the way.
//!
//! [`CacheMiddleware`] wires both halves into the middleware chain.

use std::future::Future;
use std::sync::Arc;

use crate::cache::{CacheEntry, CacheKey};
use crate::client::ClientError;
use crate::http::{Request, Response};
use crate::middleware::{Middleware, Next};
use crate::storage::StorageClass;
use crate::transport::BoxFuture;

mod request;
mod response;

pub use request::RequestInterceptor;
pub use response::ResponseInterceptor;

/// Caller-supplied async hook run before the cache decision. The request it
/// returns, including its cache options, replaces the original.
pub type RequestHook =
    Arc<dyn Fn(Request) -> BoxFuture<Result<Request, ClientError>> + Send + Sync + 'static>;

/// Caller-supplied async hook run on every completed response before it is
/// cached or returned.
pub type ResponseHook =
    Arc<dyn Fn(Response) -> BoxFuture<Result<Response, ClientError>> + Send + Sync + 'static>;

/// Wraps an async closure as a [`RequestHook`].
///
/// ```rust,no_run
/// use recache::interceptor::request_hook;
///
/// let hook = request_hook(|mut req| async move {
///     req.headers_mut().set("Authorization", "Bearer token");
///     Ok(req)
/// });
/// ```
pub fn request_hook<F, Fut>(hook: F) -> RequestHook
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Request, ClientError>> + Send + 'static,
{
    Arc::new(move |req: Request| -> BoxFuture<Result<Request, ClientError>> {
        Box::pin(hook(req))
    })
}

/// Wraps an async closure as a [`ResponseHook`].
pub fn response_hook<F, Fut>(hook: F) -> ResponseHook
where
    F: Fn(Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, ClientError>> + Send + 'static,
{
    Arc::new(move |resp: Response| -> BoxFuture<Result<Response, ClientError>> {
        Box::pin(hook(resp))
    })
}

/// How to cache the result of a call that goes to the network.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticket {
    /// `None` when caching is off for this call.
    pub key: Option<CacheKey>,
    pub storage: StorageClass,
    pub request_params: serde_json::Value,
    pub request_body: serde_json::Value,
}

impl Ticket {
    /// A ticket for a call that must not be cached.
    pub fn uncached(storage: StorageClass) -> Self {
        Self {
            key: None,
            storage,
            request_params: serde_json::Value::Null,
            request_body: serde_json::Value::Null,
        }
    }
}

/// A fresh stored entry that answers a call.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub key: CacheKey,
    pub entry: CacheEntry,
}

/// Outcome of the pre-flight check.
#[derive(Debug)]
pub enum Decision {
    /// Send `request` to the network; cache the result per `ticket`.
    Proceed { request: Request, ticket: Ticket },
    /// Answer from storage; the transport is never called.
    ShortCircuit(Hit),
}

/// What happened to a call, as seen by the response half.
#[derive(Debug)]
pub enum Flight {
    ShortCircuited(Hit),
    Completed {
        ticket: Ticket,
        result: Result<Response, ClientError>,
    },
}

/// Middleware layer that answers fresh hits from storage and caches
/// successful network responses.
#[derive(Clone)]
pub struct CacheMiddleware {
    request: RequestInterceptor,
    response: ResponseInterceptor,
}

impl CacheMiddleware {
    pub fn new(request: RequestInterceptor, response: ResponseInterceptor) -> Self {
        Self { request, response }
    }
}

impl Middleware for CacheMiddleware {
    fn handle(&self, req: Request, next: Next) -> BoxFuture<Result<Response, ClientError>> {
        let this = self.clone();
        Box::pin(async move {
            let flight = match this.request.intercept(req).await? {
                Decision::ShortCircuit(hit) => Flight::ShortCircuited(hit),
                Decision::Proceed { request, ticket } => Flight::Completed {
                    ticket,
                    result: next.run(request).await,
                },
            };
            this.response.resolve(flight).await
        })
    }
}
