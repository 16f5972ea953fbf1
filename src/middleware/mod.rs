//! Middleware pipeline around the transport.
//!
//! Every call travels through an ordered stack of layers before reaching the
//! [`Transport`]. Each layer wraps the next one, so it can inspect or rewrite
//! the request, short-circuit with a response of its own, or decorate what
//! comes back.
//!
//! ## Core types
//!
//! - [`Middleware`]: trait implemented by all layers.
//! - [`Next`]: cursor into the remaining chain; call [`Next::run`] to
//!   advance. When the layers are exhausted it invokes the transport.
//! - [`MiddlewareHandler`]: type-erased, cheaply-cloneable layer function.
//! - [`from_middleware`]: converts a [`Middleware`] into a [`MiddlewareHandler`].
//! - [`LoggerMiddleware`]: built-in per-call logger.
//!
//! The cache itself is a layer:
//! [`CacheMiddleware`](crate::interceptor::CacheMiddleware) returns stored
//! responses without calling `next`.

use std::sync::Arc;

use tokio::time::Instant;

use crate::client::ClientError;
use crate::http::{Request, Response};
use crate::transport::{BoxFuture, Transport};

/// A cursor into the remaining middleware chain for a single call.
///
/// `Next` is consumed by [`run`](Self::run), so a layer can forward a
/// request at most once.
///
/// # Examples
///
/// ```rust,no_run
/// use recache::client::ClientError;
/// use recache::http::{Request, Response};
/// use recache::middleware::{Middleware, Next};
/// use recache::transport::BoxFuture;
///
/// struct PassThrough;
///
/// impl Middleware for PassThrough {
///     fn handle(&self, req: Request, next: Next) -> BoxFuture<Result<Response, ClientError>> {
///         Box::pin(async move { next.run(req).await })
///     }
/// }
/// ```
pub struct Next {
    middlewares: Arc<[MiddlewareHandler]>,
    transport: Arc<dyn Transport>,
    // Tracks which layer to invoke on the next `run` call.
    index: usize,
}

/// A type-erased, reference-counted middleware function.
pub type MiddlewareHandler =
    Arc<dyn Fn(Request, Next) -> BoxFuture<Result<Response, ClientError>> + Send + Sync + 'static>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use recache::middleware::{LoggerMiddleware, from_middleware};
///
/// let handler = from_middleware(Arc::new(LoggerMiddleware));
/// ```
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |req: Request, next: Next| middleware.handle(req, next))
}

impl Next {
    /// Creates a cursor positioned at the first layer of `middlewares`,
    /// terminating in `transport`.
    pub fn new(middlewares: Arc<[MiddlewareHandler]>, transport: Arc<dyn Transport>) -> Self {
        Self {
            middlewares,
            transport,
            index: 0,
        }
    }

    /// Invokes the next layer, or the transport once the layers run out.
    ///
    /// Transport failures are wrapped in [`ClientError::Transport`] unchanged.
    pub async fn run(mut self, req: Request) -> Result<Response, ClientError> {
        if let Some(handler) = self.middlewares.get(self.index).cloned() {
            self.index += 1;
            handler(req, self).await
        } else {
            Ok(self.transport.send(req).await?)
        }
    }
}

/// The core trait for all middleware.
///
/// Implementors may:
///
/// - **Pass through**: call `next.run(req).await` without modification.
/// - **Short-circuit**: return a [`Response`] without calling `next`; the
///   transport never sees the request.
/// - **Decorate**: call `next.run(req).await` and modify the result.
///
/// Implementations must be `Send + Sync` since one stack is shared by every
/// in-flight call, and must not hold locks across an `.await`.
pub trait Middleware: Send + Sync {
    fn handle(&self, req: Request, next: Next) -> BoxFuture<Result<Response, ClientError>>;
}

/// Logs each call's method, URL, outcome and duration.
///
/// Emits one `tracing::info!` line per successful call:
///
/// ```text
/// METHOD url - STATUS (duration)
/// ```
///
/// and one `tracing::warn!` line when the call fails. Placed outside the
/// cache layer, cache hits are logged like any other call, only faster.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, req: Request, next: Next) -> BoxFuture<Result<Response, ClientError>> {
        Box::pin(async move {
            let start = Instant::now();
            let method = req.method().clone();
            let url = req.url().to_owned();

            let result = next.run(req).await;
            let duration = start.elapsed();

            match &result {
                Ok(response) => {
                    tracing::info!("{} {} - {} ({:?})", method, url, response.status(), duration)
                }
                Err(e) => tracing::warn!("{} {} - error: {} ({:?})", method, url, e, duration),
            }

            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::StatusCode;
    use crate::transport::TransportError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Stamp(&'static str);

    impl Middleware for Stamp {
        fn handle(&self, req: Request, next: Next) -> BoxFuture<Result<Response, ClientError>> {
            let tag = self.0;
            Box::pin(async move {
                let mut resp = next.run(req).await?;
                resp.headers_mut().insert("X-Layer", tag);
                Ok(resp)
            })
        }
    }

    struct Block;

    impl Middleware for Block {
        fn handle(&self, _req: Request, _next: Next) -> BoxFuture<Result<Response, ClientError>> {
            Box::pin(async { Ok(Response::new(StatusCode::FORBIDDEN)) })
        }
    }

    fn counting_transport(calls: Arc<AtomicUsize>) -> Arc<dyn Transport> {
        Arc::new(move |_req: Request| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, TransportError>(Response::ok(json!("net"))) }
        })
    }

    #[tokio::test]
    async fn layers_run_in_order_then_transport() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain: Arc<[MiddlewareHandler]> = vec![
            from_middleware(Arc::new(Stamp("outer"))),
            from_middleware(Arc::new(Stamp("inner"))),
        ]
        .into();
        let resp = Next::new(chain, counting_transport(calls.clone()))
            .run(Request::get("/"))
            .await
            .unwrap();

        let tags: Vec<_> = resp.headers().iter().map(|(_, v)| v).collect();
        assert_eq!(tags, vec!["inner", "outer"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn short_circuit_skips_transport() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain: Arc<[MiddlewareHandler]> = vec![from_middleware(Arc::new(Block))].into();
        let resp = Next::new(chain, counting_transport(calls.clone()))
            .run(Request::get("/"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn transport_error_passes_through_logger() {
        let failing: Arc<dyn Transport> = Arc::new(|req: Request| async move {
            Err::<Response, _>(TransportError::failed(req.url(), "connection reset"))
        });
        let chain: Arc<[MiddlewareHandler]> = vec![from_middleware(Arc::new(LoggerMiddleware))].into();
        let err = Next::new(chain, failing).run(Request::get("/down")).await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(TransportError::Failed { .. })));
    }
}
