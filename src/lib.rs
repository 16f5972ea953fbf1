//! # recache
//!
//! A request-level response cache for async HTTP clients.
//!
//! Wrap any [`Transport`] in a [`CachingClient`]; requests that opt in with
//! `cache(true)` are answered from storage while their entry is younger than
//! the TTL, and written back after every successful network call. Entries go
//! to a session store or a durable store; durable entries not written during
//! the current run are swept when the client is closed.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use recache::{CachingClient, Request, Response};
//! use recache::transport::TransportError;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = CachingClient::builder()
//!         .transport(|req: Request| async move {
//!             Ok::<_, TransportError>(Response::ok(serde_json::json!({ "url": req.url() })))
//!         })
//!         .build()?;
//!
//!     let first = client.send(Request::get("/config").cache(true)).await?;
//!     let second = client.send(Request::get("/config").cache(true)).await?; // from cache
//!     assert_eq!(first, second);
//!
//!     client.close();
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod http;
pub mod interceptor;
pub mod middleware;
pub mod storage;
pub mod transport;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use cache::{CacheEntry, CacheKey, CacheManager};
pub use client::{CachingClient, ClientError};
pub use config::CacheDefaults;
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use storage::StorageClass;
pub use transport::Transport;
