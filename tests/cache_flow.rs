//! End-to-end behaviour of the caching client against an in-memory transport.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use recache::cache::{CacheEntry, CacheKey, ManualClock};
use recache::client::{CachingClient, ClientError};
use recache::config::CacheDefaults;
use recache::http::{Request, Response, StatusCode};
use recache::interceptor::request_hook;
use recache::middleware::LoggerMiddleware;
use recache::storage::{FileStorage, MemoryStorage, Storage, StorageClass};
use recache::transport::TransportError;
use serde_json::{Value, json};

const T0: u64 = 1_700_000_000_000;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Harness {
    client: CachingClient,
    calls: Arc<AtomicUsize>,
    clock: Arc<ManualClock>,
    session: Arc<MemoryStorage>,
    durable: Arc<MemoryStorage>,
}

impl Harness {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Echo transport: answers `{"url", "n"}` where `n` counts network calls.
/// URLs starting with `/missing` get a 404; `/down` fails outright.
fn harness(defaults: CacheDefaults) -> Harness {
    init_tracing();
    let calls = Arc::new(AtomicUsize::new(0));
    let clock = Arc::new(ManualClock::new(T0));
    let session = Arc::new(MemoryStorage::new());
    let durable = Arc::new(MemoryStorage::new());

    let counter = Arc::clone(&calls);
    let client = CachingClient::builder()
        .transport(move |req: Request| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                // Yield once so concurrent calls genuinely overlap.
                tokio::task::yield_now().await;
                let url = req.url().to_owned();
                if url.starts_with("/down") {
                    return Err(TransportError::failed(url, "connection refused"));
                }
                let status = if url.starts_with("/missing") {
                    StatusCode::NOT_FOUND
                } else {
                    StatusCode::OK
                };
                Ok(Response::new(status).payload(json!({ "url": url, "n": n })))
            }
        })
        .defaults(defaults)
        .session_storage(session.clone())
        .durable_storage(durable.clone())
        .clock(clock.clone())
        .layer(LoggerMiddleware)
        .build()
        .unwrap();

    Harness {
        client,
        calls,
        clock,
        session,
        durable,
    }
}

#[tokio::test]
async fn repeat_request_is_served_from_cache() {
    let h = harness(CacheDefaults::new());
    let req = Request::get("/users").param("page", "1").cache(true);

    let first = h.client.send(req.clone()).await.unwrap();
    let second = h.client.send(req).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(h.calls(), 1);
    assert_eq!(h.client.manager().stats().hits, 1);
}

#[tokio::test]
async fn fresh_entry_means_zero_network_attempts() {
    let h = harness(CacheDefaults::new().cache(true));
    let key = CacheKey::for_request(&Request::get("/profile")).unwrap();
    let entry = CacheEntry::new(T0, Value::Null, Value::Null, json!({"name": "ada"}));
    h.session.set(key.as_str(), entry.encode().unwrap()).unwrap();

    let payload = h.client.send(Request::get("/profile")).await.unwrap();

    assert_eq!(payload, json!({"name": "ada"}));
    assert_eq!(h.calls(), 0);
}

#[tokio::test]
async fn freshness_boundary() {
    let h = harness(CacheDefaults::new().cache(true).ttl(Duration::from_millis(100_000)));
    let req = Request::get("/feed");

    h.client.send(req.clone()).await.unwrap();
    h.clock.advance(Duration::from_millis(99_999));
    let hit = h.client.send(req.clone()).await.unwrap();
    assert_eq!(hit["n"], 1);
    assert_eq!(h.calls(), 1);

    h.clock.advance(Duration::from_millis(2));
    let refetched = h.client.send(req.clone()).await.unwrap();
    assert_eq!(refetched["n"], 2);
    assert_eq!(h.calls(), 2);
    assert_eq!(h.client.manager().stats().stale, 1);

    // The refetch wrote a new entry stamped at the current time.
    let key = CacheKey::for_request(&req).unwrap();
    let stored = CacheEntry::decode(&h.session.get(key.as_str()).unwrap()).unwrap();
    assert_eq!(stored.written_at, T0 + 100_001);
}

#[tokio::test]
async fn per_request_ttl_overrides_default() {
    let h = harness(CacheDefaults::new().cache(true));
    let req = Request::get("/ticker").ttl(Duration::from_millis(10));

    h.client.send(req.clone()).await.unwrap();
    h.clock.advance(Duration::from_millis(10));
    h.client.send(req).await.unwrap();
    assert_eq!(h.calls(), 2);
}

#[tokio::test]
async fn disabling_cache_clears_entries_for_url() {
    let h = harness(CacheDefaults::new());
    h.client
        .send(Request::get("/a").param("v", "1").cache(true))
        .await
        .unwrap();
    h.client
        .send(Request::get("/a").cache(true).storage(StorageClass::Durable))
        .await
        .unwrap();
    assert_eq!(h.session.len() + h.durable.len(), 2);

    h.client.send(Request::get("/a").cache(false)).await.unwrap();

    assert!(h.session.is_empty());
    assert!(h.durable.is_empty());
}

#[tokio::test]
async fn round_trip_preserves_payload() {
    let h = harness(CacheDefaults::new().cache(true));
    let key = CacheKey::for_request(&Request::get("/thing")).unwrap();
    let entry = CacheEntry::new(T0, json!({}), Value::Null, json!({"a": 1}));
    h.durable.set(key.as_str(), entry.encode().unwrap()).unwrap();

    let payload = h
        .client
        .send(Request::get("/thing").storage(StorageClass::Durable))
        .await
        .unwrap();
    assert_eq!(payload, json!({"a": 1}));
}

#[tokio::test]
async fn error_status_passes_through_uncached() {
    let h = harness(CacheDefaults::new().cache(true));

    let resp = h.client.execute(Request::get("/missing")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(resp.into_payload()["url"], "/missing");

    h.client.send(Request::get("/missing")).await.unwrap();
    assert_eq!(h.calls(), 2);
    assert!(h.session.is_empty());
}

#[tokio::test]
async fn transport_errors_are_not_swallowed() {
    let h = harness(CacheDefaults::new().cache(true));
    let err = h.client.send(Request::get("/down")).await.unwrap_err();
    assert!(matches!(err, ClientError::Transport(TransportError::Failed { .. })));
    assert!(h.session.is_empty());
}

#[tokio::test]
async fn malformed_entry_is_a_miss() {
    let h = harness(CacheDefaults::new().cache(true));
    let key = CacheKey::for_request(&Request::get("/x")).unwrap();
    h.session.set(key.as_str(), "<html>".to_owned()).unwrap();

    let payload = h.client.send(Request::get("/x")).await.unwrap();
    assert_eq!(payload["n"], 1);
    // Overwritten by the fresh response.
    assert!(CacheEntry::decode(&h.session.get(key.as_str()).unwrap()).is_ok());
}

#[tokio::test]
async fn unserializable_body_rejects_request() {
    let h = harness(CacheDefaults::new().cache(true));
    let req = Request::post("/upload").bytes(vec![0xff, 0x00, 0xfe]);
    let err = h.client.send(req).await.unwrap_err();
    assert!(matches!(err, ClientError::Key(_)));
    assert_eq!(h.calls(), 0);
}

#[tokio::test]
async fn json_bodies_with_reordered_keys_share_an_entry() {
    let h = harness(CacheDefaults::new().cache(true));
    h.client
        .send(Request::post("/search").json(json!({"q": "rust", "page": 1})))
        .await
        .unwrap();
    h.client
        .send(Request::post("/search").json(json!({"page": 1, "q": "rust"})))
        .await
        .unwrap();
    assert_eq!(h.calls(), 1);
}

#[tokio::test]
async fn concurrent_identical_requests_are_not_coalesced() {
    let h = harness(CacheDefaults::new().cache(true));
    let req = Request::get("/race");
    let (a, b) = tokio::join!(h.client.send(req.clone()), h.client.send(req.clone()));
    a.unwrap();
    b.unwrap();
    assert_eq!(h.calls(), 2);
    assert_eq!(h.session.len(), 1);
}

#[tokio::test]
async fn request_hook_runs_before_cache_decision() {
    init_tracing();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let client = CachingClient::builder()
        .transport(move |_req: Request| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, TransportError>(Response::ok(json!("fresh"))) }
        })
        .request_hook(request_hook(|req| async move {
            if req.url().starts_with("/admin") {
                return Err(ClientError::hook("request", "forbidden route"));
            }
            Ok(req.cache(true))
        }))
        .build()
        .unwrap();

    client.send(Request::get("/public")).await.unwrap();
    client.send(Request::get("/public")).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let err = client.send(Request::get("/admin")).await.unwrap_err();
    assert!(matches!(err, ClientError::Hook { stage: "request", .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn teardown_removes_orphaned_durable_keys() {
    let h = harness(CacheDefaults::new().cache(true).storage(StorageClass::Durable));
    // Left over from a previous run and already past the TTL.
    let old = CacheEntry::new(T0 - 200_000, Value::Null, Value::Null, json!(0))
        .encode()
        .unwrap();
    h.durable.set("/x?cacheParams=1", old.clone()).unwrap();
    h.durable.set("/y?cacheParams=2", old).unwrap();
    h.durable.set("settings", "{}".to_owned()).unwrap();

    h.client.send(Request::post("/x").text("1")).await.unwrap();

    let report = h.client.close();
    assert_eq!(report.removed, 1);
    assert!(h.durable.get("/x?cacheParams=1").is_some());
    assert!(h.durable.get("/y?cacheParams=2").is_none());
    assert!(h.durable.get("settings").is_some());

    assert_eq!(h.client.close().removed, 0);
}

#[tokio::test]
async fn durable_file_survives_restart_and_gets_swept() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("http-cache.json");
    let calls = Arc::new(AtomicUsize::new(0));

    let build = |calls: Arc<AtomicUsize>| {
        CachingClient::builder()
            .transport(move |req: Request| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, TransportError>(Response::ok(json!({ "url": req.url() }))) }
            })
            .defaults(CacheDefaults::new().cache(true).storage(StorageClass::Durable))
            .durable_path(&path)
            .build()
            .unwrap()
    };

    let first_run = build(Arc::clone(&calls));
    first_run.send(Request::get("/keep")).await.unwrap();
    first_run.send(Request::get("/drop")).await.unwrap();
    first_run.close();
    drop(first_run);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let second_run = build(Arc::clone(&calls));
    second_run.send(Request::get("/keep")).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    // A hit is a read, not a write, so `/keep` is not live in this run either.
    let report = second_run.close();
    assert_eq!(report.removed, 2);

    let on_disk = FileStorage::open(&path).unwrap();
    assert!(on_disk.is_empty());
}
