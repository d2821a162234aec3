use axum::body::{Body, HttpBody};
use axum::extract::{OriginalUri, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::Response;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use tracing::{debug, warn};

use crate::constants::{MAX_CACHED_BODY_BYTES, RESPONSE_CACHE_PREFIX};
use crate::store::KeyValueStore;
use crate::types::SharedStore;

pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Reads and decodes `key`. Misses, decode failures, store errors and a
/// missing store all come back as `None`.
pub async fn get_cached<T: DeserializeOwned>(
    store: Option<&dyn KeyValueStore>,
    key: &str,
) -> Option<T> {
    let raw = get_cached_raw(store, key).await?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(error) => {
            debug!("Discarding undecodable cache entry {key}: {error}");
            None
        }
    }
}

/// Stores `value` as JSON for `ttl_seconds`. Failures are logged and dropped.
pub async fn set_cache<T: Serialize + ?Sized>(
    store: Option<&dyn KeyValueStore>,
    key: &str,
    value: &T,
    ttl_seconds: u64,
) {
    let Some(store) = store else {
        return;
    };
    let encoded = match serde_json::to_string(value) {
        Ok(encoded) => encoded,
        Err(error) => {
            warn!("Failed to encode cache entry {key}: {error}");
            return;
        }
    };
    if let Err(error) = store.set_ex(key, encoded, ttl_seconds).await {
        warn!("Cache write failed for {key}: {error:#}");
    }
}

async fn get_cached_raw(store: Option<&dyn KeyValueStore>, key: &str) -> Option<String> {
    match store?.get(key).await {
        Ok(value) => value,
        Err(error) => {
            warn!("Cache read failed for {key}: {error:#}");
            None
        }
    }
}

#[derive(Clone)]
pub struct ResponseCache {
    store: Option<SharedStore>,
    ttl_seconds: u64,
}

impl ResponseCache {
    pub fn new(store: Option<SharedStore>, ttl_seconds: u64) -> Self {
        Self { store, ttl_seconds }
    }
}

pub fn response_cache_key(uri: &Uri) -> String {
    let path_and_query = uri
        .path_and_query()
        .map(|value| value.as_str())
        .unwrap_or_else(|| uri.path());
    format!("{RESPONSE_CACHE_PREFIX}{path_and_query}")
}

/// Serves cached JSON bodies for GET requests and records `200` JSON
/// responses on the way out. Hits replay as `200`, so other statuses are
/// never stored. Responses pass through untouched apart from
/// the `x-cache` marker.
pub async fn cache_responses(
    State(cache): State<ResponseCache>,
    request: Request,
    next: Next,
) -> Response {
    let Some(store) = cache.store.clone() else {
        return next.run(request).await;
    };
    if request.method() != Method::GET {
        return next.run(request).await;
    }

    let key = match request.extensions().get::<OriginalUri>() {
        Some(OriginalUri(uri)) => response_cache_key(uri),
        None => response_cache_key(request.uri()),
    };

    if let Some(raw) = get_cached_raw(Some(store.as_ref()), &key).await {
        if serde_json::from_str::<IgnoredAny>(&raw).is_ok() {
            debug!("Response cache hit for {key}");
            return cached_response(raw);
        }
        debug!("Ignoring non-JSON response cache entry {key}");
    }

    let response = next.run(request).await;
    if response.status() != StatusCode::OK || !is_json(&response) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let fits = body
        .size_hint()
        .upper()
        .is_some_and(|upper| upper <= MAX_CACHED_BODY_BYTES as u64);
    if !fits {
        return Response::from_parts(parts, body);
    }

    let bytes = match axum::body::to_bytes(body, MAX_CACHED_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(error) => {
            warn!("Failed to buffer response body for {key}: {error}");
            return Response::from_parts(parts, Body::empty());
        }
    };

    match std::str::from_utf8(&bytes) {
        Ok(text) if serde_json::from_str::<IgnoredAny>(text).is_ok() => {
            if let Err(error) = store
                .set_ex(&key, text.to_string(), cache.ttl_seconds)
                .await
            {
                warn!("Cache write failed for {key}: {error:#}");
            }
        }
        _ => debug!("Not caching non-JSON body for {key}"),
    }

    parts.headers.insert(X_CACHE, HeaderValue::from_static("MISS"));
    Response::from_parts(parts, Body::from(bytes))
}

fn cached_response(raw: String) -> Response {
    let mut response = Response::new(Body::from(raw));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(X_CACHE, HeaderValue::from_static("HIT"));
    response
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde::Deserialize;
    use tower::ServiceExt;

    use super::*;
    use crate::store::testing::FailingStore;
    use crate::store::MemoryStore;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        name: String,
        values: Vec<u32>,
    }

    fn payload() -> Payload {
        Payload {
            name: "mandi".to_string(),
            values: vec![3, 1, 2],
        }
    }

    #[tokio::test]
    async fn unset_key_reads_as_none() {
        let store = MemoryStore::new();
        assert_eq!(get_cached::<Payload>(Some(&store), "missing").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn round_trip_then_expiry() {
        let store = MemoryStore::new();
        set_cache(Some(&store), "k", &payload(), 30).await;
        assert_eq!(get_cached::<Payload>(Some(&store), "k").await, Some(payload()));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(get_cached::<Payload>(Some(&store), "k").await, None);
    }

    #[tokio::test]
    async fn undecodable_entry_is_a_miss() {
        let store = MemoryStore::new();
        store.set_ex("k", "{not json".to_string(), 30).await.unwrap();
        assert_eq!(get_cached::<Payload>(Some(&store), "k").await, None);
    }

    #[tokio::test]
    async fn store_failures_and_absence_fail_open() {
        set_cache(Some(&FailingStore), "k", &payload(), 30).await;
        assert_eq!(get_cached::<Payload>(Some(&FailingStore), "k").await, None);

        set_cache(None, "k", &payload(), 30).await;
        assert_eq!(get_cached::<Payload>(None, "k").await, None);
    }

    #[test]
    fn key_covers_path_and_query() {
        let uri: Uri = "/api/weather/advisories?lat=18.5&lon=73.8".parse().unwrap();
        assert_eq!(
            response_cache_key(&uri),
            "cache:/api/weather/advisories?lat=18.5&lon=73.8"
        );
    }

    fn counting_router(store: Option<SharedStore>, status: StatusCode) -> (Router, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let handler_hits = hits.clone();
        let router = Router::new()
            .route(
                "/data",
                get(move || {
                    let hits = handler_hits.clone();
                    async move {
                        let count = hits.fetch_add(1, Ordering::SeqCst) + 1;
                        (status, Json(serde_json::json!({ "count": count }))).into_response()
                    }
                }),
            )
            .layer(axum::middleware::from_fn_with_state(
                ResponseCache::new(store, 60),
                cache_responses,
            ));
        (router, hits)
    }

    async fn call(router: &Router, uri: &str) -> (StatusCode, Option<String>, String) {
        let response = router
            .clone()
            .oneshot(
                axum::http::Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let marker = response
            .headers()
            .get(X_CACHE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, marker, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn second_request_is_served_from_cache() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let (router, hits) = counting_router(Some(store), StatusCode::OK);

        let first = call(&router, "/data?lat=1").await;
        let second = call(&router, "/data?lat=1").await;

        assert_eq!(first.0, StatusCode::OK);
        assert_eq!(first.1.as_deref(), Some("MISS"));
        assert_eq!(second.0, StatusCode::OK);
        assert_eq!(second.1.as_deref(), Some("HIT"));
        assert_eq!(first.2, second.2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let other_query = call(&router, "/data?lat=2").await;
        assert_eq!(other_query.1.as_deref(), Some("MISS"));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn error_responses_are_not_cached() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let (router, hits) = counting_router(Some(store), StatusCode::BAD_GATEWAY);

        let first = call(&router, "/data").await;
        let second = call(&router, "/data").await;

        assert_eq!(first.0, StatusCode::BAD_GATEWAY);
        assert_eq!(second.0, StatusCode::BAD_GATEWAY);
        assert_eq!(second.1, None);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_200_success_keeps_its_status() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let (router, hits) = counting_router(Some(store), StatusCode::CREATED);

        let first = call(&router, "/data").await;
        let second = call(&router, "/data").await;

        assert_eq!(first.0, StatusCode::CREATED);
        assert_eq!(second.0, StatusCode::CREATED);
        assert_eq!(second.1, None);
        assert_eq!(second.2, r#"{"count":2}"#);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_or_failing_store_passes_through() {
        let (router, hits) = counting_router(None, StatusCode::OK);
        call(&router, "/data").await;
        let (status, marker, _) = call(&router, "/data").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(marker, None);
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        let failing: SharedStore = Arc::new(FailingStore);
        let (router, hits) = counting_router(Some(failing), StatusCode::OK);
        call(&router, "/data").await;
        let (status, _, body) = call(&router, "/data").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"count":2}"#);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
