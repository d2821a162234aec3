//! Fixed-window request counting keyed by caller identity.
//!
//! Limits are best effort: a caller without an identity, or a missing or
//! failing store, is always let through.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{debug, warn};

use crate::config::RateLimitSettings;
use crate::constants::{
    DEFAULT_AUTH_RATE_LIMIT, DEFAULT_AUTH_RATE_WINDOW_SECONDS, DEFAULT_USER_RATE_LIMIT,
    DEFAULT_USER_RATE_WINDOW_SECONDS, RATE_LIMIT_PREFIX,
};
use crate::types::SharedStore;
use crate::utils::now_ms;

/// Inserted into request extensions by the authentication middleware that
/// runs ahead of the limiter; without it callers are identified by IP.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub id: String,
}

/// Derives the caller identity; the flag says whether `X-Forwarded-For` is trusted.
pub type Identify = fn(&Request, bool) -> Option<String>;

#[derive(Clone, Copy)]
pub struct RateLimitPolicy {
    pub key_prefix: &'static str,
    pub limit: u64,
    pub window_seconds: u64,
    pub identify: Identify,
    pub trust_forwarded_for: bool,
}

impl RateLimitPolicy {
    /// Login/registration style endpoints: 10 requests per minute per IP.
    pub fn auth() -> Self {
        Self {
            key_prefix: "auth",
            limit: DEFAULT_AUTH_RATE_LIMIT,
            window_seconds: DEFAULT_AUTH_RATE_WINDOW_SECONDS,
            identify: identify_by_ip,
            trust_forwarded_for: false,
        }
    }

    /// General API traffic: 120 requests per minute per user, else per IP.
    pub fn user() -> Self {
        Self {
            key_prefix: "user",
            limit: DEFAULT_USER_RATE_LIMIT,
            window_seconds: DEFAULT_USER_RATE_WINDOW_SECONDS,
            identify: identify_user_or_ip,
            trust_forwarded_for: false,
        }
    }

    pub fn with_settings(self, settings: RateLimitSettings) -> Self {
        Self {
            limit: settings.limit,
            window_seconds: settings.window_seconds.max(1),
            ..self
        }
    }

    pub fn trusting_forwarded_for(self, trust_forwarded_for: bool) -> Self {
        Self {
            trust_forwarded_for,
            ..self
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Limited { retry_after_seconds: u64 },
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Option<SharedStore>,
    policy: RateLimitPolicy,
}

impl RateLimiter {
    pub fn new(store: Option<SharedStore>, policy: RateLimitPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Counts one request for `id` in the window containing `now_ms`.
    pub async fn check(&self, id: &str, now_ms: i64) -> RateDecision {
        let Some(store) = self.store.as_ref() else {
            return RateDecision::Allowed;
        };

        let window_seconds = self.policy.window_seconds.max(1);
        let key = window_key(self.policy.key_prefix, id, window_seconds, now_ms);

        let count = match store.incr(&key).await {
            Ok(count) => count,
            Err(error) => {
                warn!("Rate limit counter unavailable for {key}: {error:#}");
                return RateDecision::Allowed;
            }
        };
        if count == 1 {
            if let Err(error) = store.expire(&key, window_seconds).await {
                warn!("Failed to set expiry on {key}: {error:#}");
            }
        }

        if u64::try_from(count).unwrap_or(0) > self.policy.limit {
            debug!("Rate limit exceeded for {key} ({count} > {})", self.policy.limit);
            RateDecision::Limited {
                retry_after_seconds: seconds_left_in_window(window_seconds, now_ms),
            }
        } else {
            RateDecision::Allowed
        }
    }
}

pub fn window_key(prefix: &str, id: &str, window_seconds: u64, now_ms: i64) -> String {
    let window_ms = i64::try_from(window_seconds.max(1).saturating_mul(1000)).unwrap_or(i64::MAX);
    let window = now_ms.div_euclid(window_ms);
    format!("{RATE_LIMIT_PREFIX}:{prefix}:{id}:{window}")
}

fn seconds_left_in_window(window_seconds: u64, now_ms: i64) -> u64 {
    let window_ms = i64::try_from(window_seconds.max(1).saturating_mul(1000)).unwrap_or(i64::MAX);
    let remaining_ms = window_ms - now_ms.rem_euclid(window_ms);
    u64::try_from(remaining_ms).unwrap_or(0).div_ceil(1000).max(1)
}

pub async fn enforce_rate_limit(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let policy = limiter.policy;
    let Some(id) = (policy.identify)(&request, policy.trust_forwarded_for) else {
        return next.run(request).await;
    };

    match limiter.check(&id, now_ms()).await {
        RateDecision::Allowed => next.run(request).await,
        RateDecision::Limited {
            retry_after_seconds,
        } => too_many_requests(policy.window_seconds, retry_after_seconds),
    }
}

fn too_many_requests(window_seconds: u64, retry_after_seconds: u64) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(serde_json::json!({
            "error": "Too many requests",
            "message": format!("Rate limit exceeded. Try again in {window_seconds} seconds"),
        })),
    )
        .into_response();
    response
        .headers_mut()
        .insert(RETRY_AFTER, HeaderValue::from(retry_after_seconds));
    response
}

/// Socket peer address, or the first `X-Forwarded-For` entry when the header
/// is trusted and present.
pub fn client_ip(request: &Request, trust_forwarded_for: bool) -> Option<String> {
    if trust_forwarded_for {
        if let Some(ip) = forwarded_for(request) {
            return Some(ip);
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

fn forwarded_for(request: &Request) -> Option<String> {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub fn identify_by_ip(request: &Request, trust_forwarded_for: bool) -> Option<String> {
    client_ip(request, trust_forwarded_for).map(|ip| format!("ip:{ip}"))
}

pub fn identify_user_or_ip(request: &Request, trust_forwarded_for: bool) -> Option<String> {
    match request.extensions().get::<AuthenticatedUser>() {
        Some(user) if !user.id.is_empty() => Some(format!("user:{}", user.id)),
        _ => identify_by_ip(request, trust_forwarded_for),
    }
}
