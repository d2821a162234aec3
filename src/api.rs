use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::advisories::generate_advisories;
use crate::cache::{cache_responses, ResponseCache};
use crate::forecast::{forecast_for_location, ForecastError};
use crate::rate_limit::{enforce_rate_limit, RateLimitPolicy, RateLimiter};
use crate::spray::spray_windows_for;
use crate::types::{AppState, ForecastBundle, SprayWindow};
use crate::utils::{to_finite_number, valid_coordinates};

#[derive(Debug, Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
}

#[derive(Debug, Serialize)]
struct SprayWindowsResponse {
    windows: Vec<SprayWindow>,
}

fn success<T: Serialize>(data: T) -> Response {
    Json(ApiResponse {
        success: true,
        data,
    })
    .into_response()
}

fn failure(status: StatusCode, error: &str) -> Response {
    (
        status,
        Json(serde_json::json!({
            "success": false,
            "error": error,
        })),
    )
        .into_response()
}

pub async fn healthz() -> &'static str {
    "ok"
}

fn parse_location(params: &HashMap<String, String>) -> Option<(f64, f64)> {
    let lat = to_finite_number(params.get("lat"))?;
    let lon = to_finite_number(params.get("lon"))?;
    valid_coordinates(lat, lon).then_some((lat, lon))
}

async fn load_forecast(
    state: &AppState,
    params: &HashMap<String, String>,
) -> Result<ForecastBundle, Response> {
    let Some((lat, lon)) = parse_location(params) else {
        return Err(failure(
            StatusCode::BAD_REQUEST,
            "lat and lon must be finite coordinates within range",
        ));
    };

    match forecast_for_location(state, lat, lon).await {
        Ok(bundle) => Ok(bundle),
        Err(ForecastError::NotConfigured) => Err(failure(
            StatusCode::SERVICE_UNAVAILABLE,
            "Weather service is not configured",
        )),
        Err(ForecastError::Upstream(error)) => {
            warn!("Forecast fetch failed for {lat},{lon}: {error:#}");
            Err(failure(StatusCode::BAD_GATEWAY, "Failed to fetch weather data"))
        }
    }
}

pub async fn forecast(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    match load_forecast(&state, &params).await {
        Ok(bundle) => success(bundle),
        Err(response) => response,
    }
}

pub async fn advisories(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    match load_forecast(&state, &params).await {
        Ok(bundle) => success(generate_advisories(&bundle)),
        Err(response) => response,
    }
}

pub async fn spray_windows(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    match load_forecast(&state, &params).await {
        Ok(bundle) => success(SprayWindowsResponse {
            windows: spray_windows_for(&bundle),
        }),
        Err(response) => response,
    }
}

/// Limiter for login/registration style endpoints, sharing the app store.
pub fn auth_rate_limiter(state: &AppState) -> RateLimiter {
    RateLimiter::new(
        state.store.clone(),
        RateLimitPolicy::auth()
            .with_settings(state.cfg.auth_rate_limit)
            .trusting_forwarded_for(state.cfg.trust_forwarded_for),
    )
}

pub fn user_rate_limiter(state: &AppState) -> RateLimiter {
    RateLimiter::new(
        state.store.clone(),
        RateLimitPolicy::user()
            .with_settings(state.cfg.user_rate_limit)
            .trusting_forwarded_for(state.cfg.trust_forwarded_for),
    )
}

pub fn router(state: AppState) -> Router {
    let response_cache = ResponseCache::new(
        state.store.clone(),
        state.cfg.response_cache_ttl_seconds,
    );

    // Layers added later run first: the limiter sees requests before the cache.
    let weather = Router::new()
        .route("/api/weather/forecast", get(forecast))
        .route("/api/weather/advisories", get(advisories))
        .route("/api/weather/spray-windows", get(spray_windows))
        .route_layer(from_fn_with_state(response_cache, cache_responses))
        .route_layer(from_fn_with_state(
            user_rate_limiter(&state),
            enforce_rate_limit,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .merge(weather)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
