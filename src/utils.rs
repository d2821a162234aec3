use chrono::Utc;

use crate::constants::FORECAST_CACHE_PREFIX;

pub fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Parses a query value as a finite float, ignoring surrounding whitespace.
pub fn to_finite_number(input: Option<&String>) -> Option<f64> {
    let value = input?.trim();
    if value.is_empty() {
        return None;
    }
    value
        .parse::<f64>()
        .ok()
        .filter(|parsed| parsed.is_finite())
}

pub fn valid_coordinates(lat: f64, lon: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}

/// Same location, same key: coordinates are fixed to four decimals (~11 m).
pub fn location_cache_key(lat: f64, lon: f64) -> String {
    format!("{FORECAST_CACHE_PREFIX}:lat:{lat:.4}:lon:{lon:.4}")
}
