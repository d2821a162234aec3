//! OpenWeather One Call client and normalization into `ForecastBundle`.

use anyhow::{anyhow, bail, Context, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::cache::{get_cached, set_cache};
use crate::config::Config;
use crate::types::{AppState, DailySample, ForecastBundle, ForecastSample};
use crate::utils::location_cache_key;

#[derive(Debug, Default, Deserialize)]
struct OneCallResponse {
    #[serde(default)]
    timezone_offset: i32,
    #[serde(default)]
    current: Option<RawSample>,
    #[serde(default)]
    hourly: Option<Vec<RawSample>>,
    #[serde(default)]
    daily: Option<Vec<RawDaily>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSample {
    dt: Option<i64>,
    temp: Option<f64>,
    humidity: Option<f64>,
    wind_speed: Option<f64>,
    rain: Option<RawRain>,
    #[serde(default)]
    weather: Vec<RawCondition>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRain {
    #[serde(rename = "1h")]
    one_hour: Option<f64>,
    #[serde(rename = "3h")]
    three_hours: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCondition {
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDaily {
    dt: Option<i64>,
    temp: Option<RawDailyTemp>,
    humidity: Option<f64>,
    wind_speed: Option<f64>,
    rain: Option<f64>,
    #[serde(default)]
    weather: Vec<RawCondition>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDailyTemp {
    day: Option<f64>,
    min: Option<f64>,
    max: Option<f64>,
}

fn normalize_humidity(value: Option<f64>) -> Option<u8> {
    value
        .filter(|humidity| humidity.is_finite())
        .map(|humidity| humidity.round().clamp(0.0, 100.0) as u8)
}

fn condition_text(weather: &[RawCondition]) -> Option<String> {
    weather.first().and_then(|condition| condition.description.clone())
}

impl RawSample {
    fn normalize(self) -> ForecastSample {
        // A zero 3h accumulation falls back to the 1h reading.
        let precipitation = self.rain.and_then(|rain| {
            rain.three_hours
                .filter(|amount| *amount > 0.0)
                .or(rain.one_hour)
        });
        ForecastSample {
            timestamp: self.dt,
            temperature: self.temp,
            humidity: normalize_humidity(self.humidity),
            wind_speed: self.wind_speed,
            precipitation,
            condition_text: condition_text(&self.weather),
        }
    }
}

impl RawDaily {
    fn normalize(self) -> DailySample {
        let temp = self.temp.unwrap_or_default();
        DailySample {
            sample: ForecastSample {
                timestamp: self.dt,
                temperature: temp.day,
                humidity: normalize_humidity(self.humidity),
                wind_speed: self.wind_speed,
                precipitation: self.rain,
                condition_text: condition_text(&self.weather),
            },
            temperature_min: temp.min,
            temperature_max: temp.max,
            rain_total: self.rain,
        }
    }
}

impl OneCallResponse {
    fn normalize(self) -> ForecastBundle {
        ForecastBundle {
            current: self.current.map(RawSample::normalize),
            hourly: self
                .hourly
                .unwrap_or_default()
                .into_iter()
                .map(RawSample::normalize)
                .collect(),
            daily: self
                .daily
                .unwrap_or_default()
                .into_iter()
                .map(RawDaily::normalize)
                .collect(),
            timezone_offset_seconds: self.timezone_offset,
        }
    }
}

pub fn parse_one_call(body: &str) -> Result<ForecastBundle> {
    let response: OneCallResponse =
        serde_json::from_str(body).context("Failed to decode One Call response")?;
    Ok(response.normalize())
}

pub async fn fetch_forecast(http: &Client, cfg: &Config, lat: f64, lon: f64) -> Result<ForecastBundle> {
    let api_key = cfg
        .openweather_api_key
        .as_deref()
        .ok_or_else(|| anyhow!("OPENWEATHER_API_KEY is not configured"))?;
    let url = format!("{}/data/3.0/onecall", cfg.openweather_base_url);

    let response = http
        .get(&url)
        .query(&[
            ("lat", lat.to_string()),
            ("lon", lon.to_string()),
            ("units", "metric".to_string()),
            ("exclude", "minutely,alerts".to_string()),
            ("appid", api_key.to_string()),
        ])
        .send()
        .await
        .with_context(|| format!("Request failed for {url}"))?;

    if !response.status().is_success() {
        bail!("Request failed ({}) for {url}", response.status());
    }

    let body = response
        .text()
        .await
        .with_context(|| format!("Failed to read text body for {url}"))?;
    parse_one_call(&body)
}

#[derive(Debug)]
pub enum ForecastError {
    NotConfigured,
    Upstream(anyhow::Error),
}

/// Cached forecast for a location, fetching and caching it on a miss.
pub async fn forecast_for_location(
    state: &AppState,
    lat: f64,
    lon: f64,
) -> std::result::Result<ForecastBundle, ForecastError> {
    let key = location_cache_key(lat, lon);
    if let Some(bundle) = get_cached::<ForecastBundle>(state.store(), &key).await {
        debug!("Forecast cache hit for {key}");
        return Ok(bundle);
    }

    if state.cfg.openweather_api_key.is_none() {
        return Err(ForecastError::NotConfigured);
    }

    let bundle = fetch_forecast(&state.http, &state.cfg, lat, lon)
        .await
        .map_err(ForecastError::Upstream)?;
    info!(
        "Fetched forecast for {key}: {} hourly, {} daily",
        bundle.hourly.len(),
        bundle.daily.len()
    );
    set_cache(
        state.store(),
        &key,
        &bundle,
        state.cfg.forecast_cache_ttl_seconds,
    )
    .await;
    Ok(bundle)
}
