//! Threshold rules that turn a forecast into farm advisories.
//!
//! Rules run in a fixed order and each one may append at most one advisory.
//! When none fire, a single low-priority "favorable conditions" entry is
//! returned, so a forecast with hourly data never yields an empty list.

use crate::constants::{
    COOL_NIGHT_TEMPERATURE_C, DRY_SPELL_LOOKAHEAD_DAYS, DRY_SPELL_RAIN_MM, FROST_TEMPERATURE_C,
    HEAVY_RAIN_MM, HIGH_HUMIDITY_PERCENT, HIGH_TEMPERATURE_C, HIGH_WIND_MS,
    HOURLY_WINDOW_SAMPLES, MODERATE_WIND_MS, MS_TO_KMH, RAIN_LOOKAHEAD_HOURS,
    TEMPERATURE_LOOKAHEAD_DAYS, WARM_TEMPERATURE_C,
};
use crate::types::{Advisory, DailySample, ForecastBundle, ForecastSample, Priority};

/// The slice of a forecast the rules look at.
#[derive(Clone, Copy, Debug)]
pub struct ForecastWindow<'a> {
    pub hourly: &'a [ForecastSample],
    pub daily: &'a [DailySample],
}

impl<'a> ForecastWindow<'a> {
    pub fn from_bundle(bundle: &'a ForecastBundle) -> Self {
        let hourly_len = bundle.hourly.len().min(HOURLY_WINDOW_SAMPLES);
        Self {
            hourly: &bundle.hourly[..hourly_len],
            daily: &bundle.daily,
        }
    }

    fn first_days(&self, count: usize) -> &'a [DailySample] {
        &self.daily[..self.daily.len().min(count)]
    }
}

pub struct AdvisoryRule {
    pub name: &'static str,
    pub evaluate: fn(&ForecastWindow<'_>) -> Option<Advisory>,
}

pub const RULES: [AdvisoryRule; 6] = [
    AdvisoryRule {
        name: "rain",
        evaluate: heavy_rain,
    },
    AdvisoryRule {
        name: "wind",
        evaluate: wind,
    },
    AdvisoryRule {
        name: "temperature_high",
        evaluate: temperature_high,
    },
    AdvisoryRule {
        name: "temperature_low",
        evaluate: temperature_low,
    },
    AdvisoryRule {
        name: "dry_spell",
        evaluate: dry_spell,
    },
    AdvisoryRule {
        name: "humidity",
        evaluate: humidity,
    },
];

pub fn generate_advisories(forecast: &ForecastBundle) -> Vec<Advisory> {
    if forecast.hourly.is_empty() {
        return Vec::new();
    }

    let window = ForecastWindow::from_bundle(forecast);
    let mut advisories: Vec<Advisory> = RULES
        .iter()
        .filter_map(|rule| (rule.evaluate)(&window))
        .collect();

    if advisories.is_empty() {
        advisories.push(favorable_conditions());
    }
    advisories
}

fn heavy_rain(window: &ForecastWindow<'_>) -> Option<Advisory> {
    let rain_next_hours: f64 = window
        .hourly
        .iter()
        .take(RAIN_LOOKAHEAD_HOURS)
        .map(|sample| sample.precipitation.unwrap_or(0.0))
        .sum();

    (rain_next_hours > HEAVY_RAIN_MM).then(|| {
        Advisory::new(
            "Heavy Rain Warning",
            format!("Heavy rain expected ({rain_next_hours:.1}mm in 6h)"),
            "Postpone spraying and fertilizer application",
            Priority::High,
        )
    })
}

fn wind(window: &ForecastWindow<'_>) -> Option<Advisory> {
    let max_wind = window
        .hourly
        .iter()
        .map(|sample| sample.wind_speed.unwrap_or(0.0))
        .fold(f64::NEG_INFINITY, f64::max);
    let max_wind_kmh = max_wind * MS_TO_KMH;

    if max_wind > HIGH_WIND_MS {
        Some(Advisory::new(
            "High Wind Alert",
            format!("Strong winds expected up to {max_wind_kmh:.0} km/h"),
            "Avoid spraying to prevent drift and secure loose objects",
            Priority::High,
        ))
    } else if max_wind > MODERATE_WIND_MS {
        Some(Advisory::new(
            "Moderate Wind Conditions",
            format!("Wind speeds up to {max_wind_kmh:.0} km/h expected"),
            "Exercise caution when spraying, consider timing adjustments",
            Priority::Low,
        ))
    } else {
        None
    }
}

fn temperature_high(window: &ForecastWindow<'_>) -> Option<Advisory> {
    let days = window.first_days(TEMPERATURE_LOOKAHEAD_DAYS);
    if days.is_empty() {
        return None;
    }
    let max_temp = days
        .iter()
        .map(|day| day.temperature_max.unwrap_or(0.0))
        .fold(f64::NEG_INFINITY, f64::max);

    if max_temp > HIGH_TEMPERATURE_C {
        Some(Advisory::new(
            "High Temperature Alert",
            format!("Temperatures reaching {max_temp:.0}°C"),
            "Increase irrigation frequency and monitor crop stress",
            Priority::High,
        ))
    } else if max_temp > WARM_TEMPERATURE_C {
        Some(Advisory::new(
            "Warm Weather Conditions",
            format!("Temperatures up to {max_temp:.0}°C expected"),
            "Ensure adequate water supply for crops and livestock",
            Priority::Low,
        ))
    } else {
        None
    }
}

fn temperature_low(window: &ForecastWindow<'_>) -> Option<Advisory> {
    let days = window.first_days(TEMPERATURE_LOOKAHEAD_DAYS);
    if days.is_empty() {
        return None;
    }
    let min_temp = days
        .iter()
        .map(|day| day.temperature_min.unwrap_or(0.0))
        .fold(f64::INFINITY, f64::min);

    if min_temp < FROST_TEMPERATURE_C {
        Some(Advisory::new(
            "Frost Risk Alert",
            format!("Temperatures may drop to {min_temp:.0}°C"),
            "Cover sensitive plants and protect frost-vulnerable crops",
            Priority::High,
        ))
    } else if min_temp < COOL_NIGHT_TEMPERATURE_C {
        Some(Advisory::new(
            "Cool Night Expected",
            format!("Night temperatures around {min_temp:.0}°C"),
            "Monitor cold-sensitive crops",
            Priority::Low,
        ))
    } else {
        None
    }
}

fn dry_spell(window: &ForecastWindow<'_>) -> Option<Advisory> {
    let days = window.first_days(DRY_SPELL_LOOKAHEAD_DAYS);
    if days.is_empty() {
        return None;
    }
    let rain_next_days: f64 = days.iter().map(|day| day.rain_total.unwrap_or(0.0)).sum();

    (rain_next_days < DRY_SPELL_RAIN_MM).then(|| {
        Advisory::new(
            "Dry Spell Forecast",
            format!("Very little rain expected ({rain_next_days:.1}mm in next 5 days)"),
            "Plan irrigation schedule and monitor soil moisture levels",
            Priority::Medium,
        )
    })
}

fn humidity(window: &ForecastWindow<'_>) -> Option<Advisory> {
    if window.hourly.is_empty() {
        return None;
    }
    let total: f64 = window
        .hourly
        .iter()
        .map(|sample| f64::from(sample.humidity.unwrap_or(0)))
        .sum();
    let avg_humidity = total / window.hourly.len() as f64;

    (avg_humidity > HIGH_HUMIDITY_PERCENT).then(|| {
        Advisory::new(
            "High Humidity Alert",
            format!("Average humidity around {avg_humidity:.0}%"),
            "Monitor for fungal diseases, ideal conditions for disease spread",
            Priority::Medium,
        )
    })
}

fn favorable_conditions() -> Advisory {
    Advisory::new(
        "Favorable Farming Conditions",
        "Weather conditions are generally good for farming activities",
        "Good time for field work, planting, or maintenance tasks",
        Priority::Low,
    )
}
