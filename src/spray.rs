use chrono::{DateTime, FixedOffset, Timelike};

use crate::constants::{
    MAX_SPRAY_WINDOWS, SPRAY_EVENING_HOURS, SPRAY_MAX_HUMIDITY_PERCENT, SPRAY_MAX_TEMPERATURE_C,
    SPRAY_MAX_WIND_MS, SPRAY_MIN_HUMIDITY_PERCENT, SPRAY_MIN_TEMPERATURE_C, SPRAY_MORNING_HOURS,
};
use crate::types::{ForecastBundle, ForecastSample, SprayWindow};

/// First slots (in input order) that are calm, dry, mild and fall in a
/// morning or evening hour at the forecast location.
pub fn find_spray_windows(hourly: &[ForecastSample], utc_offset: FixedOffset) -> Vec<SprayWindow> {
    hourly
        .iter()
        .filter_map(|slot| spray_window(slot, utc_offset))
        .take(MAX_SPRAY_WINDOWS)
        .collect()
}

pub fn spray_windows_for(forecast: &ForecastBundle) -> Vec<SprayWindow> {
    find_spray_windows(&forecast.hourly, forecast.utc_offset())
}

fn spray_window(slot: &ForecastSample, utc_offset: FixedOffset) -> Option<SprayWindow> {
    let timestamp = slot.timestamp?;
    let hour = local_hour(timestamp, utc_offset)?;
    let wind_speed = slot.wind_speed?;
    let temperature = slot.temperature?;
    let humidity = slot.humidity?;
    let dry = slot.precipitation.unwrap_or(0.0) <= 0.0;

    let suitable = wind_speed <= SPRAY_MAX_WIND_MS
        && dry
        && (SPRAY_MIN_TEMPERATURE_C..=SPRAY_MAX_TEMPERATURE_C).contains(&temperature)
        && (SPRAY_MIN_HUMIDITY_PERCENT..=SPRAY_MAX_HUMIDITY_PERCENT).contains(&humidity)
        && is_application_hour(hour);

    suitable.then_some(SprayWindow {
        timestamp,
        temperature,
        wind_speed,
        humidity,
    })
}

fn local_hour(timestamp: i64, utc_offset: FixedOffset) -> Option<u32> {
    let utc = DateTime::from_timestamp(timestamp, 0)?;
    Some(utc.with_timezone(&utc_offset).hour())
}

fn is_application_hour(hour: u32) -> bool {
    let (morning_start, morning_end) = SPRAY_MORNING_HOURS;
    let (evening_start, evening_end) = SPRAY_EVENING_HOURS;
    (morning_start..=morning_end).contains(&hour) || (evening_start..=evening_end).contains(&hour)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Offset, Utc};

    // 2024-05-01T00:00:00Z
    const MIDNIGHT_UTC: i64 = 1_714_521_600;

    fn utc() -> FixedOffset {
        Utc.fix()
    }

    fn slot_at_hour(hour: i64) -> ForecastSample {
        ForecastSample {
            timestamp: Some(MIDNIGHT_UTC + hour * 3600),
            temperature: Some(20.0),
            humidity: Some(60),
            wind_speed: Some(2.0),
            precipitation: Some(0.0),
            condition_text: Some("clear sky".to_string()),
        }
    }

    #[test]
    fn morning_slot_qualifies_and_afternoon_slot_does_not() {
        let windows = find_spray_windows(&[slot_at_hour(7), slot_at_hour(14)], utc());
        assert_eq!(
            windows,
            vec![SprayWindow {
                timestamp: MIDNIGHT_UTC + 7 * 3600,
                temperature: 20.0,
                wind_speed: 2.0,
                humidity: 60,
            }]
        );
    }

    #[test]
    fn hour_ranges_are_inclusive() {
        let hourly: Vec<ForecastSample> = (0..24).map(slot_at_hour).collect();
        let hours: Vec<i64> = find_spray_windows(&hourly, utc())
            .iter()
            .map(|window| (window.timestamp - MIDNIGHT_UTC) / 3600)
            .collect();
        assert_eq!(hours, vec![6, 7, 8, 9, 10, 17, 18, 19]);
    }

    #[test]
    fn local_hour_follows_location_offset() {
        // 01:30 UTC is 07:00 at UTC+05:30.
        let mut slot = slot_at_hour(1);
        slot.timestamp = slot.timestamp.map(|ts| ts + 1800);
        let ist = FixedOffset::east_opt(19_800).unwrap();
        assert_eq!(find_spray_windows(std::slice::from_ref(&slot), ist).len(), 1);
        assert!(find_spray_windows(&[slot], utc()).is_empty());
    }

    #[test]
    fn each_condition_is_required() {
        let mut windy = slot_at_hour(7);
        windy.wind_speed = Some(4.3);
        let mut wet = slot_at_hour(7);
        wet.precipitation = Some(0.2);
        let mut cold = slot_at_hour(7);
        cold.temperature = Some(14.9);
        let mut hot = slot_at_hour(7);
        hot.temperature = Some(32.1);
        let mut dry_air = slot_at_hour(7);
        dry_air.humidity = Some(49);
        let mut muggy = slot_at_hour(7);
        muggy.humidity = Some(86);
        let mut undated = slot_at_hour(7);
        undated.timestamp = None;
        let mut no_wind_reading = slot_at_hour(7);
        no_wind_reading.wind_speed = None;

        let rejected = [
            windy,
            wet,
            cold,
            hot,
            dry_air,
            muggy,
            undated,
            no_wind_reading,
        ];
        assert!(find_spray_windows(&rejected, utc()).is_empty());
    }

    #[test]
    fn boundary_values_are_accepted() {
        let mut edge = slot_at_hour(20);
        edge.wind_speed = Some(4.2);
        edge.temperature = Some(32.0);
        edge.humidity = Some(85);
        edge.precipitation = None;
        let mut low_edge = slot_at_hour(6);
        low_edge.temperature = Some(15.0);
        low_edge.humidity = Some(50);
        low_edge.wind_speed = Some(0.0);

        assert_eq!(find_spray_windows(&[edge, low_edge], utc()).len(), 2);
    }

    #[test]
    fn result_is_capped_in_input_order() {
        let hourly: Vec<ForecastSample> = (0..48).map(slot_at_hour).collect();
        let windows = find_spray_windows(&hourly, utc());
        assert_eq!(windows.len(), MAX_SPRAY_WINDOWS);
        assert!(windows
            .windows(2)
            .all(|pair| pair[0].timestamp < pair[1].timestamp));
        assert_eq!(windows[0].timestamp, MIDNIGHT_UTC + 6 * 3600);
    }

    #[test]
    fn bundle_helper_uses_bundle_offset() {
        let bundle = ForecastBundle {
            hourly: vec![slot_at_hour(2)],
            timezone_offset_seconds: 5 * 3600,
            ..ForecastBundle::default()
        };
        assert_eq!(spray_windows_for(&bundle).len(), 1);
    }
}
