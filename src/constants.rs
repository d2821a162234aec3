pub const HOURLY_WINDOW_SAMPLES: usize = 24;
pub const RAIN_LOOKAHEAD_HOURS: usize = 6;
pub const TEMPERATURE_LOOKAHEAD_DAYS: usize = 3;
pub const DRY_SPELL_LOOKAHEAD_DAYS: usize = 5;

pub const HEAVY_RAIN_MM: f64 = 5.0;
pub const HIGH_WIND_MS: f64 = 5.5;
pub const MODERATE_WIND_MS: f64 = 3.0;
pub const HIGH_TEMPERATURE_C: f64 = 35.0;
pub const WARM_TEMPERATURE_C: f64 = 28.0;
pub const FROST_TEMPERATURE_C: f64 = 5.0;
pub const COOL_NIGHT_TEMPERATURE_C: f64 = 12.0;
pub const DRY_SPELL_RAIN_MM: f64 = 2.0;
pub const HIGH_HUMIDITY_PERCENT: f64 = 75.0;
pub const MS_TO_KMH: f64 = 3.6;

pub const SPRAY_MAX_WIND_MS: f64 = 4.2;
pub const SPRAY_MIN_TEMPERATURE_C: f64 = 15.0;
pub const SPRAY_MAX_TEMPERATURE_C: f64 = 32.0;
pub const SPRAY_MIN_HUMIDITY_PERCENT: u8 = 50;
pub const SPRAY_MAX_HUMIDITY_PERCENT: u8 = 85;
pub const SPRAY_MORNING_HOURS: (u32, u32) = (6, 10);
pub const SPRAY_EVENING_HOURS: (u32, u32) = (17, 20);
pub const MAX_SPRAY_WINDOWS: usize = 8;

pub const RESPONSE_CACHE_PREFIX: &str = "cache:";
pub const FORECAST_CACHE_PREFIX: &str = "forecast";
pub const RATE_LIMIT_PREFIX: &str = "rl";

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:5000";
pub const DEFAULT_OPENWEATHER_BASE_URL: &str = "https://api.openweathermap.org";
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 10;
pub const DEFAULT_REDIS_PORT: u16 = 6379;
pub const DEFAULT_RESPONSE_CACHE_TTL_SECONDS: u64 = 3600;
pub const DEFAULT_FORECAST_CACHE_TTL_SECONDS: u64 = 600;
pub const DEFAULT_USER_RATE_LIMIT: u64 = 120;
pub const DEFAULT_USER_RATE_WINDOW_SECONDS: u64 = 60;
pub const DEFAULT_AUTH_RATE_LIMIT: u64 = 10;
pub const DEFAULT_AUTH_RATE_WINDOW_SECONDS: u64 = 60;

pub const STORE_CONNECT_ATTEMPTS: u32 = 3;
pub const STORE_RETRY_STEP_MS: u64 = 50;
pub const STORE_RETRY_MAX_DELAY_MS: u64 = 2000;
pub const MEMORY_STORE_SWEEP_INTERVAL_SECONDS: u64 = 60;
pub const MAX_CACHED_BODY_BYTES: usize = 4 * 1024 * 1024;
