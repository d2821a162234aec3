pub mod advisories;
pub mod api;
pub mod cache;
pub mod config;
pub mod constants;
pub mod forecast;
pub mod rate_limit;
pub mod spray;
pub mod store;
pub mod types;
pub mod utils;
