pub mod app;
pub mod capture;
pub mod classifier;
pub mod config;
pub mod sip;
pub mod snapshot;
pub mod tracker;
pub mod uplink;

/// Wall-clock time as Unix seconds.
pub fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
