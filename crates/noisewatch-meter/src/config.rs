use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Static parameters of the monitoring pipeline. There is no runtime tuning
/// surface; everything is fixed for the life of the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterConfig {
    /// Samples pulled per tick.
    pub frame_size: usize,

    /// Capture rate requested from the device.
    pub sample_rate_hz: u32,

    /// Channels after the capture-side fold. Always mono downstream.
    pub channels: u16,

    /// Interval window length in seconds.
    pub window_secs: f64,

    /// Interval averages strictly above this trigger a violation.
    pub threshold_db: f64,

    /// Added to the raw log-amplitude reading. A tuning constant, not a
    /// calibrated sound-pressure reference.
    pub calibration_offset_db: f64,

    /// Trailing history kept for the loudness time series.
    pub display_window_secs: f64,

    /// Sampling cadence.
    pub tick_period_ms: u64,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            frame_size: 1024,
            sample_rate_hz: 44_100,
            channels: 1,
            window_secs: 10.0,
            threshold_db: 55.0,
            calibration_offset_db: 30.0,
            display_window_secs: 60.0,
            tick_period_ms: 100,
        }
    }
}

impl MeterConfig {
    /// Time one frame spans at the configured rate.
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_size as f64 / self.sample_rate_hz as f64)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }
}
