pub mod meter_metrics;

pub use meter_metrics::*;
