use parking_lot::RwLock;
use std::sync::atomic::{AtomicI16, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared metrics for cross-thread pipeline monitoring
#[derive(Clone)]
pub struct MeterMetrics {
    // Loudness readout
    pub current_db: Arc<AtomicI16>,       // Latest frame loudness, dB * 10
    pub last_interval_db: Arc<AtomicI16>, // Latest closed-interval mean, dB * 10

    // Event counters
    pub frames_decoded: Arc<AtomicU64>,
    pub read_failures: Arc<AtomicU64>,
    pub samples_discarded: Arc<AtomicU64>,
    pub intervals_completed: Arc<AtomicU64>,
    pub violations_recorded: Arc<AtomicU64>,

    // Cadence
    pub tick_rate: Arc<AtomicU64>, // Ticks per second * 10

    pub last_violation_time: Arc<RwLock<Option<Instant>>>,
}

impl Default for MeterMetrics {
    fn default() -> Self {
        Self {
            current_db: Arc::new(AtomicI16::new(0)),
            last_interval_db: Arc::new(AtomicI16::new(0)),

            frames_decoded: Arc::new(AtomicU64::new(0)),
            read_failures: Arc::new(AtomicU64::new(0)),
            samples_discarded: Arc::new(AtomicU64::new(0)),
            intervals_completed: Arc::new(AtomicU64::new(0)),
            violations_recorded: Arc::new(AtomicU64::new(0)),

            tick_rate: Arc::new(AtomicU64::new(0)),

            last_violation_time: Arc::new(RwLock::new(None)),
        }
    }
}

impl MeterMetrics {
    pub fn update_current_db(&self, db: f64) {
        self.current_db.store((db * 10.0) as i16, Ordering::Relaxed);
    }

    pub fn update_interval_db(&self, db: f64) {
        self.last_interval_db
            .store((db * 10.0) as i16, Ordering::Relaxed);
    }

    pub fn increment_frames_decoded(&self) {
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_read_failures(&self) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_samples_discarded(&self, count: u64) {
        self.samples_discarded.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_intervals_completed(&self) {
        self.intervals_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_violations(&self) {
        self.violations_recorded.fetch_add(1, Ordering::Relaxed);
        *self.last_violation_time.write() = Some(Instant::now());
    }

    pub fn update_tick_rate(&self, rate: f64) {
        self.tick_rate.store((rate * 10.0) as u64, Ordering::Relaxed);
    }

    /// Point-in-time copy for stats logging and dashboards.
    pub fn snapshot(&self) -> MeterSnapshot {
        MeterSnapshot {
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            samples_discarded: self.samples_discarded.load(Ordering::Relaxed),
            intervals_completed: self.intervals_completed.load(Ordering::Relaxed),
            violations_recorded: self.violations_recorded.load(Ordering::Relaxed),
            current_db: self.current_db.load(Ordering::Relaxed) as f64 / 10.0,
            last_interval_db: self.last_interval_db.load(Ordering::Relaxed) as f64 / 10.0,
            tick_rate: self.tick_rate.load(Ordering::Relaxed) as f64 / 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterSnapshot {
    pub frames_decoded: u64,
    pub read_failures: u64,
    pub samples_discarded: u64,
    pub intervals_completed: u64,
    pub violations_recorded: u64,
    pub current_db: f64,
    pub last_interval_db: f64,
    pub tick_rate: f64,
}

#[derive(Debug)]
pub struct RateTracker {
    last_update: Instant,
    tick_count: u64,
}

impl RateTracker {
    pub fn new() -> Self {
        Self {
            last_update: Instant::now(),
            tick_count: 0,
        }
    }

    pub fn tick(&mut self) -> Option<f64> {
        self.tick_count += 1;
        let elapsed = self.last_update.elapsed();

        if elapsed >= Duration::from_secs(1) {
            let rate = self.tick_count as f64 / elapsed.as_secs_f64();
            self.last_update = Instant::now();
            self.tick_count = 0;
            Some(rate)
        } else {
            None
        }
    }
}

impl Default for RateTracker {
    fn default() -> Self {
        Self::new()
    }
}
