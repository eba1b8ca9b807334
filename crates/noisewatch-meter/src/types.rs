/// One fixed-size block of mono PCM samples, consumed by a single decode.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
}

/// One decoded loudness reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoudnessSample {
    /// Seconds since the loop started.
    pub timestamp: f64,

    pub value_db: f64,
}

/// Mean loudness over one closed interval window. Immutable once emitted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalAverage {
    /// Zero-based window index, also the bar position on the chart.
    pub index: u64,

    pub mean_db: f64,
}

/// One threshold crossing. `number` counts crossings from 1 in arrival
/// order; it is what the warning text enumerates, not the interval index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViolationRecord {
    pub number: u64,

    pub interval_index: u64,
}

/// Snapshot of the warning state after a new violation.
#[derive(Debug, Clone, PartialEq)]
pub struct WarningUpdate {
    pub threshold_db: f64,

    /// Violation numbers in order, `1, 2, ...`.
    pub violations: Vec<u64>,

    /// Fully rendered warning text for display.
    pub message: String,
}

/// Events pushed to the presentation layer. Within one tick the order is
/// `Series`, then `Interval` and `Warning` when a window closed, then
/// `Scale`.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayUpdate {
    Series(LoudnessSample),
    Interval(IntervalAverage),
    Warning(WarningUpdate),
    Scale(crate::scale::IntensityBand),
    Status(String),
}

/// Sample loop lifecycle. `Stopped` is terminal; there is no restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Stopped,
}

impl Default for LoopState {
    fn default() -> Self {
        Self::Idle
    }
}
