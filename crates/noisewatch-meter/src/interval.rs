use crate::types::{IntervalAverage, LoudnessSample};

/// The single active accumulation window.
#[derive(Debug)]
struct IntervalWindow {
    index: u64,
    accumulated: Vec<f64>,
    window_start: f64,
}

/// Folds loudness samples into fixed-duration interval averages.
///
/// Windows are measured by the elapsed time carried on the samples, not by
/// sample count, so a window holds however many readings the actual cadence
/// produced.
pub struct IntervalAggregator {
    window_secs: f64,
    window: IntervalWindow,
}

impl IntervalAggregator {
    pub fn new(window_secs: f64) -> Self {
        Self {
            window_secs,
            window: IntervalWindow {
                index: 0,
                accumulated: Vec::new(),
                window_start: 0.0,
            },
        }
    }

    /// Feed one sample. Returns the closed window's average once the window
    /// duration has elapsed since its start; the triggering sample is part
    /// of the window it closes.
    pub fn push(&mut self, sample: LoudnessSample) -> Option<IntervalAverage> {
        self.window.accumulated.push(sample.value_db);

        if sample.timestamp - self.window.window_start < self.window_secs {
            return None;
        }

        // The append above precedes the boundary check, so the buffer holds
        // at least one value here. Should it ever be empty the window
        // extends instead of closing.
        let mean_db = mean(&self.window.accumulated)?;
        let average = IntervalAverage {
            index: self.window.index,
            mean_db,
        };

        self.window.accumulated.clear();
        self.window.window_start = sample.timestamp;
        self.window.index += 1;

        Some(average)
    }

    /// Readings buffered in the open window.
    pub fn pending(&self) -> usize {
        self.window.accumulated.len()
    }

    /// Index the next emitted average will carry.
    pub fn current_index(&self) -> u64 {
        self.window.index
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}
