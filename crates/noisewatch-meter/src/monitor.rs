use crate::types::{IntervalAverage, ViolationRecord, WarningUpdate};

const SOLUTIONS: &str = "Improve traffic flow, limit heavy vehicles, promote electric vehicles, increase noise pollution awareness";
const CONSEQUENCES: &str = "Hearing loss, sleep disturbance, cardiovascular issues, mental health problems, impaired learning, premature death";

/// Tracks interval averages against the noise threshold.
///
/// Holds the full average history for the bar chart and the append-only
/// violation history behind the rendered warning. Once a warning has been
/// shown it is never cleared; quiet intervals simply leave it standing.
pub struct ThresholdMonitor {
    threshold_db: f64,
    averages: Vec<IntervalAverage>,
    violations: Vec<ViolationRecord>,
    last_warning: Option<WarningUpdate>,
}

impl ThresholdMonitor {
    pub fn new(threshold_db: f64) -> Self {
        Self {
            threshold_db,
            averages: Vec::new(),
            violations: Vec::new(),
            last_warning: None,
        }
    }

    /// Record one closed interval. Returns a fresh warning snapshot when
    /// the average exceeds the threshold, strictly.
    pub fn observe(&mut self, average: IntervalAverage) -> Option<WarningUpdate> {
        self.averages.push(average);

        if average.mean_db <= self.threshold_db {
            return None;
        }

        let number = self.violations.len() as u64 + 1;
        self.violations.push(ViolationRecord {
            number,
            interval_index: average.index,
        });
        tracing::warn!(
            interval = average.index,
            mean_db = average.mean_db,
            violation = number,
            "Interval average exceeds the noise threshold"
        );

        let warning = WarningUpdate {
            threshold_db: self.threshold_db,
            violations: self.violations.iter().map(|v| v.number).collect(),
            message: self.render_warning(),
        };
        self.last_warning = Some(warning.clone());
        Some(warning)
    }

    fn render_warning(&self) -> String {
        let numbers = self
            .violations
            .iter()
            .map(|v| v.number.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "Warning! The noise level exceeds {}dB in the following intervals: {}\nPossible solutions: {}\nPossible consequences: {}",
            self.threshold_db, numbers, SOLUTIONS, CONSEQUENCES
        )
    }

    /// Every closed interval seen so far, in order.
    pub fn averages(&self) -> &[IntervalAverage] {
        &self.averages
    }

    /// Every threshold crossing so far, in order.
    pub fn violations(&self) -> &[ViolationRecord] {
        &self.violations
    }

    /// Most recent warning, for presenters that attach after a crossing.
    pub fn last_warning(&self) -> Option<&WarningUpdate> {
        self.last_warning.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn average(index: u64, mean_db: f64) -> IntervalAverage {
        IntervalAverage { index, mean_db }
    }

    #[test]
    fn quiet_intervals_record_no_violation() {
        let mut monitor = ThresholdMonitor::new(55.0);
        assert!(monitor.observe(average(0, 50.0)).is_none());
        assert!(monitor.observe(average(1, 12.5)).is_none());

        assert_eq!(monitor.averages().len(), 2);
        assert!(monitor.violations().is_empty());
        assert!(monitor.last_warning().is_none());
    }

    #[test]
    fn threshold_comparison_is_strict() {
        let mut monitor = ThresholdMonitor::new(55.0);
        assert!(monitor.observe(average(0, 55.0)).is_none());
        assert!(monitor.observe(average(1, 55.0001)).is_some());
    }

    #[test]
    fn violation_numbers_count_crossings_not_intervals() {
        let mut monitor = ThresholdMonitor::new(55.0);

        assert!(monitor.observe(average(0, 50.0)).is_none());
        let first = monitor.observe(average(1, 60.0)).expect("first crossing");
        assert_eq!(first.violations, vec![1]);

        let second = monitor.observe(average(2, 70.0)).expect("second crossing");
        assert_eq!(second.violations, vec![1, 2]);

        assert!(monitor.observe(average(3, 40.0)).is_none());

        let records = monitor.violations();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].number, 1);
        assert_eq!(records[0].interval_index, 1);
        assert_eq!(records[1].number, 2);
        assert_eq!(records[1].interval_index, 2);
    }

    #[test]
    fn warning_message_lists_all_violations() {
        let mut monitor = ThresholdMonitor::new(55.0);
        monitor.observe(average(0, 60.0));
        let warning = monitor.observe(average(1, 72.0)).expect("second crossing");

        assert!(warning
            .message
            .starts_with("Warning! The noise level exceeds 55dB in the following intervals: 1, 2\n"));
        assert!(warning.message.contains("Possible solutions: Improve traffic flow"));
        assert!(warning.message.contains("premature death"));
        assert_eq!(warning.threshold_db, 55.0);
    }

    #[test]
    fn quiet_interval_leaves_the_last_warning_standing() {
        let mut monitor = ThresholdMonitor::new(55.0);
        let warning = monitor.observe(average(0, 61.0)).expect("crossing");
        assert!(monitor.observe(average(1, 20.0)).is_none());

        assert_eq!(monitor.last_warning(), Some(&warning));
    }

    #[test]
    fn fractional_thresholds_render_with_their_decimals() {
        let mut monitor = ThresholdMonitor::new(52.5);
        let warning = monitor.observe(average(0, 53.0)).expect("crossing");
        assert!(warning.message.contains("exceeds 52.5dB"));
    }
}
