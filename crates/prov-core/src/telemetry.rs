//! Metric names and per-step meters
//!
//! Metrics are emitted through the `metrics` facade; exporting them is left
//! to whichever recorder the host process installs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Gauge: error counter of one reset step, labelled by `step`
pub const RESET_STEP_ERRORS: &str = "provisioning_reset_step_errors";
/// Gauge: duration of the last execution of one reset step, labelled by `step`
pub const RESET_STEP_ELAPSED_MS: &str = "provisioning_reset_step_elapsed_ms";
/// Gauge: sum of all reset step error counters
pub const RESET_TOTAL_ERRORS: &str = "provisioning_reset_total_errors";
/// Gauge: duration of the last reset run
pub const RESET_TOTAL_ELAPSED_MS: &str = "provisioning_reset_total_elapsed_ms";
/// Counter: documents that could not be loaded
pub const LOAD_ERRORS: &str = "provisioning_load_errors_total";
/// Counter: completed provisioning runs, labelled by `outcome`
pub const RUNS: &str = "provisioning_runs_total";

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Error counter and timing of one step
///
/// The error counter is incremented on failure and zeroed on success, so a
/// non-zero value means the last execution of the step failed.
#[derive(Debug)]
pub struct StepMeter {
    step: &'static str,
    errors: AtomicU64,
    elapsed_ms: AtomicU64,
}

impl StepMeter {
    #[must_use]
    pub fn new(step: &'static str) -> Self {
        Self {
            step,
            errors: AtomicU64::new(0),
            elapsed_ms: AtomicU64::new(0),
        }
    }

    #[inline]
    #[must_use]
    pub fn step(&self) -> &'static str {
        self.step
    }

    pub fn record_success(&self, elapsed: Duration) {
        self.errors.store(0, Ordering::SeqCst);
        self.record_elapsed(elapsed);
    }

    pub fn record_failure(&self, elapsed: Duration) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        self.record_elapsed(elapsed);
    }

    #[inline]
    #[must_use]
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::SeqCst)
    }

    /// Duration of the last execution in milliseconds
    #[inline]
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms.load(Ordering::SeqCst)
    }

    fn record_elapsed(&self, elapsed: Duration) {
        let ms = millis(elapsed);
        self.elapsed_ms.store(ms, Ordering::SeqCst);
        #[allow(clippy::cast_precision_loss)]
        {
            metrics::gauge!(RESET_STEP_ERRORS, "step" => self.step).set(self.errors() as f64);
            metrics::gauge!(RESET_STEP_ELAPSED_MS, "step" => self.step).set(ms as f64);
        }
    }
}

/// Publish reset totals
#[allow(clippy::cast_precision_loss)]
pub(crate) fn record_reset_totals(total_errors: u64, total_elapsed: Duration) {
    metrics::gauge!(RESET_TOTAL_ERRORS).set(total_errors as f64);
    metrics::gauge!(RESET_TOTAL_ELAPSED_MS).set(millis(total_elapsed) as f64);
}

/// Count a finished provisioning run
pub(crate) fn record_run(outcome: &'static str) {
    metrics::counter!(RUNS, "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_zeroes_errors() {
        let meter = StepMeter::new("kpi");
        meter.record_failure(Duration::from_millis(5));
        meter.record_failure(Duration::from_millis(5));
        assert_eq!(meter.errors(), 2);

        meter.record_success(Duration::from_millis(12));
        assert_eq!(meter.errors(), 0);
        assert_eq!(meter.elapsed_ms(), 12);
    }
}
