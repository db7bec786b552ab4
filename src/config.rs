use crate::error::{LoopError, LoopResult};

/// Default fixed step: one 60 Hz tick, in milliseconds.
pub const DEFAULT_STEP_MS: f64 = 1000.0 / 60.0;

/// A single frame delta larger than this many steps is treated as a stall.
pub const MAX_DELTA_STEPS: f64 = 5.0;

/// Loop configuration. The step interval is fixed for the lifetime of a clock.
///
/// Only built through [`new`](Self::new), [`or_default`](Self::or_default)
/// or `Default`, so the step is always positive and finite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopConfig {
    step_interval: f64,
}

impl LoopConfig {
    /// Strict constructor: rejects zero, negative and non-finite steps.
    pub fn new(step_interval: f64) -> LoopResult<Self> {
        if step_interval.is_finite() && step_interval > 0.0 {
            Ok(Self { step_interval })
        } else {
            Err(LoopError::InvalidStepInterval(step_interval))
        }
    }

    /// Lenient constructor for host bindings: anything unusable falls back to
    /// [`DEFAULT_STEP_MS`].
    pub fn or_default(step_interval: Option<f64>) -> Self {
        match step_interval {
            None => Self::default(),
            Some(step) => Self::new(step).unwrap_or_else(|err| {
                tracing::warn!("{err}, using default of {DEFAULT_STEP_MS:.3}ms");
                Self::default()
            }),
        }
    }

    pub fn step_interval(&self) -> f64 {
        self.step_interval
    }

    /// Upper bound on a single observed frame delta.
    pub fn max_frame_delta(&self) -> f64 {
        self.step_interval * MAX_DELTA_STEPS
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            step_interval: DEFAULT_STEP_MS,
        }
    }
}
