use thiserror::Error;

/// Failures of the host capabilities around the loop.
///
/// The loop's own control operations never fail; these only surface when
/// building a config or a platform scheduler/time source, or when a
/// scheduler refuses a frame request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoopError {
    #[error("step interval must be a positive, finite number of milliseconds (got {0})")]
    InvalidStepInterval(f64),

    #[error("no global window available")]
    NoWindow,

    #[error("window.performance is not available")]
    NoPerformance,

    #[error("frame request failed: {0}")]
    Schedule(String),
}

pub type LoopResult<T> = Result<T, LoopError>;
