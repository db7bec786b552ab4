use std::cell::Cell;
use std::rc::Rc;

/// Source of "now", in milliseconds. Must not run backwards in normal use.
pub trait TimeSource {
    fn now(&self) -> f64;
}

impl<T: TimeSource + ?Sized> TimeSource for Rc<T> {
    fn now(&self) -> f64 {
        (**self).now()
    }
}

/// Hand-driven time, shared between clones. Used by tests and by hosts that
/// feed their own timestamps.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn set(&self, now: f64) {
        self.now.set(now);
    }

    pub fn advance(&self, ms: f64) {
        self.now.set(self.now.get() + ms);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> f64 {
        self.now.get()
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use native::SystemClock;

#[cfg(target_arch = "wasm32")]
pub use web::PerformanceClock;

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use super::TimeSource;
    use std::time::Instant;

    /// Monotonic milliseconds since the clock was created.
    #[derive(Debug, Clone, Copy)]
    pub struct SystemClock {
        origin: Instant,
    }

    impl SystemClock {
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
            }
        }
    }

    impl Default for SystemClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TimeSource for SystemClock {
        fn now(&self) -> f64 {
            self.origin.elapsed().as_secs_f64() * 1000.0
        }
    }
}

#[cfg(target_arch = "wasm32")]
mod web {
    use super::TimeSource;
    use crate::error::{LoopError, LoopResult};
    use web_sys::Performance;

    /// `performance.now()` of the global window.
    pub struct PerformanceClock {
        performance: Performance,
    }

    impl PerformanceClock {
        pub fn new() -> LoopResult<Self> {
            let window = web_sys::window().ok_or(LoopError::NoWindow)?;
            let performance = window.performance().ok_or(LoopError::NoPerformance)?;
            Ok(Self { performance })
        }
    }

    impl TimeSource for PerformanceClock {
        fn now(&self) -> f64 {
            self.performance.now()
        }
    }
}
