//! Fixed timestep loop: deterministic `update` ticks at a constant step,
//! one `render` per display frame with an interpolation fraction.

pub mod logging;

pub mod clock;
pub mod config;
pub mod error;
pub mod frame_loop;
pub mod observer;
pub mod schedule;
pub mod time;

#[cfg(target_arch = "wasm32")]
pub mod web;

pub use clock::{ClockState, FrameReport, LoopPhase};
pub use config::{LoopConfig, DEFAULT_STEP_MS, MAX_DELTA_STEPS};
pub use error::{LoopError, LoopResult};
pub use frame_loop::{SteppedClock, WeakClock};
pub use observer::{observer_fn, FnObserver, Notification, NotificationLog, StepObserver};
pub use schedule::{FrameCallback, FrameScheduler, ManualScheduler};
pub use time::{ManualClock, TimeSource};

#[cfg(not(target_arch = "wasm32"))]
pub use time::SystemClock;

#[cfg(target_arch = "wasm32")]
pub use schedule::AnimationFrameScheduler;
#[cfg(target_arch = "wasm32")]
pub use time::PerformanceClock;

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen::prelude::wasm_bindgen(start)]
pub fn wasm_start() {
    logging::init();
}
