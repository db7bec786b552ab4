use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::error::LoopResult;

/// Callback handed to a scheduler. Bound once per `start()` and requested
/// again every frame.
pub type FrameCallback = Rc<dyn Fn()>;

/// "Run this once at the next display refresh". Single-shot: the callback
/// must be requested again to keep ticking.
pub trait FrameScheduler {
    fn request_frame(&self, callback: FrameCallback) -> LoopResult<()>;
}

impl<T: FrameScheduler + ?Sized> FrameScheduler for Rc<T> {
    fn request_frame(&self, callback: FrameCallback) -> LoopResult<()> {
        (**self).request_frame(callback)
    }
}

/// Queue of pending frame callbacks, flushed by the host.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    queue: Rc<RefCell<VecDeque<FrameCallback>>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of callbacks waiting for the next refresh.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Simulates one display refresh: runs every callback requested before
    /// this call. Callbacks requested while running wait for the next one.
    pub fn run_frame(&self) -> usize {
        let batch: Vec<FrameCallback> = self.queue.borrow_mut().drain(..).collect();
        for callback in &batch {
            callback();
        }
        batch.len()
    }
}

impl FrameScheduler for ManualScheduler {
    fn request_frame(&self, callback: FrameCallback) -> LoopResult<()> {
        self.queue.borrow_mut().push_back(callback);
        Ok(())
    }
}

#[cfg(target_arch = "wasm32")]
pub use web::AnimationFrameScheduler;

#[cfg(target_arch = "wasm32")]
mod web {
    use super::{FrameCallback, FrameScheduler};
    use crate::error::{LoopError, LoopResult};
    use wasm_bindgen::closure::Closure;
    use wasm_bindgen::JsCast;
    use web_sys::Window;

    /// Schedules through `window.requestAnimationFrame`.
    pub struct AnimationFrameScheduler {
        window: Window,
    }

    impl AnimationFrameScheduler {
        pub fn new() -> LoopResult<Self> {
            let window = web_sys::window().ok_or(LoopError::NoWindow)?;
            Ok(Self { window })
        }
    }

    impl FrameScheduler for AnimationFrameScheduler {
        fn request_frame(&self, callback: FrameCallback) -> LoopResult<()> {
            // One-shot closure; wasm-bindgen frees it after the call
            let js_callback = Closure::once_into_js(move || callback());
            self.window
                .request_animation_frame(js_callback.unchecked_ref())
                .map(|_| ())
                .map_err(|e| LoopError::Schedule(format!("{e:?}")))
        }
    }
}
