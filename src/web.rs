//! JavaScript surface: `new Loop(dt, onUpdate, onRender)` backed by
//! `requestAnimationFrame` and `performance.now()`.

use js_sys::Function;
use wasm_bindgen::prelude::wasm_bindgen;
use wasm_bindgen::JsValue;

use crate::config::LoopConfig;
use crate::error::LoopError;
use crate::frame_loop::SteppedClock;
use crate::observer::StepObserver;
use crate::schedule::AnimationFrameScheduler;
use crate::time::PerformanceClock;

struct JsObserver {
    on_update: Function,
    on_render: Function,
}

impl StepObserver for JsObserver {
    fn on_update(&mut self, frame: u64, elapsed: f64) {
        let frame = JsValue::from_f64(frame as f64);
        if let Err(e) = self.on_update.call2(&JsValue::NULL, &frame, &JsValue::from_f64(elapsed)) {
            tracing::error!("update callback threw: {e:?}");
        }
    }

    fn on_render(&mut self, alpha: f64) {
        if let Err(e) = self.on_render.call1(&JsValue::NULL, &JsValue::from_f64(alpha)) {
            tracing::error!("render callback threw: {e:?}");
        }
    }
}

fn js_error(err: LoopError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Fixed timestep loop for the browser.
#[wasm_bindgen(js_name = Loop)]
pub struct WebLoop {
    clock: SteppedClock,
}

#[wasm_bindgen(js_class = Loop)]
impl WebLoop {
    /// `dt` is the step in milliseconds; missing or unusable values fall
    /// back to 1000/60.
    #[wasm_bindgen(constructor)]
    pub fn new(dt: Option<f64>, on_update: Function, on_render: Function) -> Result<WebLoop, JsValue> {
        let config = LoopConfig::or_default(dt);
        let time = PerformanceClock::new().map_err(js_error)?;
        let scheduler = AnimationFrameScheduler::new().map_err(js_error)?;
        let clock = SteppedClock::new(config, time, scheduler, JsObserver { on_update, on_render });
        Ok(WebLoop { clock })
    }

    pub fn init(&self) {
        self.clock.initialize();
    }

    pub fn reset(&self) {
        self.clock.reset();
    }

    pub fn start(&self) {
        self.clock.start();
    }

    pub fn pause(&self) {
        self.clock.pause();
    }

    pub fn stop(&self) {
        self.clock.stop();
    }

    #[wasm_bindgen(getter)]
    pub fn running(&self) -> bool {
        self.clock.running()
    }

    #[wasm_bindgen(getter)]
    pub fn frame(&self) -> f64 {
        self.clock.frame_count() as f64
    }

    #[wasm_bindgen(getter = timeElapsed)]
    pub fn time_elapsed(&self) -> f64 {
        self.clock.elapsed_total()
    }

    #[wasm_bindgen(getter)]
    pub fn accumulator(&self) -> f64 {
        self.clock.accumulator()
    }

    #[wasm_bindgen(getter)]
    pub fn dt(&self) -> f64 {
        self.clock.dt()
    }

    /// Stall threshold, `undefined` before `init()`.
    #[wasm_bindgen(getter = maxDiff)]
    pub fn max_diff(&self) -> Option<f64> {
        self.clock.max_frame_delta()
    }

    #[wasm_bindgen(getter)]
    pub fn now(&self) -> f64 {
        self.clock.last_sampled_time()
    }
}
