use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::clock::{ClockState, FrameReport, LoopPhase};
use crate::config::LoopConfig;
use crate::observer::StepObserver;
use crate::schedule::{FrameCallback, FrameScheduler};
use crate::time::TimeSource;

/// Fixed timestep loop driven by a frame scheduler.
///
/// Each display frame feeds the real time since the previous one into an
/// accumulator, emits one `on_update` per whole step drained from it and
/// one `on_render` with the leftover fraction. Clones share the same loop.
///
/// Single-threaded: the scheduler, the time source and the observer are all
/// called on the thread that owns the clock.
#[derive(Clone)]
pub struct SteppedClock {
    inner: Rc<Inner>,
}

/// Non-owning handle, for observers that need to control their own loop.
#[derive(Clone)]
pub struct WeakClock {
    inner: Weak<Inner>,
}

impl WeakClock {
    pub fn upgrade(&self) -> Option<SteppedClock> {
        self.inner.upgrade().map(|inner| SteppedClock { inner })
    }
}

struct Inner {
    state: RefCell<ClockState>,
    time: Box<dyn TimeSource>,
    scheduler: Box<dyn FrameScheduler>,
    observer: RefCell<Box<dyn StepObserver>>,
    /// Bumped whenever a callback chain must die (pause, stop, initialize, start).
    epoch: Cell<u64>,
    /// Bumped whenever the counters are zeroed (stop, reset, initialize).
    generation: Cell<u64>,
    dispatching: Cell<bool>,
    frame_callback: RefCell<Option<FrameCallback>>,
}

impl SteppedClock {
    /// Builds an idle clock. Call [`initialize`](Self::initialize) before
    /// starting it; until then frame deltas are not clamped.
    pub fn new(
        config: LoopConfig,
        time: impl TimeSource + 'static,
        scheduler: impl FrameScheduler + 'static,
        observer: impl StepObserver + 'static,
    ) -> Self {
        Self {
            inner: Rc::new(Inner {
                state: RefCell::new(ClockState::new(config)),
                time: Box::new(time),
                scheduler: Box::new(scheduler),
                observer: RefCell::new(Box::new(observer)),
                epoch: Cell::new(0),
                generation: Cell::new(0),
                dispatching: Cell::new(false),
                frame_callback: RefCell::new(None),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakClock {
        WeakClock {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Derives the stall clamp and resets all counters. Halts the loop if it
    /// was running.
    pub fn initialize(&self) {
        self.inner.halt_chain();
        self.inner.bump_generation();
        self.inner.state.borrow_mut().initialize();
        tracing::debug!(
            step_ms = self.step_interval(),
            max_frame_delta_ms = self.max_frame_delta(),
            "loop initialized"
        );
    }

    /// Zeroes every counter and halts the loop. Emits nothing.
    pub fn reset(&self) {
        self.inner.halt_chain();
        self.inner.bump_generation();
        self.inner.state.borrow_mut().reset();
    }

    /// Starts (or resumes) ticking.
    ///
    /// Runs one frame immediately, then keeps requesting frames while
    /// running. Calling it on a running loop does nothing.
    pub fn start(&self) {
        let inner = &self.inner;
        if inner.state.borrow().running() {
            tracing::debug!("start ignored, loop already running");
            return;
        }
        if inner.state.borrow().max_frame_delta().is_none() {
            tracing::warn!("starting an uninitialized loop, frame deltas will not be clamped");
        }

        let epoch = inner.epoch.get().wrapping_add(1);
        inner.epoch.set(epoch);

        let now = inner.time.now();
        inner.state.borrow_mut().begin(now);

        let weak = Rc::downgrade(inner);
        let callback: FrameCallback = Rc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.run_frame(epoch);
            }
        });
        *inner.frame_callback.borrow_mut() = Some(callback);

        tracing::debug!(now, pending_delta = self.pending_delta(), "loop started");

        if inner.dispatching.get() {
            // Started from inside a notification: the observer is busy, so
            // the first frame waits for the next refresh.
            inner.request_next();
        } else {
            inner.run_frame(epoch);
        }
    }

    /// Freezes the loop, remembering the delta since the last frame so a
    /// later `start` resumes without counting the paused time.
    ///
    /// Does nothing when the loop is not running; in particular the
    /// remembered delta is left as it was.
    pub fn pause(&self) {
        let now = self.inner.time.now();
        let suspended = self.inner.state.borrow_mut().suspend(now);
        if suspended {
            self.inner.halt_chain();
            tracing::debug!(now, pending_delta = self.pending_delta(), "loop paused");
        } else {
            tracing::debug!("pause ignored, loop not running");
        }
    }

    /// Halts the loop and resets all counters.
    pub fn stop(&self) {
        self.inner.halt_chain();
        self.inner.bump_generation();
        self.inner.state.borrow_mut().reset();
        tracing::debug!("loop stopped");
    }

    pub fn running(&self) -> bool {
        self.inner.state.borrow().running()
    }

    pub fn phase(&self) -> LoopPhase {
        self.inner.state.borrow().phase()
    }

    pub fn frame_count(&self) -> u64 {
        self.inner.state.borrow().frame_count()
    }

    pub fn elapsed_total(&self) -> f64 {
        self.inner.state.borrow().elapsed_total()
    }

    pub fn accumulator(&self) -> f64 {
        self.inner.state.borrow().accumulator()
    }

    pub fn alpha(&self) -> f64 {
        self.inner.state.borrow().alpha()
    }

    pub fn step_interval(&self) -> f64 {
        self.inner.state.borrow().step_interval()
    }

    /// Alias of [`step_interval`](Self::step_interval).
    pub fn dt(&self) -> f64 {
        self.step_interval()
    }

    pub fn max_frame_delta(&self) -> Option<f64> {
        self.inner.state.borrow().max_frame_delta()
    }

    pub fn last_sampled_time(&self) -> f64 {
        self.inner.state.borrow().last_sampled()
    }

    pub fn pending_delta(&self) -> f64 {
        self.inner.state.borrow().pending_delta()
    }

    /// Copy of the current timing state.
    pub fn state(&self) -> ClockState {
        self.inner.state.borrow().clone()
    }
}

impl fmt::Debug for SteppedClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SteppedClock")
            .field("state", &*self.inner.state.borrow())
            .field("epoch", &self.inner.epoch.get())
            .finish()
    }
}

impl Inner {
    /// Invalidates every callback already handed to the scheduler.
    fn halt_chain(&self) {
        self.epoch.set(self.epoch.get().wrapping_add(1));
        self.frame_callback.borrow_mut().take();
    }

    fn bump_generation(&self) {
        self.generation.set(self.generation.get().wrapping_add(1));
    }

    fn is_live(&self, epoch: u64) -> bool {
        self.epoch.get() == epoch && self.state.borrow().running()
    }

    fn run_frame(&self, epoch: u64) {
        if self.epoch.get() != epoch {
            tracing::trace!(epoch, "stale frame callback ignored");
            return;
        }

        let now = self.time.now();
        let report = self.state.borrow_mut().advance(now);
        let Some(report) = report else {
            return;
        };
        tracing::trace!(
            frame = report.frame,
            delta = report.delta,
            steps = report.steps,
            alpha = report.alpha,
            "frame"
        );

        self.dispatch(&report);

        if self.is_live(epoch) {
            self.request_next();
        }
    }

    /// Delivers every step the frame drained, then its render. A pause
    /// from the observer only takes effect at the next frame; a stop or
    /// reset zeroes the counters, so the rest of the frame is dropped.
    fn dispatch(&self, report: &FrameReport) {
        let Ok(mut observer) = self.observer.try_borrow_mut() else {
            tracing::warn!(frame = report.frame, "observer busy, frame notifications dropped");
            return;
        };
        self.dispatching.set(true);

        let generation = self.generation.get();
        let mut intact = true;
        for _ in 0..report.steps {
            observer.on_update(report.frame, report.elapsed);
            intact = self.generation.get() == generation;
            if !intact {
                break;
            }
        }
        if intact {
            observer.on_render(report.alpha);
        }

        self.dispatching.set(false);
    }

    fn request_next(&self) {
        let callback = self.frame_callback.borrow().clone();
        let Some(callback) = callback else {
            return;
        };
        if let Err(err) = self.scheduler.request_frame(callback) {
            tracing::error!(%err, "could not schedule next frame, halting loop");
            let now = self.time.now();
            self.state.borrow_mut().suspend(now);
            self.halt_chain();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LoopError, LoopResult};
    use crate::observer::{observer_fn, Notification, NotificationLog};
    use crate::schedule::ManualScheduler;
    use crate::time::ManualClock;

    const STEP: f64 = 1000.0 / 60.0;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    struct Harness {
        clock: SteppedClock,
        time: ManualClock,
        frames: ManualScheduler,
        log: NotificationLog,
    }

    impl Harness {
        fn new(step: f64) -> Self {
            let time = ManualClock::new(1000.0);
            let frames = ManualScheduler::new();
            let log = NotificationLog::new();
            let clock = SteppedClock::new(
                LoopConfig::new(step).unwrap(),
                time.clone(),
                frames.clone(),
                log.clone(),
            );
            clock.initialize();
            Self { clock, time, frames, log }
        }

        /// Lets `ms` pass, then delivers one display refresh.
        fn tick(&self, ms: f64) {
            self.time.advance(ms);
            self.frames.run_frame();
        }
    }

    struct RefusingScheduler;

    impl FrameScheduler for RefusingScheduler {
        fn request_frame(&self, _callback: FrameCallback) -> LoopResult<()> {
            Err(LoopError::Schedule("refused".into()))
        }
    }

    #[test]
    fn test_initialized_clock_is_idle() {
        let h = Harness::new(STEP);
        assert_eq!(h.clock.max_frame_delta(), Some(5.0 * STEP));
        assert!(!h.clock.running());
        assert_eq!(h.clock.phase(), LoopPhase::Stopped);
        assert_eq!(h.clock.frame_count(), 0);
        assert_eq!(h.clock.elapsed_total(), 0.0);
        assert_eq!(h.clock.accumulator(), 0.0);
        assert_eq!(h.clock.dt(), STEP);
        assert_eq!(h.frames.pending(), 0);
        assert!(h.log.is_empty());
    }

    #[test]
    fn test_start_runs_first_frame_inline() {
        let h = Harness::new(STEP);
        h.clock.start();
        assert!(h.clock.running());
        assert_eq!(h.clock.phase(), LoopPhase::Running);
        assert_eq!(h.clock.frame_count(), 1);
        assert_eq!(h.clock.last_sampled_time(), 1000.0);
        assert_eq!(h.log.snapshot(), vec![Notification::Render { alpha: 0.0 }]);
        assert_eq!(h.frames.pending(), 1);
    }

    #[test]
    fn test_three_sixteen_ms_frames() {
        let h = Harness::new(STEP);
        h.clock.start();
        for _ in 0..3 {
            h.tick(16.0);
        }

        assert_eq!(h.log.updates(), 2);
        assert_eq!(h.log.renders(), 4);
        assert_eq!(h.clock.frame_count(), 4);
        assert!(approx(h.clock.elapsed_total(), 48.0));
        assert!(approx(h.clock.accumulator(), 48.0 - 2.0 * STEP));

        let updates: Vec<_> = h.log.snapshot().into_iter().filter(|n| n.is_update()).collect();
        assert_eq!(
            updates,
            vec![
                Notification::Update { frame: 3, elapsed: 32.0 },
                Notification::Update { frame: 4, elapsed: 48.0 },
            ]
        );
    }

    #[test]
    fn test_long_frame_drains_several_steps_then_renders() {
        let h = Harness::new(10.0);
        h.clock.start();
        h.log.clear();
        h.tick(35.0);

        let update = Notification::Update { frame: 2, elapsed: 35.0 };
        assert_eq!(
            h.log.snapshot(),
            vec![update, update, update, Notification::Render { alpha: 0.5 }]
        );
    }

    #[test]
    fn test_render_alpha_tracks_accumulator() {
        let h = Harness::new(STEP);
        h.clock.start();
        for delta in [5.0, 12.0, 16.7, 30.0, 1.0, 70.0] {
            h.tick(delta);
            let last = *h.log.snapshot().last().unwrap();
            match last {
                Notification::Render { alpha } => {
                    assert!((0.0..1.0).contains(&alpha));
                    assert!(approx(alpha, h.clock.accumulator() / STEP));
                }
                other => panic!("frame must end with a render, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_stall_is_discarded() {
        let h = Harness::new(STEP);
        h.clock.start();
        h.tick(10.0);
        h.log.clear();

        h.tick(500.0);
        assert_eq!(h.log.updates(), 0);
        assert_eq!(h.log.renders(), 1);
        assert_eq!(h.clock.frame_count(), 3);
        assert!(approx(h.clock.elapsed_total(), 10.0));

        // Normal ticking continues from the new baseline
        h.tick(10.0);
        assert_eq!(h.log.updates(), 1);
        assert!(approx(h.clock.elapsed_total(), 20.0));
    }

    #[test]
    fn test_pause_freezes_counters() {
        let h = Harness::new(STEP);
        h.clock.start();
        h.tick(16.0);
        h.tick(16.0);
        h.clock.pause();
        assert!(!h.clock.running());
        assert_eq!(h.clock.phase(), LoopPhase::Paused);

        let frozen = (h.clock.frame_count(), h.clock.elapsed_total(), h.log.len());
        // The callback already in flight fires and does nothing
        assert_eq!(h.frames.pending(), 1);
        h.tick(150.0);
        h.tick(150.0);
        assert_eq!(h.frames.pending(), 0);
        assert_eq!((h.clock.frame_count(), h.clock.elapsed_total(), h.log.len()), frozen);
    }

    #[test]
    fn test_resume_does_not_jump() {
        let h = Harness::new(10.0);
        h.clock.start();
        h.tick(10.0);
        h.time.advance(4.0);
        h.clock.pause();
        assert_eq!(h.clock.pending_delta(), 4.0);

        h.time.advance(10_000.0);
        h.clock.start();
        // Inline frame replays the 4ms captured at pause
        assert_eq!(h.clock.frame_count(), 3);
        assert!(approx(h.clock.elapsed_total(), 14.0));

        h.tick(10.0);
        assert_eq!(h.clock.frame_count(), 4);
        assert!(approx(h.clock.elapsed_total(), 24.0));
        assert_eq!(h.log.updates(), 2);
    }

    #[test]
    fn test_pause_when_not_running_keeps_pending_delta() {
        let h = Harness::new(10.0);
        // Before any start
        h.time.advance(50.0);
        h.clock.pause();
        assert_eq!(h.clock.pending_delta(), 0.0);

        h.clock.start();
        h.time.advance(3.0);
        h.clock.pause();
        assert_eq!(h.clock.pending_delta(), 3.0);

        // Repeated pauses do not grow the remembered delta
        h.time.advance(500.0);
        h.clock.pause();
        h.time.advance(500.0);
        h.clock.pause();
        assert_eq!(h.clock.pending_delta(), 3.0);
    }

    #[test]
    fn test_stop_resets_and_stays_reset() {
        let h = Harness::new(STEP);
        h.clock.start();
        h.tick(20.0);
        h.tick(20.0);
        h.clock.stop();

        assert!(!h.clock.running());
        assert_eq!(h.clock.phase(), LoopPhase::Stopped);
        assert_eq!(h.clock.last_sampled_time(), 0.0);
        assert_eq!(h.clock.frame_count(), 0);
        assert_eq!(h.clock.elapsed_total(), 0.0);
        assert_eq!(h.clock.accumulator(), 0.0);

        let emitted = h.log.len();
        h.tick(20.0);
        h.tick(20.0);
        assert_eq!(h.clock.frame_count(), 0);
        assert_eq!(h.clock.elapsed_total(), 0.0);
        assert_eq!(h.clock.last_sampled_time(), 0.0);
        assert_eq!(h.log.len(), emitted);
    }

    #[test]
    fn test_restart_after_stop() {
        let h = Harness::new(10.0);
        h.clock.start();
        h.tick(25.0);
        h.clock.stop();
        h.frames.run_frame();

        h.clock.start();
        assert_eq!(h.clock.frame_count(), 1);
        h.tick(12.0);
        assert_eq!(h.clock.frame_count(), 2);
        assert!(approx(h.clock.elapsed_total(), 12.0));
        assert_eq!(h.frames.pending(), 1);
    }

    #[test]
    fn test_start_twice_keeps_single_chain() {
        let h = Harness::new(STEP);
        h.clock.start();
        h.clock.start();
        assert_eq!(h.clock.frame_count(), 1);
        assert_eq!(h.frames.pending(), 1);
    }

    #[test]
    fn test_quick_pause_start_keeps_single_chain() {
        let h = Harness::new(STEP);
        h.clock.start();
        h.clock.pause();
        h.clock.start();
        // Old in-flight callback plus the new one
        assert_eq!(h.frames.pending(), 2);

        h.tick(16.0);
        assert_eq!(h.clock.frame_count(), 3);
        assert_eq!(h.frames.pending(), 1);
    }

    #[test]
    fn test_initialize_halts_running_loop() {
        let h = Harness::new(STEP);
        h.clock.start();
        h.tick(30.0);
        h.clock.initialize();
        assert!(!h.clock.running());
        assert_eq!(h.clock.frame_count(), 0);
        h.tick(30.0);
        assert_eq!(h.clock.frame_count(), 0);
    }

    #[test]
    fn test_observer_can_stop_its_loop() {
        let time = ManualClock::new(0.0);
        let frames = ManualScheduler::new();
        let handle: Rc<RefCell<Option<WeakClock>>> = Rc::new(RefCell::new(None));
        let updates = Rc::new(Cell::new(0));
        let renders = Rc::new(Cell::new(0));

        let observer = {
            let handle = handle.clone();
            let updates = updates.clone();
            let renders = renders.clone();
            observer_fn(
                move |_, _| {
                    updates.set(updates.get() + 1);
                    if let Some(clock) = handle.borrow().as_ref().and_then(WeakClock::upgrade) {
                        clock.stop();
                    }
                },
                move |_| renders.set(renders.get() + 1),
            )
        };
        let clock = SteppedClock::new(LoopConfig::new(10.0).unwrap(), time.clone(), frames.clone(), observer);
        *handle.borrow_mut() = Some(clock.downgrade());
        clock.initialize();
        clock.start();
        assert_eq!(renders.get(), 1);

        time.advance(35.0);
        frames.run_frame();
        assert_eq!(updates.get(), 1);
        assert_eq!(renders.get(), 1);
        assert!(!clock.running());
        assert_eq!(clock.frame_count(), 0);
        assert_eq!(frames.pending(), 0);
    }

    #[test]
    fn test_observer_restart_defers_first_frame() {
        let time = ManualClock::new(0.0);
        let frames = ManualScheduler::new();
        let handle: Rc<RefCell<Option<WeakClock>>> = Rc::new(RefCell::new(None));
        let log = NotificationLog::new();

        let observer = {
            let handle = handle.clone();
            let restarted = Cell::new(false);
            let mut on_update = log.clone();
            let mut on_render = log.clone();
            observer_fn(
                move |frame, elapsed| {
                    on_update.on_update(frame, elapsed);
                    if restarted.replace(true) {
                        return;
                    }
                    if let Some(clock) = handle.borrow().as_ref().and_then(WeakClock::upgrade) {
                        clock.pause();
                        clock.start();
                    }
                },
                move |alpha| on_render.on_render(alpha),
            )
        };
        let clock = SteppedClock::new(LoopConfig::new(10.0).unwrap(), time.clone(), frames.clone(), observer);
        *handle.borrow_mut() = Some(clock.downgrade());
        clock.initialize();
        clock.start();

        time.advance(25.0);
        frames.run_frame();
        assert!(clock.running());
        assert_eq!(clock.frame_count(), 2);
        assert_eq!(frames.pending(), 1);
        // The frame that restarted still delivers both of its steps
        assert_eq!(log.updates(), 2);
        assert_eq!(log.renders(), 2);
    }

    #[test]
    fn test_observer_pause_keeps_frame_steps() {
        let time = ManualClock::new(0.0);
        let frames = ManualScheduler::new();
        let handle: Rc<RefCell<Option<WeakClock>>> = Rc::new(RefCell::new(None));
        let updates = Rc::new(Cell::new(0u64));
        let renders = Rc::new(Cell::new(0u64));

        let observer = {
            let handle = handle.clone();
            let updates = updates.clone();
            let renders = renders.clone();
            observer_fn(
                move |_, _| {
                    updates.set(updates.get() + 1);
                    if updates.get() == 1 {
                        if let Some(clock) = handle.borrow().as_ref().and_then(WeakClock::upgrade) {
                            clock.pause();
                        }
                    }
                },
                move |_| renders.set(renders.get() + 1),
            )
        };
        let step = 10.0;
        let clock = SteppedClock::new(LoopConfig::new(step).unwrap(), time.clone(), frames.clone(), observer);
        *handle.borrow_mut() = Some(clock.downgrade());
        clock.initialize();
        clock.start();

        // 35ms frame drains three steps; the pause on the first one waits
        // for the next frame
        time.advance(35.0);
        frames.run_frame();
        assert!(!clock.running());
        assert_eq!(updates.get(), 3);
        assert_eq!(renders.get(), 2);
        assert_eq!(frames.pending(), 0);

        time.advance(100.0);
        clock.start();
        time.advance(10.0);
        frames.run_frame();

        assert!(approx(clock.elapsed_total(), 45.0));
        assert_eq!(updates.get(), (clock.elapsed_total() / step).floor() as u64);
        assert!(clock.accumulator() >= 0.0 && clock.accumulator() < step);
    }

    #[test]
    fn test_schedule_failure_halts_loop() {
        let clock = SteppedClock::new(
            LoopConfig::default(),
            ManualClock::new(0.0),
            RefusingScheduler,
            NotificationLog::new(),
        );
        clock.initialize();
        clock.start();
        assert!(!clock.running());
        assert_eq!(clock.frame_count(), 1);
        assert_eq!(clock.phase(), LoopPhase::Paused);
    }

    #[test]
    fn test_dropped_clock_ends_chain() {
        let h = Harness::new(STEP);
        h.clock.start();
        let Harness { clock, time, frames, log } = h;
        drop(clock);
        time.advance(20.0);
        assert_eq!(frames.run_frame(), 1);
        assert_eq!(log.len(), 1);
        assert_eq!(frames.pending(), 0);
    }
}
