use crate::config::{LoopConfig, MAX_DELTA_STEPS};

/// Coarse lifecycle phase, derived from the running flag and the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Stopped,
    Running,
    Paused,
}

/// Outcome of one processed display frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    /// Frame counter after this frame was counted.
    pub frame: u64,
    /// Total simulated time after this frame's delta was added.
    pub elapsed: f64,
    /// Delta that actually entered the accumulator (0 when clamped).
    pub delta: f64,
    /// Whether the observed delta was discarded as a stall.
    pub clamped: bool,
    /// Number of fixed steps drained from the accumulator.
    pub steps: u64,
    /// Interpolation fraction in `[0, 1)` after draining.
    pub alpha: f64,
}

/// Timing state of a fixed timestep loop.
///
/// Pure bookkeeping: it never reads a clock or schedules anything, every
/// timestamp is handed in by the caller. `SteppedClock` wraps it with the
/// host capabilities.
#[derive(Debug, Clone)]
pub struct ClockState {
    step_interval: f64,
    max_frame_delta: Option<f64>,
    running: bool,
    last_sampled: f64,
    pending_delta: f64,
    frame_count: u64,
    elapsed_total: f64,
    accumulator: f64,
}

impl ClockState {
    /// Creates a state with zeroed counters. `max_frame_delta` stays unset
    /// until [`initialize`](Self::initialize).
    pub fn new(config: LoopConfig) -> Self {
        Self {
            step_interval: config.step_interval(),
            max_frame_delta: None,
            running: false,
            last_sampled: 0.0,
            pending_delta: 0.0,
            frame_count: 0,
            elapsed_total: 0.0,
            accumulator: 0.0,
        }
    }

    /// Derives the stall clamp from the step and resets every counter.
    pub fn initialize(&mut self) {
        self.max_frame_delta = Some(self.step_interval * MAX_DELTA_STEPS);
        self.reset();
    }

    pub fn reset(&mut self) {
        self.running = false;
        self.last_sampled = 0.0;
        self.pending_delta = 0.0;
        self.frame_count = 0;
        self.elapsed_total = 0.0;
        self.accumulator = 0.0;
    }

    /// Marks the loop running, rewinding the baseline by the delta captured
    /// at pause so the next frame continues where the paused one left off.
    pub fn begin(&mut self, now: f64) {
        self.running = true;
        self.last_sampled = now - self.pending_delta;
    }

    /// Freezes the counters. Returns `false` (and changes nothing) if the
    /// loop was not running.
    pub fn suspend(&mut self, now: f64) -> bool {
        if !self.running {
            return false;
        }
        self.running = false;
        self.pending_delta = now - self.last_sampled;
        true
    }

    /// Processes one display frame sampled at `now`.
    ///
    /// Returns `None` without touching anything when the loop is not
    /// running. Otherwise counts the frame, clamps stalls to zero, feeds the
    /// accumulator and drains it in whole steps.
    pub fn advance(&mut self, now: f64) -> Option<FrameReport> {
        if !self.running {
            return None;
        }

        self.frame_count += 1;

        let raw = now - self.last_sampled;
        self.last_sampled = now;

        let stalled = self.max_frame_delta.is_some_and(|max| raw > max);
        let clamped = stalled || raw < 0.0;
        let delta = if clamped { 0.0 } else { raw };
        if clamped {
            tracing::debug!(raw_delta = raw, frame = self.frame_count, "discarding frame delta");
        }

        self.add(delta);
        let steps = self.drain();

        Some(FrameReport {
            frame: self.frame_count,
            elapsed: self.elapsed_total,
            delta,
            clamped,
            steps,
            alpha: self.alpha(),
        })
    }

    /// Adds `ms` of real time to both the elapsed total and the accumulator.
    pub fn add(&mut self, ms: f64) {
        self.elapsed_total += ms;
        self.accumulator += ms;
    }

    /// Consumes one step from the accumulator if a whole one is available.
    pub fn overflow(&mut self) -> bool {
        if self.accumulator >= self.step_interval {
            self.accumulator -= self.step_interval;
            true
        } else {
            false
        }
    }

    /// Consumes every whole step in the accumulator and returns how many.
    ///
    /// Divides instead of looping so an unclamped burst over a tiny step
    /// stays cheap; the count saturates at `u64::MAX`.
    pub fn drain(&mut self) -> u64 {
        if self.accumulator < self.step_interval {
            return 0;
        }
        let mut steps = (self.accumulator / self.step_interval).floor() as u64;
        self.accumulator -= steps as f64 * self.step_interval;

        // Rounding may leave the remainder a hair outside [0, step)
        if self.accumulator < 0.0 {
            self.accumulator += self.step_interval;
            steps = steps.saturating_sub(1);
        }
        while self.overflow() {
            steps = steps.saturating_add(1);
        }
        steps
    }

    /// Fraction of the next step already accumulated.
    pub fn alpha(&self) -> f64 {
        self.accumulator / self.step_interval
    }

    pub fn phase(&self) -> LoopPhase {
        if self.running {
            LoopPhase::Running
        } else if self.frame_count > 0 || self.elapsed_total > 0.0 {
            LoopPhase::Paused
        } else {
            LoopPhase::Stopped
        }
    }

    pub fn step_interval(&self) -> f64 {
        self.step_interval
    }

    pub fn max_frame_delta(&self) -> Option<f64> {
        self.max_frame_delta
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn last_sampled(&self) -> f64 {
        self.last_sampled
    }

    pub fn pending_delta(&self) -> f64 {
        self.pending_delta
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn elapsed_total(&self) -> f64 {
        self.elapsed_total
    }

    pub fn accumulator(&self) -> f64 {
        self.accumulator
    }
}
