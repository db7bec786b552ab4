use std::cell::{Cell, RefCell};
use std::env;
use std::rc::Rc;
use std::sync::Arc;

use winit::{
    application::ApplicationHandler,
    event::*,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use steploop::{
    logging, observer_fn, FrameCallback, FrameScheduler, LoopConfig, LoopPhase, LoopResult, SteppedClock,
    SystemClock,
};

/// Env var overriding the step interval, in milliseconds.
const STEP_ENV: &str = "STEPLOOP_STEP_MS";

/// Runs frame callbacks on the window's `RedrawRequested`.
struct RedrawScheduler {
    window: Arc<Window>,
    due: Rc<RefCell<Vec<FrameCallback>>>,
}

impl FrameScheduler for RedrawScheduler {
    fn request_frame(&self, callback: FrameCallback) -> LoopResult<()> {
        self.due.borrow_mut().push(callback);
        self.window.request_redraw();
        Ok(())
    }
}

#[derive(Default)]
struct Stats {
    updates: Cell<u64>,
    alpha: Cell<f64>,
    next_report: Cell<f64>,
}

fn step_from_env() -> Option<f64> {
    let raw = env::var(STEP_ENV).ok()?;
    match raw.trim().parse::<f64>() {
        Ok(step) => Some(step),
        Err(_) => {
            tracing::warn!("ignoring {STEP_ENV}={raw:?}, not a number");
            None
        }
    }
}

fn update_title(window: &Window, clock: &SteppedClock, stats: &Stats) {
    let phase = match clock.phase() {
        LoopPhase::Running => "running",
        LoopPhase::Paused => "paused",
        LoopPhase::Stopped => "stopped",
    };
    window.set_title(&format!(
        "steploop [{phase}] frames {} | updates {} | sim {:.1}s | alpha {:.2}",
        clock.frame_count(),
        stats.updates.get(),
        clock.elapsed_total() / 1000.0,
        stats.alpha.get(),
    ));
}

/// Window plus the loop ticking on its redraws. Built on `resumed`.
struct Running {
    window: Arc<Window>,
    clock: SteppedClock,
}

struct App {
    config: LoopConfig,
    due: Rc<RefCell<Vec<FrameCallback>>>,
    stats: Rc<Stats>,
    running: Option<Running>,
}

impl App {
    fn new(config: LoopConfig) -> Self {
        Self {
            config,
            due: Rc::new(RefCell::new(Vec::new())),
            stats: Rc::new(Stats::default()),
            running: None,
        }
    }

    fn launch(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let attrs = Window::default_attributes()
            .with_title("steploop")
            .with_inner_size(winit::dpi::LogicalSize::new(640, 200));
        let window = Arc::new(event_loop.create_window(attrs)?);

        let observer = {
            let on_update = self.stats.clone();
            let on_render = self.stats.clone();
            observer_fn(
                move |frame, elapsed| {
                    on_update.updates.set(on_update.updates.get() + 1);
                    if elapsed >= on_update.next_report.get() {
                        on_update.next_report.set(elapsed + 1000.0);
                        tracing::info!(frame, updates = on_update.updates.get(), elapsed_ms = elapsed, "tick");
                    }
                },
                move |alpha| on_render.alpha.set(alpha),
            )
        };
        let scheduler = RedrawScheduler {
            window: window.clone(),
            due: self.due.clone(),
        };
        let clock = SteppedClock::new(self.config, SystemClock::new(), scheduler, observer);
        clock.initialize();
        clock.start();

        self.running = Some(Running { window, clock });
        Ok(())
    }

    fn handle_key(&self, code: KeyCode) {
        let Some(Running { window, clock }) = &self.running else {
            return;
        };
        match code {
            KeyCode::Space if clock.running() => clock.pause(),
            KeyCode::Space => clock.start(),
            KeyCode::KeyS => {
                clock.stop();
                self.stats.updates.set(0);
                self.stats.next_report.set(0.0);
            }
            KeyCode::KeyR => {
                clock.stop();
                self.stats.updates.set(0);
                self.stats.next_report.set(0.0);
                clock.start();
            }
            _ => {}
        }
        update_title(window, clock, &self.stats);
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() {
            return;
        }
        if let Err(e) = self.launch(event_loop) {
            tracing::error!("failed to create window: {e:#}");
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(running) = &self.running else {
            return;
        };
        if window_id != running.window.id() {
            return;
        }
        match event {
            WindowEvent::CloseRequested => {
                running.clock.stop();
                event_loop.exit();
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        state: ElementState::Pressed,
                        physical_key: PhysicalKey::Code(code),
                        repeat: false,
                        ..
                    },
                ..
            } => self.handle_key(code),
            WindowEvent::RedrawRequested => {
                let callbacks: Vec<FrameCallback> = self.due.borrow_mut().drain(..).collect();
                for callback in callbacks {
                    callback();
                }
                update_title(&running.window, &running.clock, &self.stats);
            }
            _ => {}
        }
    }
}

fn main() -> anyhow::Result<()> {
    logging::init();

    let config = LoopConfig::or_default(step_from_env());
    tracing::info!(step_ms = config.step_interval(), "space: pause/resume, s: stop, r: restart");

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}
