use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc::Sender;

/// Receiver of the loop's two notifications.
pub trait StepObserver {
    /// One fixed step of simulated time has been consumed.
    fn on_update(&mut self, frame: u64, elapsed: f64);

    /// One display frame, with the interpolation fraction in `[0, 1)`.
    fn on_render(&mut self, alpha: f64);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Notification {
    Update { frame: u64, elapsed: f64 },
    Render { alpha: f64 },
}

impl Notification {
    pub fn is_update(&self) -> bool {
        matches!(self, Notification::Update { .. })
    }

    pub fn is_render(&self) -> bool {
        matches!(self, Notification::Render { .. })
    }
}

/// Records every notification. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct NotificationLog {
    entries: Rc<RefCell<Vec<Notification>>>,
}

impl NotificationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<Notification> {
        self.entries.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn updates(&self) -> usize {
        self.entries.borrow().iter().filter(|n| n.is_update()).count()
    }

    pub fn renders(&self) -> usize {
        self.entries.borrow().iter().filter(|n| n.is_render()).count()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

impl StepObserver for NotificationLog {
    fn on_update(&mut self, frame: u64, elapsed: f64) {
        self.entries.borrow_mut().push(Notification::Update { frame, elapsed });
    }

    fn on_render(&mut self, alpha: f64) {
        self.entries.borrow_mut().push(Notification::Render { alpha });
    }
}

/// Closure pair observer, see [`observer_fn`].
pub struct FnObserver<U, R> {
    update: U,
    render: R,
}

pub fn observer_fn<U, R>(update: U, render: R) -> FnObserver<U, R>
where
    U: FnMut(u64, f64),
    R: FnMut(f64),
{
    FnObserver { update, render }
}

impl<U, R> StepObserver for FnObserver<U, R>
where
    U: FnMut(u64, f64),
    R: FnMut(f64),
{
    fn on_update(&mut self, frame: u64, elapsed: f64) {
        (self.update)(frame, elapsed);
    }

    fn on_render(&mut self, alpha: f64) {
        (self.render)(alpha);
    }
}

/// Forwards notifications over a channel. A disconnected receiver is ignored.
impl StepObserver for Sender<Notification> {
    fn on_update(&mut self, frame: u64, elapsed: f64) {
        let _ = self.send(Notification::Update { frame, elapsed });
    }

    fn on_render(&mut self, alpha: f64) {
        let _ = self.send(Notification::Render { alpha });
    }
}
