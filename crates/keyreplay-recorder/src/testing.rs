//! Test doubles: a virtual clock and an in-memory input backend
//!
//! `FakeInput` stands in for the OS: tests call [`FakeInput::emit`] to
//! simulate event delivery, flip permission results, and inspect what a
//! replay posted.

use crate::clock::{CancelToken, Clock};
use crate::error::{CaptureError, PostError};
use crate::events::InputEvent;
use crate::hook::{EventPoster, HookRegistration, HookSink, InputHookProvider, PermissionStatus};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Clock whose sleeps complete instantly by advancing virtual time
#[derive(Debug, Default)]
pub struct VirtualClock {
    now: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, now: Duration) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    /// Every sleep requested so far, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }

    fn sleep(&self, duration: Duration, cancel: &CancelToken) {
        if cancel.is_cancelled() {
            return;
        }
        self.sleeps.lock().push(duration);
        self.advance(duration);
    }
}

/// A posted event and the clock reading at the time it was posted
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Posted {
    pub at: Duration,
    pub event: InputEvent,
}

#[derive(Default)]
struct FakeState {
    sink: Mutex<Option<HookSink>>,
    install_error: Mutex<Option<String>>,
    denied: AtomicBool,
    installs: AtomicUsize,
    attempts: AtomicUsize,
    failing_posts: Mutex<HashSet<usize>>,
    posted: Mutex<Vec<Posted>>,
    clock: Mutex<Option<Arc<dyn Clock>>>,
    on_post: Mutex<Option<Box<dyn FnMut(usize) + Send>>>,
}

/// In-memory input backend. Clones share state.
#[derive(Clone, Default)]
pub struct FakeInput {
    state: Arc<FakeState>,
}

impl FakeInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp posted events with readings from `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let fake = Self::new();
        *fake.state.clock.lock() = Some(clock);
        fake
    }

    pub fn set_permission(&self, granted: bool) {
        self.state.denied.store(!granted, Ordering::SeqCst);
    }

    /// Make the next installs fail with `reason`
    pub fn fail_install(&self, reason: impl Into<String>) {
        *self.state.install_error.lock() = Some(reason.into());
    }

    pub fn clear_install_failure(&self) {
        self.state.install_error.lock().take();
    }

    /// Make the post attempt with this zero-based index fail
    pub fn fail_post(&self, attempt: usize) {
        self.state.failing_posts.lock().insert(attempt);
    }

    /// Run `f` with the zero-based attempt index after every post attempt
    pub fn on_post(&self, f: impl FnMut(usize) + Send + 'static) {
        *self.state.on_post.lock() = Some(Box::new(f));
    }

    /// Deliver an event as the OS would. Returns `false` if no hook is installed.
    pub fn emit(&self, event: InputEvent) -> bool {
        let sink = self.state.sink.lock().clone();
        match sink {
            Some(sink) => {
                sink(event);
                true
            }
            None => false,
        }
    }

    pub fn is_installed(&self) -> bool {
        self.state.sink.lock().is_some()
    }

    pub fn install_count(&self) -> usize {
        self.state.installs.load(Ordering::SeqCst)
    }

    pub fn posted(&self) -> Vec<Posted> {
        self.state.posted.lock().clone()
    }

    pub fn posted_events(&self) -> Vec<InputEvent> {
        self.state.posted.lock().iter().map(|p| p.event).collect()
    }
}

struct FakeRegistration {
    state: Arc<FakeState>,
    removed: bool,
}

impl HookRegistration for FakeRegistration {
    fn remove(&mut self) {
        if !self.removed {
            self.removed = true;
            self.state.sink.lock().take();
        }
    }
}

impl InputHookProvider for FakeInput {
    fn check_permissions(&self) -> PermissionStatus {
        let granted = !self.state.denied.load(Ordering::SeqCst);
        PermissionStatus { accessibility: granted, input_monitoring: granted }
    }

    fn request_permissions(&self) -> PermissionStatus {
        self.check_permissions()
    }

    fn install(&self, sink: HookSink) -> Result<Box<dyn HookRegistration>, CaptureError> {
        if let Some(reason) = self.state.install_error.lock().clone() {
            return Err(CaptureError::InstallFailed(reason));
        }
        *self.state.sink.lock() = Some(sink);
        self.state.installs.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeRegistration { state: self.state.clone(), removed: false }))
    }
}

impl EventPoster for FakeInput {
    fn post(&self, event: &InputEvent) -> Result<(), PostError> {
        let attempt = self.state.attempts.fetch_add(1, Ordering::SeqCst);
        let result = if self.state.failing_posts.lock().contains(&attempt) {
            Err(PostError::new(*event, "injected failure"))
        } else {
            let at = self.state.clock.lock().as_ref().map(|c| c.now()).unwrap_or_default();
            self.state.posted.lock().push(Posted { at, event: *event });
            Ok(())
        };
        if let Some(f) = self.state.on_post.lock().as_mut() {
            f(attempt);
        }
        result
    }
}
