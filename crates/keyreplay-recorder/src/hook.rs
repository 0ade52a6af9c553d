//! Capability interfaces over the OS input stream
//!
//! The engine never talks to the OS directly. A platform backend (or a fake
//! in tests) implements [`InputHookProvider`] for observing input and
//! [`EventPoster`] for synthesizing it.

use crate::error::{CaptureError, PostError};
use crate::events::InputEvent;
use serde::Serialize;
use std::sync::Arc;

/// Called once per observed key-down / mouse-down, on the OS delivery thread.
///
/// Implementations must return quickly and must not block.
pub type HookSink = Arc<dyn Fn(InputEvent) + Send + Sync>;

/// Permission status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PermissionStatus {
    pub accessibility: bool,
    pub input_monitoring: bool,
}

impl PermissionStatus {
    pub fn all_granted(&self) -> bool {
        self.accessibility && self.input_monitoring
    }
}

/// A live hook. Removing it releases every OS resource it holds.
pub trait HookRegistration: Send {
    /// Disable and remove the hook. Calling this twice is a no-op.
    fn remove(&mut self);
}

pub trait InputHookProvider: Send + Sync {
    /// Cheap probe, never prompts the user
    fn check_permissions(&self) -> PermissionStatus;

    /// Probe and ask the OS to prompt for anything missing
    fn request_permissions(&self) -> PermissionStatus;

    /// Install a listen-only hook that forwards events to `sink` until removed.
    ///
    /// The hook observes; it never suppresses or modifies events.
    fn install(&self, sink: HookSink) -> Result<Box<dyn HookRegistration>, CaptureError>;
}

pub trait EventPoster: Send + Sync {
    /// Synthesize `event` and post it to the OS input stream
    fn post(&self, event: &InputEvent) -> Result<(), PostError>;
}
