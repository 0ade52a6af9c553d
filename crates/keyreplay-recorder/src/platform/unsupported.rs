//! Fallback backend for targets without a native implementation
//!
//! Reports missing permissions and fails every install and post, so the
//! session surfaces a clear error instead of silently recording nothing.

use crate::error::{CaptureError, PostError};
use crate::events::InputEvent;
use crate::hook::{EventPoster, HookRegistration, HookSink, InputHookProvider, PermissionStatus};

const REASON: &str = "global input capture is only implemented on macOS";

#[derive(Debug, Default)]
pub struct NativeInput;

impl NativeInput {
    pub fn new() -> Self {
        Self
    }
}

impl InputHookProvider for NativeInput {
    fn check_permissions(&self) -> PermissionStatus {
        PermissionStatus { accessibility: false, input_monitoring: false }
    }

    fn request_permissions(&self) -> PermissionStatus {
        self.check_permissions()
    }

    fn install(&self, _sink: HookSink) -> Result<Box<dyn HookRegistration>, CaptureError> {
        Err(CaptureError::InstallFailed(REASON.to_string()))
    }
}

impl EventPoster for NativeInput {
    fn post(&self, event: &InputEvent) -> Result<(), PostError> {
        Err(PostError::new(*event, REASON))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn everything_fails_cleanly() {
        let input = NativeInput::new();
        assert!(!input.check_permissions().all_granted());
        assert!(matches!(input.install(Arc::new(|_: InputEvent| {})), Err(CaptureError::InstallFailed(_))));
        assert!(input.post(&InputEvent::key(0)).is_err());
    }
}
