//! Structured errors
//!
//! Every error carries a stable [`ErrorCode`] so front-ends can render or
//! serialize failures without parsing messages.

use crate::events::InputEvent;
use serde::Serialize;
use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    PermissionDenied,
    InstallFailed,
    PostFailed,
    SpawnFailed,
}

/// Failure to install the capture hook
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("Input Monitoring permission is required. Enable it in System Settings > Privacy & Security > Input Monitoring, then try again.")]
    PermissionDenied,

    #[error("Failed to install event tap: {0}")]
    InstallFailed(String),
}

impl CaptureError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::PermissionDenied => ErrorCode::PermissionDenied,
            Self::InstallFailed(_) => ErrorCode::InstallFailed,
        }
    }
}

/// A single synthesized event could not be posted
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Failed to post {event}: {reason}")]
pub struct PostError {
    pub event: InputEvent,
    pub reason: String,
}

impl PostError {
    pub fn new(event: InputEvent, reason: impl Into<String>) -> Self {
        Self { event, reason: reason.into() }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Post(#[from] PostError),

    /// A countdown or replay worker thread could not be started
    #[error("Failed to start {worker} thread: {reason}")]
    Spawn { worker: &'static str, reason: String },
}

impl Error {
    pub fn spawn(worker: &'static str, err: io::Error) -> Self {
        Self::Spawn { worker, reason: err.to_string() }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Capture(e) => e.code(),
            Self::Post(_) => ErrorCode::PostFailed,
            Self::Spawn { .. } => ErrorCode::SpawnFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::PermissionDenied).unwrap();
        assert_eq!(json, "\"PERMISSION_DENIED\"");
    }

    #[test]
    fn wrapped_errors_keep_their_code() {
        let e: Error = CaptureError::InstallFailed("no run loop source".into()).into();
        assert_eq!(e.code(), ErrorCode::InstallFailed);
        assert_eq!(e.to_string(), "Failed to install event tap: no run loop source");

        let e: Error = PostError::new(InputEvent::key(0), "event creation failed").into();
        assert_eq!(e.code(), ErrorCode::PostFailed);
    }

    #[test]
    fn spawn_failures_have_their_own_code() {
        let e = Error::spawn("replay", io::Error::new(io::ErrorKind::WouldBlock, "thread limit reached"));
        assert_eq!(e.code(), ErrorCode::SpawnFailed);
        assert_eq!(e.to_string(), "Failed to start replay thread: thread limit reached");
        assert_eq!(serde_json::to_string(&e.code()).unwrap(), "\"SPAWN_FAILED\"");
    }
}
