//! keyreplay-recorder - capture global input and replay it with original timing
//!
//! Records key-down and mouse-down events from the OS input stream with
//! their offsets from the start of the recording, then re-posts them on a
//! background thread, optionally repeated as a macro.
//!
//! ## Platform Support
//!
//! - **macOS**: CGEventTap capture, CGEvent replay
//! - **Other targets**: the engine builds and runs against any
//!   [`InputHookProvider`]/[`EventPoster`]; the native backend reports
//!   itself unsupported

pub mod buffer;
pub mod capture;
pub mod clock;
pub mod countdown;
pub mod error;
pub mod events;
pub mod hook;
pub mod platform;
pub mod replay;
pub mod session;

#[cfg(test)]
pub mod testing;

pub use clock::{CancelToken, Clock, SystemClock};
pub use error::{CaptureError, Error, ErrorCode, PostError, Result};
pub use events::*;
pub use hook::{EventPoster, HookRegistration, HookSink, InputHookProvider, PermissionStatus};
pub use platform::NativeInput;
pub use replay::{ReplayConfig, ReplayScheduler, ReplayStats};
pub use session::{RecorderSession, SessionConfig, SessionState, SessionStatus};

pub mod prelude {
    pub use crate::clock::{CancelToken, Clock, SystemClock};
    pub use crate::error::{CaptureError, ErrorCode, PostError};
    pub use crate::events::*;
    pub use crate::hook::{EventPoster, InputHookProvider, PermissionStatus};
    pub use crate::platform::NativeInput;
    pub use crate::replay::{ReplayConfig, ReplayStats};
    pub use crate::session::{RecorderSession, SessionConfig, SessionState, SessionStatus};
}
