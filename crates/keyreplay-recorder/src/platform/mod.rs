//! Platform backends for capture and replay

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(not(target_os = "macos"))]
pub mod unsupported;

// Re-export the current platform
#[cfg(target_os = "macos")]
pub use macos as current;

#[cfg(not(target_os = "macos"))]
pub use unsupported as current;

pub use current::NativeInput;
