//! Captured input events
//!
//! Events are plain values: once captured they no longer reference any OS
//! object, so they stay replayable for as long as the buffer holds them.

use serde::Serialize;
use std::fmt;

/// Virtual key codes (macOS `kVK_*` numbering)
pub mod key_codes {
    pub const F11: u16 = 103;
    pub const F12: u16 = 111;
}

/// Mouse button that went down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
}

/// A synthesizable input event - simple tagged union
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "e")]
pub enum InputEvent {
    /// Key down: keycode, modifiers
    #[serde(rename = "k")]
    KeyDown { code: u16, m: Modifiers },

    /// Mouse button down at screen position
    #[serde(rename = "c")]
    MouseDown { button: MouseButton, x: f64, y: f64 },
}

impl InputEvent {
    pub fn key(code: u16) -> Self {
        Self::KeyDown { code, m: Modifiers::default() }
    }

    pub fn click(button: MouseButton, x: f64, y: f64) -> Self {
        Self::MouseDown { button, x, y }
    }

    /// Keycode for key events, `None` for mouse events
    pub fn key_code(&self) -> Option<u16> {
        match self {
            Self::KeyDown { code, .. } => Some(*code),
            Self::MouseDown { .. } => None,
        }
    }
}

impl fmt::Display for InputEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyDown { code, m } if m.0 != 0 => write!(f, "key {} (mods {:#04x})", code, m.0),
            Self::KeyDown { code, .. } => write!(f, "key {}", code),
            Self::MouseDown { button, x, y } => write!(f, "{:?} click at ({:.0}, {:.0})", button, x, y),
        }
    }
}

/// One captured event plus its offset from the start of the recording
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EventRecord {
    #[serde(flatten)]
    pub event: InputEvent,
    /// Seconds since recording start
    pub t: f64,
}

impl EventRecord {
    pub fn new(event: InputEvent, timestamp_secs: f64) -> Self {
        Self { event, t: timestamp_secs }
    }
}

/// Modifier flags packed into a single byte
/// Bit 0: shift, 1: ctrl, 2: option/alt, 3: command, 4: capslock, 5: fn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Modifiers(pub u8);

impl Modifiers {
    pub const SHIFT: u8 = 1 << 0;
    pub const CTRL: u8 = 1 << 1;
    pub const OPT: u8 = 1 << 2;
    pub const CMD: u8 = 1 << 3;
    pub const CAPS: u8 = 1 << 4;
    pub const FN: u8 = 1 << 5;

    const CG_FLAGS: [(u64, u8); 6] = [
        (0x20000, Self::SHIFT),
        (0x40000, Self::CTRL),
        (0x80000, Self::OPT),
        (0x100000, Self::CMD),
        (0x10000, Self::CAPS),
        (0x800000, Self::FN),
    ];

    pub fn from_cg_flags(flags: u64) -> Self {
        let m = Self::CG_FLAGS
            .iter()
            .filter(|(cg, _)| flags & cg != 0)
            .fold(0u8, |acc, (_, bit)| acc | bit);
        Self(m)
    }

    pub fn to_cg_flags(self) -> u64 {
        Self::CG_FLAGS
            .iter()
            .filter(|(_, bit)| self.0 & bit != 0)
            .fold(0u64, |acc, (cg, _)| acc | cg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifiers_survive_cg_flag_conversion() {
        let m = Modifiers(Modifiers::SHIFT | Modifiers::CMD | Modifiers::FN);
        let flags = m.to_cg_flags();
        assert_eq!(flags, 0x20000 | 0x100000 | 0x800000);
        assert_eq!(Modifiers::from_cg_flags(flags), m);
    }

    #[test]
    fn unrelated_cg_flags_are_ignored() {
        // 0x100 is a device-dependent bit, not a modifier
        let m = Modifiers::from_cg_flags(0x100 | 0x40000);
        assert_eq!(m, Modifiers(Modifiers::CTRL));
        assert_eq!(m.0 & Modifiers::CMD, 0);
    }

    #[test]
    fn key_code_only_for_keys() {
        assert_eq!(InputEvent::key(key_codes::F12).key_code(), Some(111));
        assert_eq!(InputEvent::click(MouseButton::Left, 1.0, 2.0).key_code(), None);
    }

    #[test]
    fn record_serializes_flat() {
        let r = EventRecord::new(InputEvent::key(4), 0.25);
        let json = serde_json::to_value(r).unwrap();
        assert_eq!(json["e"], "k");
        assert_eq!(json["code"], 4);
        assert_eq!(json["t"], 0.25);
    }
}
