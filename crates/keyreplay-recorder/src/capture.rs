//! Input capture: turns hook notifications into timestamped records

use crate::clock::Clock;
use crate::error::CaptureError;
use crate::events::{EventRecord, InputEvent};
use crate::hook::{HookRegistration, HookSink, InputHookProvider};
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

pub struct InputCapture {
    provider: Arc<dyn InputHookProvider>,
    clock: Arc<dyn Clock>,
    reserved_keys: [u16; 2],
}

impl InputCapture {
    /// `reserved_keys` are the control hotkeys; they are never recorded.
    pub fn new(provider: Arc<dyn InputHookProvider>, clock: Arc<dyn Clock>, reserved_keys: [u16; 2]) -> Self {
        Self { provider, clock, reserved_keys }
    }

    /// Install the hook. Records are timestamped relative to `origin` and sent to `tx`.
    pub fn start(&self, origin: Duration, tx: Sender<EventRecord>) -> Result<CaptureHandle, CaptureError> {
        if !self.provider.check_permissions().input_monitoring {
            return Err(CaptureError::PermissionDenied);
        }

        let active = Arc::new(AtomicBool::new(true));
        let sink = self.sink(origin, tx, active.clone());

        match self.provider.install(sink) {
            Ok(hook) => {
                debug!("capture hook installed");
                Ok(CaptureHandle { active, hook: Some(hook) })
            }
            Err(e) => {
                error!("capture hook install failed: {}", e);
                Err(e)
            }
        }
    }

    fn sink(&self, origin: Duration, tx: Sender<EventRecord>, active: Arc<AtomicBool>) -> HookSink {
        let clock = self.clock.clone();
        let reserved = self.reserved_keys;
        Arc::new(move |event: InputEvent| {
            if !active.load(Ordering::Acquire) {
                return;
            }
            if event.key_code().is_some_and(|code| reserved.contains(&code)) {
                return;
            }
            let t = clock.now().saturating_sub(origin).as_secs_f64();
            // Receiver gone means the buffer was cleared; nothing to do
            let _ = tx.send(EventRecord::new(event, t));
        })
    }
}

/// Owns a live hook. Dropping it stops capture.
pub struct CaptureHandle {
    active: Arc<AtomicBool>,
    hook: Option<Box<dyn HookRegistration>>,
}

impl CaptureHandle {
    /// Disable the hook and release it. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(mut hook) = self.hook.take() {
            hook.remove();
            debug!("capture hook removed");
        }
    }

    pub fn is_running(&self) -> bool {
        self.hook.is_some()
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{key_codes, MouseButton};
    use crate::testing::{FakeInput, VirtualClock};
    use crossbeam_channel::unbounded;

    fn capture(fake: &FakeInput, clock: &Arc<VirtualClock>) -> InputCapture {
        InputCapture::new(Arc::new(fake.clone()), clock.clone(), [key_codes::F12, key_codes::F11])
    }

    #[test]
    fn records_arrive_in_order_with_relative_timestamps() {
        let clock = Arc::new(VirtualClock::new());
        clock.set(Duration::from_secs(10));
        let fake = FakeInput::new();
        let (tx, rx) = unbounded();

        let mut handle = capture(&fake, &clock).start(clock.now(), tx).unwrap();
        let times = [0.0, 0.25, 0.5, 1.75];
        for (i, t) in times.iter().enumerate() {
            clock.set(Duration::from_secs(10) + Duration::from_secs_f64(*t));
            assert!(fake.emit(InputEvent::key(i as u16)));
        }
        handle.stop();

        let got: Vec<_> = rx.try_iter().collect();
        assert_eq!(got.len(), times.len());
        for (i, (rec, t)) in got.iter().zip(times).enumerate() {
            assert_eq!(rec.event.key_code(), Some(i as u16));
            assert!((rec.t - t).abs() < 1e-9);
        }
    }

    #[test]
    fn reserved_keys_are_never_recorded() {
        let clock = Arc::new(VirtualClock::new());
        let fake = FakeInput::new();
        let (tx, rx) = unbounded();

        let _handle = capture(&fake, &clock).start(clock.now(), tx).unwrap();
        fake.emit(InputEvent::key(key_codes::F12));
        fake.emit(InputEvent::key(4));
        fake.emit(InputEvent::key(key_codes::F11));
        fake.emit(InputEvent::click(MouseButton::Right, 3.0, 4.0));
        fake.emit(InputEvent::key(key_codes::F12));

        let got: Vec<_> = rx.try_iter().map(|r| r.event).collect();
        assert_eq!(got, vec![InputEvent::key(4), InputEvent::click(MouseButton::Right, 3.0, 4.0)]);
    }

    #[test]
    fn permission_denied_skips_install() {
        let clock = Arc::new(VirtualClock::new());
        let fake = FakeInput::new();
        fake.set_permission(false);
        let (tx, _rx) = unbounded();

        let err = capture(&fake, &clock).start(clock.now(), tx).err();
        assert_eq!(err, Some(CaptureError::PermissionDenied));
        assert_eq!(fake.install_count(), 0);
    }

    #[test]
    fn install_failure_is_reported() {
        let clock = Arc::new(VirtualClock::new());
        let fake = FakeInput::new();
        fake.fail_install("tap creation returned null");
        let (tx, _rx) = unbounded();

        let err = capture(&fake, &clock).start(clock.now(), tx).err();
        assert_eq!(err, Some(CaptureError::InstallFailed("tap creation returned null".into())));
        assert!(!fake.is_installed());
    }

    #[test]
    fn stop_is_idempotent_and_detaches_hook() {
        let clock = Arc::new(VirtualClock::new());
        let fake = FakeInput::new();
        let (tx, rx) = unbounded();

        let mut handle = capture(&fake, &clock).start(clock.now(), tx).unwrap();
        assert!(handle.is_running());
        handle.stop();
        handle.stop();
        assert!(!handle.is_running());
        assert!(!fake.is_installed());
        assert!(!fake.emit(InputEvent::key(1)));
        assert_eq!(rx.try_iter().count(), 0);
    }

    #[test]
    fn drop_removes_hook() {
        let clock = Arc::new(VirtualClock::new());
        let fake = FakeInput::new();
        let (tx, _rx) = unbounded();
        {
            let _handle = capture(&fake, &clock).start(clock.now(), tx).unwrap();
            assert!(fake.is_installed());
        }
        assert!(!fake.is_installed());
    }
}
