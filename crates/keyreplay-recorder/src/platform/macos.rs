//! macOS backend: CGEventTap capture and CGEvent replay
//!
//! The tap is listen-only and lives on its own thread with its own run loop,
//! so the coordination thread never services OS callbacks.

use crate::error::{CaptureError, PostError};
use crate::events::{InputEvent, Modifiers, MouseButton};
use crate::hook::{EventPoster, HookRegistration, HookSink, InputHookProvider, PermissionStatus};
use crossbeam_channel::{bounded, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::debug;

use cidre::cg::event::access as cg_access;
use cidre::{ax, cf, cg};

// Raw FFI for CGEventPost (not exposed by cidre)
#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGEventPost(tap: u32, event: *const std::ffi::c_void);
}

const HID_EVENT_TAP: u32 = 0;

/// Run loop slice between stop-flag checks, in seconds
const RUN_LOOP_SLICE: f64 = 0.05;

/// Post an event to the system
fn post_event(event: &cg::Event, location: u32) {
    unsafe {
        CGEventPost(location, event as *const _ as *const std::ffi::c_void);
    }
}

#[derive(Debug, Default)]
pub struct NativeInput;

impl NativeInput {
    pub fn new() -> Self {
        Self
    }
}

impl InputHookProvider for NativeInput {
    fn check_permissions(&self) -> PermissionStatus {
        PermissionStatus {
            accessibility: ax::is_process_trusted(),
            input_monitoring: cg_access::listen_preflight(),
        }
    }

    fn request_permissions(&self) -> PermissionStatus {
        PermissionStatus {
            accessibility: ax::is_process_trusted_with_prompt(true),
            input_monitoring: cg_access::listen_request(),
        }
    }

    fn install(&self, sink: HookSink) -> Result<Box<dyn HookRegistration>, CaptureError> {
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = bounded(1);

        let stop1 = stop.clone();
        let thread = thread::Builder::new()
            .name("event-tap".into())
            .spawn(move || run_event_tap(sink, stop1, ready_tx))
            .map_err(|e| CaptureError::InstallFailed(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(TapRegistration { stop, thread: Some(thread) })),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(CaptureError::InstallFailed("event tap thread exited early".into()))
            }
        }
    }
}

impl EventPoster for NativeInput {
    fn post(&self, event: &InputEvent) -> Result<(), PostError> {
        match *event {
            InputEvent::KeyDown { code, m } => {
                let mut evt = cg::Event::keyboard(None, code, true)
                    .ok_or_else(|| PostError::new(*event, "CGEventCreateKeyboardEvent returned null"))?;
                evt.set_flags(cg::EventFlags(m.to_cg_flags()));
                post_event(&evt, HID_EVENT_TAP);
            }
            InputEvent::MouseDown { button, x, y } => {
                let (event_type, btn) = match button {
                    MouseButton::Left => (cg::EventType::LEFT_MOUSE_DOWN, cg::MouseButton::Left),
                    MouseButton::Right => (cg::EventType::RIGHT_MOUSE_DOWN, cg::MouseButton::Right),
                };
                let evt = cg::Event::mouse(None, event_type, cg::Point { x, y }, btn)
                    .ok_or_else(|| PostError::new(*event, "CGEventCreateMouseEvent returned null"))?;
                post_event(&evt, HID_EVENT_TAP);
            }
        }
        Ok(())
    }
}

// ============================================================================
// Event Tap Thread
// ============================================================================

struct TapRegistration {
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl HookRegistration for TapRegistration {
    fn remove(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(t) = self.thread.take() {
            let _ = t.join();
            debug!("event tap thread joined");
        }
    }
}

impl Drop for TapRegistration {
    fn drop(&mut self) {
        self.remove();
    }
}

struct TapState {
    sink: HookSink,
}

fn run_event_tap(sink: HookSink, stop: Arc<AtomicBool>, ready: Sender<Result<(), CaptureError>>) {
    let mask = cg::EventType::KEY_DOWN.mask()
        | cg::EventType::LEFT_MOUSE_DOWN.mask()
        | cg::EventType::RIGHT_MOUSE_DOWN.mask();

    let state = Box::into_raw(Box::new(TapState { sink }));
    // SAFETY: `state` is only freed once the tap and its run loop source are gone
    let free_state = || drop(unsafe { Box::from_raw(state) });

    let tap = cg::EventTap::new(
        cg::EventTapLocation::Session,
        cg::EventTapPlacement::TailAppend,
        cg::EventTapOpts::LISTEN_ONLY,
        mask,
        tap_callback,
        state,
    );

    let Some(tap) = tap else {
        free_state();
        let _ = ready.send(Err(CaptureError::InstallFailed(
            "CGEventTapCreate returned null (is Input Monitoring granted?)".into(),
        )));
        return;
    };

    let Some(src) = cf::MachPort::run_loop_src(&tap, 0) else {
        drop(tap);
        free_state();
        let _ = ready.send(Err(CaptureError::InstallFailed("Failed to create run loop source".into())));
        return;
    };

    let rl = cf::RunLoop::current();
    rl.add_src(&src, cf::RunLoopMode::default());
    let _ = ready.send(Ok(()));

    while !stop.load(Ordering::Relaxed) {
        cf::RunLoop::run_in_mode(cf::RunLoopMode::default(), RUN_LOOP_SLICE, true);
    }

    rl.remove_src(&src, cf::RunLoopMode::default());
    drop(src);
    drop(tap);
    free_state();
}

extern "C" fn tap_callback(
    _proxy: *mut cg::EventTapProxy,
    event_type: cg::EventType,
    event: &mut cg::Event,
    user_info: *mut TapState,
) -> Option<&cg::Event> {
    let state = unsafe { &*user_info };
    if let Some(input) = to_input_event(event_type, event) {
        (state.sink)(input);
    }
    // Listen-only: always pass the event through untouched
    Some(event)
}

/// Copy the fields we replay out of the OS event
fn to_input_event(event_type: cg::EventType, event: &cg::Event) -> Option<InputEvent> {
    match event_type {
        cg::EventType::KEY_DOWN => {
            let code = event.field_i64(cg::EventField::KEYBOARD_EVENT_KEYCODE) as u16;
            let m = Modifiers::from_cg_flags(event.flags().0);
            Some(InputEvent::KeyDown { code, m })
        }
        cg::EventType::LEFT_MOUSE_DOWN | cg::EventType::RIGHT_MOUSE_DOWN => {
            let button = if event_type == cg::EventType::LEFT_MOUSE_DOWN {
                MouseButton::Left
            } else {
                MouseButton::Right
            };
            let loc = event.location();
            Some(InputEvent::MouseDown { button, x: loc.x, y: loc.y })
        }
        _ => None,
    }
}
