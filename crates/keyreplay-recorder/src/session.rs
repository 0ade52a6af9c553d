//! Recorder session - the state machine that owns the recording
//!
//! The session lives on one coordination thread (the UI or CLI loop). Every
//! state transition happens inside a `&mut self` method on that thread.
//! Worker threads (countdown, replay) only post messages to the session
//! inbox, which [`RecorderSession::pump`] applies.
//!
//! ```text
//! Idle --start_recording--> CountingDownToRecord --elapsed--> Recording --stop--> Idle
//! Idle --start_replay-----> CountingDownToReplay --elapsed--> Replaying --cancel/done--> Idle
//! ```

use crate::buffer::RecordingBuffer;
use crate::capture::{CaptureHandle, InputCapture};
use crate::clock::{CancelToken, Clock};
use crate::countdown::{Countdown, CountdownTimer};
use crate::error::{CaptureError, Error, ErrorCode};
use crate::events::{key_codes, EventRecord};
use crate::hook::{EventPoster, InputHookProvider, PermissionStatus};
use crate::replay::{ReplayConfig, ReplayScheduler, ReplayStats, ReplayTask};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SessionState {
    #[default]
    Idle,
    CountingDownToRecord,
    Recording,
    CountingDownToReplay,
    Replaying,
}

/// Everything a front-end needs to render the session
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub is_recording: bool,
    pub is_replaying: bool,
    pub countdown_ticks_remaining: u32,
    pub recorded_event_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error_code: Option<ErrorCode>,
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Countdown ticks before recording or replay begins
    pub countdown_ticks: u32,
    pub tick_interval: Duration,
    /// Control hotkeys excluded from recordings (toggle record, toggle replay)
    pub reserved_keys: [u16; 2],
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            countdown_ticks: 2,
            tick_interval: Duration::from_secs(1),
            reserved_keys: [key_codes::F12, key_codes::F11],
        }
    }
}

enum Message {
    Tick { generation: u64, remaining: u32 },
    ReplayDone { generation: u64, stats: ReplayStats },
}

pub struct RecorderSession {
    config: SessionConfig,
    replay_config: ReplayConfig,
    provider: Arc<dyn InputHookProvider>,
    capture: InputCapture,
    scheduler: ReplayScheduler,
    clock: Arc<dyn Clock>,
    buffer: RecordingBuffer,
    status: SessionStatus,
    capture_handle: Option<CaptureHandle>,
    countdown: Option<Countdown>,
    replay: Option<ReplayTask>,
    /// Bumped per countdown so messages from abandoned workers are dropped
    generation: u64,
    inbox_tx: Sender<Message>,
    inbox: Receiver<Message>,
}

impl RecorderSession {
    pub fn new<B>(backend: Arc<B>, clock: Arc<dyn Clock>, config: SessionConfig) -> Self
    where
        B: InputHookProvider + EventPoster + 'static,
    {
        let provider: Arc<dyn InputHookProvider> = backend.clone();
        let poster: Arc<dyn EventPoster> = backend;
        let (inbox_tx, inbox) = unbounded();

        let mut session = Self {
            capture: InputCapture::new(provider.clone(), clock.clone(), config.reserved_keys),
            scheduler: ReplayScheduler::new(poster, clock.clone()),
            config,
            replay_config: ReplayConfig::default(),
            provider,
            clock,
            buffer: RecordingBuffer::new(),
            status: SessionStatus::default(),
            capture_handle: None,
            countdown: None,
            replay: None,
            generation: 0,
            inbox_tx,
            inbox,
        };
        session.probe_permissions();
        session
    }

    pub fn state(&self) -> SessionState {
        self.status.state
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn recording(&self) -> &[EventRecord] {
        self.buffer.records()
    }

    pub fn replay_config(&self) -> ReplayConfig {
        self.replay_config
    }

    /// Takes effect at the next replay; a running replay keeps its copy
    pub fn set_replay_config(&mut self, config: ReplayConfig) {
        self.replay_config = config;
    }

    /// Check Input Monitoring without prompting. Surfaces an error if missing.
    pub fn probe_permissions(&mut self) -> PermissionStatus {
        let perms = self.provider.check_permissions();
        if !perms.input_monitoring {
            self.fail(&CaptureError::PermissionDenied.into());
        }
        perms
    }

    pub fn request_permissions(&self) -> PermissionStatus {
        self.provider.request_permissions()
    }

    // ========================================================================
    // Commands
    // ========================================================================

    pub fn request_start_recording(&mut self) -> bool {
        if !self.accepts("start recording", SessionState::Idle) {
            return false;
        }
        if !self.probe_permissions().input_monitoring {
            warn!("refusing to record without Input Monitoring permission");
            return false;
        }
        self.start_countdown(SessionState::CountingDownToRecord)
    }

    pub fn request_stop_recording(&mut self) -> bool {
        if !self.accepts("stop recording", SessionState::Recording) {
            return false;
        }
        if let Some(mut handle) = self.capture_handle.take() {
            handle.stop();
        }
        self.drain_buffer();
        self.set_state(SessionState::Idle);
        info!("recording stopped, {} events", self.buffer.len());
        true
    }

    pub fn request_start_replay(&mut self) -> bool {
        if !self.accepts("start replay", SessionState::Idle) {
            return false;
        }
        self.drain_buffer();
        if self.buffer.is_empty() {
            debug!("ignoring start replay: nothing recorded");
            return false;
        }
        self.start_countdown(SessionState::CountingDownToReplay)
    }

    /// Signals the worker and returns to Idle without waiting for it
    pub fn request_cancel_replay(&mut self) -> bool {
        if !self.accepts("cancel replay", SessionState::Replaying) {
            return false;
        }
        if let Some(task) = self.replay.take() {
            task.cancel();
        }
        self.set_state(SessionState::Idle);
        info!("replay cancelled");
        true
    }

    pub fn request_cancel_countdown(&mut self) -> bool {
        match self.status.state {
            SessionState::CountingDownToRecord | SessionState::CountingDownToReplay => {
                self.countdown.take();
                self.status.countdown_ticks_remaining = 0;
                self.set_state(SessionState::Idle);
                true
            }
            _ => false,
        }
    }

    /// Single-button recording control: start when idle, stop when recording
    pub fn toggle_recording(&mut self) -> bool {
        match self.status.state {
            SessionState::Recording => self.request_stop_recording(),
            _ => self.request_start_recording(),
        }
    }

    /// Single-button replay control: start when idle, cancel when replaying
    pub fn toggle_replay(&mut self) -> bool {
        match self.status.state {
            SessionState::Replaying => self.request_cancel_replay(),
            _ => self.request_start_replay(),
        }
    }

    // ========================================================================
    // Message pump
    // ========================================================================

    /// Apply pending worker messages and captured records. Returns `true`
    /// if the status changed.
    pub fn pump(&mut self) -> bool {
        let before = self.status.clone();
        self.drain_buffer();
        while let Ok(msg) = self.inbox.try_recv() {
            self.handle(msg);
        }
        self.status != before
    }

    /// Pump until `done` holds or `timeout` passes. Returns whether `done` held.
    pub fn run_until<F>(&mut self, timeout: Duration, mut done: F) -> bool
    where
        F: FnMut(&SessionStatus) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            self.pump();
            if done(&self.status) {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match self.inbox.recv_timeout(remaining.min(Duration::from_millis(10))) {
                Ok(msg) => self.handle(msg),
                Err(RecvTimeoutError::Timeout) => {}
                // Unreachable while we hold inbox_tx
                Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
    }

    /// Tear down any countdown, capture hook or replay worker
    pub fn shutdown(&mut self) {
        self.countdown.take();
        if let Some(task) = self.replay.take() {
            task.cancel();
        }
        if let Some(mut handle) = self.capture_handle.take() {
            handle.stop();
        }
        self.drain_buffer();
        self.status.countdown_ticks_remaining = 0;
        self.set_state(SessionState::Idle);
    }

    fn handle(&mut self, msg: Message) {
        match msg {
            Message::Tick { generation, remaining } => {
                if generation != self.generation || self.countdown.is_none() {
                    return;
                }
                self.status.countdown_ticks_remaining = remaining;
                if remaining == 0 {
                    self.countdown = None;
                    match self.status.state {
                        SessionState::CountingDownToRecord => self.begin_recording(),
                        SessionState::CountingDownToReplay => self.begin_replay(),
                        _ => {}
                    }
                }
            }
            Message::ReplayDone { generation, stats } => {
                if generation != self.generation || self.status.state != SessionState::Replaying {
                    debug!("dropping stale replay completion");
                    return;
                }
                if let Some(task) = self.replay.take() {
                    task.join();
                }
                info!(
                    "replay finished: {} runs, {} events posted, {} failed",
                    stats.runs_completed, stats.events_posted, stats.post_failures
                );
                self.set_state(SessionState::Idle);
            }
        }
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    fn start_countdown(&mut self, state: SessionState) -> bool {
        self.generation += 1;
        let generation = self.generation;
        let tx = self.inbox_tx.clone();
        let timer = CountdownTimer::new(self.config.countdown_ticks, self.config.tick_interval);

        match timer.start(move |remaining| {
            let _ = tx.send(Message::Tick { generation, remaining });
        }) {
            Ok(countdown) => {
                self.countdown = Some(countdown);
                self.status.countdown_ticks_remaining = timer.ticks();
                self.clear_error();
                self.set_state(state);
                debug!("{:?}: {} ticks", state, timer.ticks());
                true
            }
            Err(e) => {
                self.fail(&e);
                false
            }
        }
    }

    fn begin_recording(&mut self) {
        self.buffer.clear();
        self.status.recorded_event_count = 0;
        let origin = self.clock.now();

        match self.capture.start(origin, self.buffer.sender()) {
            Ok(handle) => {
                self.capture_handle = Some(handle);
                self.clear_error();
                self.set_state(SessionState::Recording);
                info!("recording started");
            }
            Err(e) => {
                self.fail(&Error::from(e));
                self.set_state(SessionState::Idle);
            }
        }
    }

    fn begin_replay(&mut self) {
        self.drain_buffer();
        if self.buffer.is_empty() {
            self.set_state(SessionState::Idle);
            return;
        }

        let events = self.buffer.snapshot();
        let config = self.replay_config.sanitized();
        let generation = self.generation;
        let tx = self.inbox_tx.clone();
        info!(
            "replaying {} events x{} (run delay {}s, extra delay {}s)",
            events.len(),
            config.run_count,
            config.inter_run_delay_secs,
            config.extra_per_event_delay_secs
        );

        let started = self.scheduler.start(events, config, CancelToken::new(), move |stats| {
            let _ = tx.send(Message::ReplayDone { generation, stats });
        });
        match started {
            Ok(task) => {
                self.replay = Some(task);
                self.clear_error();
                self.set_state(SessionState::Replaying);
            }
            Err(e) => {
                self.fail(&e);
                self.set_state(SessionState::Idle);
            }
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn accepts(&self, command: &str, required: SessionState) -> bool {
        if self.status.state == required {
            true
        } else {
            debug!("ignoring {} while {:?}", command, self.status.state);
            false
        }
    }

    fn drain_buffer(&mut self) {
        if self.buffer.drain() > 0 {
            self.status.recorded_event_count = self.buffer.len();
        }
    }

    fn set_state(&mut self, state: SessionState) {
        self.status.state = state;
        self.status.is_recording = state == SessionState::Recording;
        self.status.is_replaying = state == SessionState::Replaying;
    }

    fn set_error(&mut self, code: ErrorCode, message: String) {
        warn!("{}", message);
        self.status.last_error = Some(message);
        self.status.last_error_code = Some(code);
    }

    fn fail(&mut self, err: &Error) {
        self.set_error(err.code(), err.to_string());
    }

    fn clear_error(&mut self) {
        self.status.last_error = None;
        self.status.last_error_code = None;
    }
}

impl Drop for RecorderSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
