//! Replay scheduler: re-posts recorded events with their original spacing
//!
//! Playback runs on its own thread so timing sleeps never block the
//! coordination context. Cancellation is cooperative and checked at every
//! run boundary, before every sleep and before every post.

use crate::clock::{delay_from_secs, CancelToken, Clock};
use crate::error::{Error, Result};
use crate::events::EventRecord;
use crate::hook::EventPoster;
use serde::Serialize;
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

/// Macro replay settings, read by value when a replay starts
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReplayConfig {
    /// How many times the whole recording is played
    pub run_count: u32,
    /// Pause between consecutive runs, in seconds
    pub inter_run_delay_secs: f64,
    /// Added to every inter-event gap, in seconds
    pub extra_per_event_delay_secs: f64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            run_count: 1,
            inter_run_delay_secs: 1.0,
            extra_per_event_delay_secs: 0.0,
        }
    }
}

impl ReplayConfig {
    pub fn with_runs(mut self, run_count: u32) -> Self {
        self.run_count = run_count;
        self
    }

    pub fn with_run_delay(mut self, secs: f64) -> Self {
        self.inter_run_delay_secs = secs;
        self
    }

    pub fn with_extra_delay(mut self, secs: f64) -> Self {
        self.extra_per_event_delay_secs = secs;
        self
    }

    /// Clamp negative or non-finite delays to zero
    pub fn sanitized(self) -> Self {
        fn clamp(name: &str, v: f64) -> f64 {
            if v.is_finite() && v >= 0.0 {
                v
            } else {
                warn!("{} = {} is invalid, using 0", name, v);
                0.0
            }
        }
        Self {
            run_count: self.run_count,
            inter_run_delay_secs: clamp("inter_run_delay_secs", self.inter_run_delay_secs),
            extra_per_event_delay_secs: clamp("extra_per_event_delay_secs", self.extra_per_event_delay_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayStats {
    pub runs_completed: u32,
    pub events_posted: usize,
    pub post_failures: usize,
    pub cancelled: bool,
}

pub struct ReplayScheduler {
    poster: Arc<dyn EventPoster>,
    clock: Arc<dyn Clock>,
}

impl ReplayScheduler {
    pub fn new(poster: Arc<dyn EventPoster>, clock: Arc<dyn Clock>) -> Self {
        Self { poster, clock }
    }

    /// Play on a background thread. `on_done` runs on that thread when
    /// playback finishes or is cancelled.
    pub fn start<F>(
        &self,
        events: Arc<[EventRecord]>,
        config: ReplayConfig,
        cancel: CancelToken,
        on_done: F,
    ) -> Result<ReplayTask>
    where
        F: FnOnce(ReplayStats) + Send + 'static,
    {
        let worker = Self { poster: self.poster.clone(), clock: self.clock.clone() };
        let token = cancel.clone();
        let thread = thread::Builder::new()
            .name("replay".into())
            .spawn(move || {
                let stats = worker.run(&events, &config, &token);
                on_done(stats);
            })
            .map_err(|e| Error::spawn("replay", e))?;
        Ok(ReplayTask { cancel, thread: Some(thread) })
    }

    /// Play synchronously on the calling thread
    pub fn run(&self, events: &[EventRecord], config: &ReplayConfig, cancel: &CancelToken) -> ReplayStats {
        let mut stats = ReplayStats::default();
        if events.is_empty() {
            return stats;
        }

        for run in 0..config.run_count {
            if cancel.is_cancelled() {
                stats.cancelled = true;
                break;
            }
            debug!("replay run {}/{}", run + 1, config.run_count);
            if !self.play_once(events, config, cancel, &mut stats) {
                stats.cancelled = true;
                break;
            }
            stats.runs_completed += 1;

            let last = run + 1 == config.run_count;
            if !last {
                if cancel.is_cancelled() {
                    stats.cancelled = true;
                    break;
                }
                if let Some(wait) = delay_from_secs(config.inter_run_delay_secs) {
                    self.clock.sleep(wait, cancel);
                }
            }
        }

        stats
    }

    /// One pass over the recording. Returns `false` if cancelled part way.
    fn play_once(
        &self,
        events: &[EventRecord],
        config: &ReplayConfig,
        cancel: &CancelToken,
        stats: &mut ReplayStats,
    ) -> bool {
        let mut previous = 0.0;
        for record in events {
            if cancel.is_cancelled() {
                return false;
            }
            // Signed on purpose: a non-positive gap fires immediately
            let delay = record.t - previous + config.extra_per_event_delay_secs;
            if let Some(wait) = delay_from_secs(delay) {
                self.clock.sleep(wait, cancel);
            }
            if cancel.is_cancelled() {
                return false;
            }
            match self.poster.post(&record.event) {
                Ok(()) => stats.events_posted += 1,
                Err(e) => {
                    warn!("{}", e);
                    stats.post_failures += 1;
                }
            }
            previous = record.t;
        }
        true
    }
}

/// Handle to a running replay thread
pub struct ReplayTask {
    cancel: CancelToken,
    thread: Option<thread::JoinHandle<()>>,
}

impl ReplayTask {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the worker to exit
    pub fn join(mut self) {
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}
