//! Delay-then-fire countdown used before recording and replay

use crate::clock::CancelToken;
use crate::error::{Error, Result};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct CountdownTimer {
    ticks: u32,
    interval: Duration,
}

impl CountdownTimer {
    pub fn new(ticks: u32, interval: Duration) -> Self {
        Self { ticks, interval }
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    /// Start ticking on a background thread.
    ///
    /// `on_tick` receives the remaining tick count after each interval;
    /// the call with `0` is the completion. Nothing fires once cancelled.
    pub fn start<F>(&self, mut on_tick: F) -> Result<Countdown>
    where
        F: FnMut(u32) + Send + 'static,
    {
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let (ticks, interval) = (self.ticks, self.interval);

        thread::Builder::new()
            .name("countdown".into())
            .spawn(move || {
                let mut remaining = ticks;
                while remaining > 0 {
                    if token.wait_timeout(interval) {
                        return;
                    }
                    remaining -= 1;
                    on_tick(remaining);
                }
                if ticks == 0 && !token.is_cancelled() {
                    on_tick(0);
                }
            })
            .map_err(|e| Error::spawn("countdown", e))?;

        Ok(Countdown { cancel })
    }
}

impl Default for CountdownTimer {
    fn default() -> Self {
        Self::new(2, Duration::from_secs(1))
    }
}

/// A pending countdown. Dropping it cancels the timer.
#[derive(Debug)]
pub struct Countdown {
    cancel: CancelToken,
}

impl Countdown {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
