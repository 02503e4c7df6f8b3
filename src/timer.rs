//! Countdown timer with start/end callbacks.
//!
//! Built on Bevy's [`Timer`](bevy::time::Timer) but with countdown semantics:
//! the timer only advances while running, fires its end callback exactly once
//! when it reaches zero and then stays inert until restarted.

use std::fmt;
use std::time::Duration;

use bevy::time::{Timer, TimerMode};

type Callback = Box<dyn FnMut() + Send + Sync>;

/// A countdown timer.
pub struct CountdownTimer {
    inner: Timer,
    running: bool,
    started: bool,
    on_start: Option<Callback>,
    on_end: Option<Callback>,
}

impl fmt::Debug for CountdownTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountdownTimer")
            .field("duration", &self.duration())
            .field("remaining", &self.remaining())
            .field("running", &self.running)
            .finish()
    }
}

impl Default for CountdownTimer {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl CountdownTimer {
    /// Create a stopped timer with the given duration in seconds.
    pub fn new(duration: f32) -> Self {
        let mut inner = Timer::from_seconds(duration.max(0.0), TimerMode::Once);
        inner.pause();
        Self {
            inner,
            running: false,
            started: false,
            on_start: None,
            on_end: None,
        }
    }

    /// Builder: callback fired on the first start after a reset.
    pub fn with_on_start(mut self, callback: impl FnMut() + Send + Sync + 'static) -> Self {
        self.on_start = Some(Box::new(callback));
        self
    }

    /// Builder: callback fired when the countdown reaches zero.
    pub fn with_on_end(mut self, callback: impl FnMut() + Send + Sync + 'static) -> Self {
        self.on_end = Some(Box::new(callback));
        self
    }

    /// Total duration in seconds.
    pub fn duration(&self) -> f32 {
        self.inner.duration().as_secs_f32()
    }

    /// Seconds left before the timer ends.
    pub fn remaining(&self) -> f32 {
        self.inner.remaining_secs()
    }

    /// Progress in `[0, 1]`, 1 meaning the countdown has elapsed.
    pub fn normalized_time(&self) -> f32 {
        let duration = self.duration();
        if duration <= 0.0 {
            return 1.0;
        }
        (1.0 - self.remaining() / duration).clamp(0.0, 1.0)
    }

    /// Whether the countdown is currently advancing.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Change the duration. Remaining time is kept relative to the new duration.
    pub fn set_duration(&mut self, duration: f32) {
        self.inner
            .set_duration(Duration::from_secs_f32(duration.max(0.0)));
    }

    /// Set the remaining time, clamped to `[0, duration]`.
    pub fn set_remaining(&mut self, remaining: f32) {
        let duration = self.duration();
        let remaining = remaining.clamp(0.0, duration);
        self.inner
            .set_elapsed(Duration::from_secs_f32(duration - remaining));
    }

    /// Start (or resume) the countdown.
    pub fn start(&mut self) {
        self.running = true;
        self.inner.unpause();

        if self.started {
            return;
        }
        self.started = true;
        if let Some(on_start) = self.on_start.as_mut() {
            on_start();
        }
    }

    /// Pause the countdown without resetting it.
    pub fn stop(&mut self) {
        self.running = false;
        self.inner.pause();
    }

    /// Rewind to the full duration and stop.
    pub fn reset(&mut self) {
        self.inner.reset();
        self.inner.pause();
        self.running = false;
        self.started = false;
    }

    /// Reset and start again.
    pub fn restart(&mut self) {
        self.reset();
        self.start();
    }

    /// Advance the countdown. Returns `true` only on the tick that ends it.
    pub fn tick(&mut self, dt: f32) -> bool {
        if !self.running {
            return false;
        }

        self.inner.tick(Duration::from_secs_f32(dt.max(0.0)));

        if !self.inner.finished() {
            return false;
        }

        self.running = false;
        self.inner.pause();
        if let Some(on_end) = self.on_end.as_mut() {
            on_end();
        }
        true
    }
}
