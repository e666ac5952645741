//! Stage timing on top of the `log` facade.
//!
//! A [`TimingGuard`] records when it was created and logs the elapsed time
//! when dropped. Guards whose level is disabled by the installed logger are
//! inert, so wrapping every pipeline stage costs next to nothing in
//! production builds that log at `info`.

use std::borrow::Cow;
use std::time::{Duration, Instant};

use log::{log, log_enabled, Level};

const TARGET: &str = "passport_photo::telemetry";

/// RAII helper that logs how long a scope took.
pub struct TimingGuard {
    label: Cow<'static, str>,
    level: Level,
    start: Instant,
    active: bool,
}

impl TimingGuard {
    /// Returns `true` when the guard will emit a log entry on drop.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Consume the guard and return the elapsed duration without logging.
    pub fn finish(mut self) -> Duration {
        self.active = false;
        self.start.elapsed()
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        if self.active {
            log!(
                target: TARGET,
                self.level,
                "{} completed in {:.2?}",
                self.label,
                self.start.elapsed()
            );
        }
    }
}

/// Start timing `label`, logging at `level` when that level is enabled.
pub fn timing_guard(label: impl Into<Cow<'static, str>>, level: Level) -> TimingGuard {
    TimingGuard {
        label: label.into(),
        level,
        start: Instant::now(),
        active: log_enabled!(target: TARGET, level),
    }
}
