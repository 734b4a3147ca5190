//! Wall-clock source in epoch milliseconds

use chrono::{TimeZone, Utc};

use crate::identity::Millis;

pub trait Clock: Send + Sync {
    fn now_millis(&self) -> Millis;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> Millis {
        Utc::now().timestamp_millis()
    }
}

/// Wall clock that advances with tokio's clock.
///
/// Under `start_paused` tests, `tokio::time::advance` and auto-advance move
/// this clock and the scheduler's sleeps together.
#[derive(Debug, Clone)]
pub struct TokioClock {
    base: Millis,
    started: tokio::time::Instant,
}

impl TokioClock {
    pub fn starting_at(base: Millis) -> Self {
        Self {
            base,
            started: tokio::time::Instant::now(),
        }
    }

    /// Start at a fixed, readable date so tests don't depend on today.
    pub fn fixed() -> Self {
        let base = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .map(|t| t.timestamp_millis())
            .unwrap_or_default();
        Self::starting_at(base)
    }
}

impl Clock for TokioClock {
    fn now_millis(&self) -> Millis {
        self.base + self.started.elapsed().as_millis() as Millis
    }
}
