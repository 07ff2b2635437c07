//! Pacing between frame round-trips
//!
//! The loop awaits one tick before every new round-trip. Production pacing
//! follows the display refresh rate; tests swap in their own scheduler.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Interval, MissedTickBehavior};

#[async_trait]
pub trait FrameScheduler: Send + Sync {
    /// Resolve when the next iteration may run
    async fn next_tick(&self);
}

/// Ticks at the display refresh rate; slow round-trips delay the cadence
/// instead of queueing ticks.
pub struct RefreshScheduler {
    period: Duration,
    // Created on first use, intervals need a running runtime
    interval: Mutex<Option<Interval>>,
}

impl RefreshScheduler {
    pub fn new(refresh_hz: u32) -> Self {
        let hz = refresh_hz.max(1);
        Self {
            period: Duration::from_secs_f64(1.0 / f64::from(hz)),
            interval: Mutex::new(None),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

#[async_trait]
impl FrameScheduler for RefreshScheduler {
    async fn next_tick(&self) {
        let mut slot = self.interval.lock().await;
        let interval = slot.get_or_insert_with(|| {
            let mut interval = tokio::time::interval(self.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        interval.tick().await;
    }
}

/// Yields to other tasks and continues right away
pub struct ImmediateScheduler;

#[async_trait]
impl FrameScheduler for ImmediateScheduler {
    async fn next_tick(&self) {
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[test]
    fn test_period_from_refresh_rate() {
        assert_eq!(RefreshScheduler::new(50).period(), Duration::from_millis(20));
        assert_eq!(RefreshScheduler::new(0).period(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_ticks_are_paced() {
        let scheduler = RefreshScheduler::new(10);
        let start = Instant::now();

        // First tick fires immediately, the next ones wait a period each
        scheduler.next_tick().await;
        scheduler.next_tick().await;
        scheduler.next_tick().await;

        assert!(start.elapsed() >= Duration::from_millis(200));
    }
}
