//! Adaptive poll scheduler.
//!
//! A pure state machine driven by the engine's one-second tick. It holds
//! no timers of its own, so disabling it or logging out leaves nothing
//! running.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use ripple_shared::constants::{MIN_REFRESH_MINUTES, QUIET_THRESHOLD, RETRY_DELAY};

/// Outcome of a scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Disabled, or the target time is still ahead.
    Idle,
    /// Target reached but a refresh may not run yet.
    Deferred { until: Instant },
    /// Run a scheduled refresh now.
    Fire,
}

#[derive(Debug)]
pub struct PollScheduler {
    enabled: bool,
    interval: Duration,
    next_at: Option<Instant>,
    last_interaction: Option<Instant>,
    paused: bool,
    in_flight: bool,
}

impl PollScheduler {
    /// A disabled scheduler with the given interval.
    pub fn new(interval_minutes: u32) -> Self {
        Self {
            enabled: false,
            interval: interval(interval_minutes),
            next_at: None,
            last_interaction: None,
            paused: false,
            in_flight: false,
        }
    }

    /// Apply the user's preferences. Enabling (or changing the interval)
    /// schedules the next refresh one full interval from `now`.
    pub fn configure(&mut self, enabled: bool, interval_minutes: u32, now: Instant) {
        let interval = interval(interval_minutes);
        if enabled == self.enabled && interval == self.interval {
            return;
        }
        self.interval = interval;
        if enabled {
            self.enabled = true;
            self.next_at = Some(now + interval);
            debug!(interval_secs = interval.as_secs(), "Auto-refresh scheduled");
        } else {
            self.stop();
        }
    }

    /// Tear down the schedule entirely.
    pub fn stop(&mut self) {
        if self.enabled {
            debug!("Auto-refresh stopped");
        }
        self.enabled = false;
        self.next_at = None;
        self.paused = false;
        self.in_flight = false;
    }

    pub fn record_interaction(&mut self, now: Instant) {
        self.last_interaction = Some(now);
    }

    pub fn tick(&mut self, now: Instant) -> Tick {
        if !self.enabled {
            return Tick::Idle;
        }
        let Some(target) = self.next_at else {
            return Tick::Idle;
        };
        if now < target {
            return Tick::Idle;
        }

        let interacting = self
            .last_interaction
            .map_or(false, |at| now.saturating_duration_since(at) < QUIET_THRESHOLD);
        if interacting || self.in_flight {
            let until = now + RETRY_DELAY;
            self.next_at = Some(until);
            self.paused = interacting;
            debug!(interacting, in_flight = self.in_flight, "Scheduled refresh deferred");
            return Tick::Deferred { until };
        }

        self.paused = false;
        self.in_flight = true;
        self.next_at = Some(now + self.interval);
        Tick::Fire
    }

    /// The refresh started by the last [`Tick::Fire`] has fully settled.
    pub fn refresh_finished(&mut self) {
        self.in_flight = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn next_refresh_at(&self) -> Option<Instant> {
        self.next_at
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

fn interval(minutes: u32) -> Duration {
    Duration::from_secs(u64::from(minutes.max(MIN_REFRESH_MINUTES)) * 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled(minutes: u32, now: Instant) -> PollScheduler {
        let mut scheduler = PollScheduler::new(minutes);
        scheduler.configure(true, minutes, now);
        scheduler
    }

    #[test]
    fn test_fires_at_target_and_reschedules() {
        let start = Instant::now();
        let mut scheduler = enabled(5, start);

        assert_eq!(scheduler.tick(start + Duration::from_secs(299)), Tick::Idle);
        let at = start + Duration::from_secs(300);
        assert_eq!(scheduler.tick(at), Tick::Fire);
        assert_eq!(scheduler.next_refresh_at(), Some(at + Duration::from_secs(300)));
    }

    #[test]
    fn test_quiet_window_defers() {
        let start = Instant::now();
        let mut scheduler = enabled(1, start);
        let target = start + Duration::from_secs(60);

        scheduler.record_interaction(target - Duration::from_secs(1));
        assert_eq!(
            scheduler.tick(target),
            Tick::Deferred {
                until: target + RETRY_DELAY
            }
        );
        assert!(scheduler.is_paused());

        // Still within 30s of the interaction.
        assert!(matches!(
            scheduler.tick(target + RETRY_DELAY),
            Tick::Deferred { .. }
        ));

        let quiet = target + Duration::from_secs(30);
        assert_eq!(scheduler.tick(quiet), Tick::Fire);
        assert!(!scheduler.is_paused());
    }

    #[test]
    fn test_never_fires_while_in_flight() {
        let start = Instant::now();
        let mut scheduler = enabled(1, start);
        let first = start + Duration::from_secs(60);
        assert_eq!(scheduler.tick(first), Tick::Fire);

        let second = first + Duration::from_secs(60);
        assert!(matches!(scheduler.tick(second), Tick::Deferred { .. }));
        assert!(!scheduler.is_paused());

        scheduler.refresh_finished();
        assert_eq!(scheduler.tick(second + RETRY_DELAY), Tick::Fire);
    }

    #[test]
    fn test_disable_tears_down() {
        let start = Instant::now();
        let mut scheduler = enabled(1, start);
        scheduler.configure(false, 1, start);

        assert!(!scheduler.is_enabled());
        assert_eq!(scheduler.next_refresh_at(), None);
        assert_eq!(scheduler.tick(start + Duration::from_secs(3600)), Tick::Idle);
    }

    #[test]
    fn test_interval_clamped_to_minimum() {
        let scheduler = PollScheduler::new(0);
        assert_eq!(scheduler.interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_reconfigure_same_values_keeps_target() {
        let start = Instant::now();
        let mut scheduler = enabled(5, start);
        let target = scheduler.next_refresh_at();
        scheduler.configure(true, 5, start + Duration::from_secs(100));
        assert_eq!(scheduler.next_refresh_at(), target);
    }
}
