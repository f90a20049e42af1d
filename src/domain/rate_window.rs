//! Sliding Rate Window
//!
//! Bookkeeping for one rate-limit domain: the timestamps of calls that still
//! count against the trailing window. The clock is passed in by the caller so
//! the window itself never sleeps and never reads time.

use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Lower bound on a single wait so a full window never spins the CPU
pub const MIN_WAIT: Duration = Duration::from_millis(10);

/// Longest accepted period (10 years)
pub const MAX_PERIOD: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RateLimitConfigError {
    #[error("max_calls must be > 0")]
    ZeroCalls,
    #[error("period must be > 0")]
    ZeroPeriod,
    #[error("period must be a finite, non-negative number of seconds, got {0}")]
    InvalidPeriod(String),
    #[error("period must be at most 10 years, got {0:?}")]
    PeriodTooLong(Duration),
}

/// Capacity of a rate window: at most `max_calls` inside any trailing `period`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_calls: u32,
    pub period: Duration,
}

impl RateLimitConfig {
    /// Create a validated config
    pub fn new(max_calls: u32, period: Duration) -> Result<Self, RateLimitConfigError> {
        if max_calls == 0 {
            return Err(RateLimitConfigError::ZeroCalls);
        }
        if period.is_zero() {
            return Err(RateLimitConfigError::ZeroPeriod);
        }
        if period > MAX_PERIOD {
            return Err(RateLimitConfigError::PeriodTooLong(period));
        }
        Ok(Self { max_calls, period })
    }

    /// Create a config from a period expressed in (fractional) seconds
    pub fn from_secs_f64(max_calls: u32, period_secs: f64) -> Result<Self, RateLimitConfigError> {
        let period = Duration::try_from_secs_f64(period_secs)
            .map_err(|_| RateLimitConfigError::InvalidPeriod(period_secs.to_string()))?;
        Self::new(max_calls, period)
    }

    /// `max_calls` per second
    pub fn per_second(max_calls: u32) -> Result<Self, RateLimitConfigError> {
        Self::new(max_calls, Duration::from_secs(1))
    }

    /// `max_calls` per minute
    pub fn per_minute(max_calls: u32) -> Result<Self, RateLimitConfigError> {
        Self::new(max_calls, Duration::from_secs(60))
    }

    /// Clamp a raw wait into `[MIN_WAIT, period]`
    ///
    /// A period shorter than `MIN_WAIT` caps the lower bound at the period.
    pub fn clamp_wait(&self, wait: Duration) -> Duration {
        wait.max(MIN_WAIT.min(self.period)).min(self.period)
    }
}

/// Outcome of one admission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A slot was free and `now` has been recorded
    Granted,
    /// Window full; retry after this (already clamped) delay
    Wait(Duration),
}

/// Timestamps of calls still inside the window, oldest first
#[derive(Debug, Default, Clone)]
pub struct RateWindow {
    call_timestamps: VecDeque<Instant>,
}

impl RateWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every timestamp with `now - t >= period`
    pub fn evict(&mut self, now: Instant, period: Duration) {
        while let Some(&oldest) = self.call_timestamps.front() {
            if now.saturating_duration_since(oldest) >= period {
                self.call_timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Evict, then either record `now` or report how long to wait
    pub fn try_admit(&mut self, config: &RateLimitConfig, now: Instant) -> Admission {
        self.evict(now, config.period);

        if self.call_timestamps.len() < config.max_calls as usize {
            self.call_timestamps.push_back(now);
            return Admission::Granted;
        }

        let wait = match self.call_timestamps.front() {
            Some(&oldest) => oldest
                .checked_add(config.period)
                .map_or(config.period, |free_at| free_at.saturating_duration_since(now)),
            None => Duration::ZERO,
        };
        Admission::Wait(config.clamp_wait(wait))
    }

    /// Whether a call made at `now` would be admitted (records nothing)
    pub fn has_capacity(&mut self, config: &RateLimitConfig, now: Instant) -> bool {
        self.evict(now, config.period);
        self.call_timestamps.len() < config.max_calls as usize
    }

    /// Calls counted in the window as of `now`
    pub fn count_at(&mut self, period: Duration, now: Instant) -> usize {
        self.evict(now, period);
        self.call_timestamps.len()
    }

    /// Oldest timestamp still held
    pub fn oldest(&self) -> Option<Instant> {
        self.call_timestamps.front().copied()
    }

    /// Raw number of held timestamps (may include ones due for eviction)
    pub fn len(&self) -> usize {
        self.call_timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.call_timestamps.is_empty()
    }

    pub fn clear(&mut self) {
        self.call_timestamps.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_calls: u32, period_ms: u64) -> RateLimitConfig {
        RateLimitConfig::new(max_calls, Duration::from_millis(period_ms)).unwrap()
    }

    #[test]
    fn test_config_validation() {
        assert_eq!(
            RateLimitConfig::new(0, Duration::from_secs(1)),
            Err(RateLimitConfigError::ZeroCalls)
        );
        assert_eq!(
            RateLimitConfig::new(5, Duration::ZERO),
            Err(RateLimitConfigError::ZeroPeriod)
        );
        assert!(matches!(
            RateLimitConfig::from_secs_f64(5, -1.0),
            Err(RateLimitConfigError::InvalidPeriod(_))
        ));
        assert!(matches!(
            RateLimitConfig::from_secs_f64(5, f64::NAN),
            Err(RateLimitConfigError::InvalidPeriod(_))
        ));

        assert!(matches!(
            RateLimitConfig::from_secs_f64(1, 1e19),
            Err(RateLimitConfigError::PeriodTooLong(_))
        ));
        assert!(RateLimitConfig::new(1, MAX_PERIOD).is_ok());

        let per_minute = RateLimitConfig::per_minute(60).unwrap();
        assert_eq!(per_minute.period, Duration::from_secs(60));
        assert_eq!(
            RateLimitConfig::from_secs_f64(3, 0.5).unwrap().period,
            Duration::from_millis(500)
        );
    }

    #[test]
    fn test_admits_up_to_capacity() {
        let cfg = config(3, 1000);
        let mut window = RateWindow::new();
        let now = Instant::now();

        for _ in 0..3 {
            assert_eq!(window.try_admit(&cfg, now), Admission::Granted);
        }
        assert_eq!(window.len(), 3);
        assert!(matches!(window.try_admit(&cfg, now), Admission::Wait(_)));
        // A refused attempt records nothing
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn test_wait_is_time_until_oldest_expires() {
        let cfg = config(2, 1000);
        let mut window = RateWindow::new();
        let start = Instant::now();

        window.try_admit(&cfg, start);
        window.try_admit(&cfg, start + Duration::from_millis(300));

        let admission = window.try_admit(&cfg, start + Duration::from_millis(400));
        assert_eq!(admission, Admission::Wait(Duration::from_millis(600)));
    }

    #[test]
    fn test_eviction_at_period_boundary() {
        let cfg = config(1, 1000);
        let mut window = RateWindow::new();
        let start = Instant::now();

        assert_eq!(window.try_admit(&cfg, start), Admission::Granted);

        // Still inside the window one millisecond before the boundary
        let almost = start + Duration::from_millis(999);
        assert!(!window.has_capacity(&cfg, almost));

        // `now - t >= period` is evicted
        let boundary = start + Duration::from_millis(1000);
        assert_eq!(window.try_admit(&cfg, boundary), Admission::Granted);
        assert_eq!(window.oldest(), Some(boundary));
    }

    #[test]
    fn test_wait_is_clamped() {
        let cfg = config(1, 1000);
        let mut window = RateWindow::new();
        let start = Instant::now();
        window.try_admit(&cfg, start);

        // Only 1ms left, but never wait less than MIN_WAIT
        let late = start + Duration::from_millis(999);
        assert_eq!(window.try_admit(&cfg, late), Admission::Wait(MIN_WAIT));

        assert_eq!(cfg.clamp_wait(Duration::from_secs(5)), Duration::from_secs(1));
    }

    #[test]
    fn test_clamp_with_tiny_period() {
        let cfg = config(1, 2);
        assert_eq!(cfg.clamp_wait(Duration::ZERO), Duration::from_millis(2));
        assert_eq!(cfg.clamp_wait(Duration::from_secs(1)), Duration::from_millis(2));
    }

    #[test]
    fn test_has_capacity_does_not_reserve() {
        let cfg = config(1, 1000);
        let mut window = RateWindow::new();
        let now = Instant::now();

        assert!(window.has_capacity(&cfg, now));
        assert!(window.has_capacity(&cfg, now));
        assert!(window.is_empty());
    }

    #[test]
    fn test_shrunk_capacity_keeps_waiting() {
        let mut window = RateWindow::new();
        let start = Instant::now();
        let wide = config(4, 1000);
        for i in 0..4 {
            window.try_admit(&wide, start + Duration::from_millis(i * 100));
        }

        // Capacity lowered after the fact: still full until enough entries age out
        let narrow = config(2, 1000);
        let t = start + Duration::from_millis(1050);
        assert!(matches!(window.try_admit(&narrow, t), Admission::Wait(_)));
        assert_eq!(window.count_at(narrow.period, t), 3);

        let later = start + Duration::from_millis(1250);
        assert_eq!(window.try_admit(&narrow, later), Admission::Granted);
    }

    #[test]
    fn test_clear() {
        let cfg = config(1, 1000);
        let mut window = RateWindow::new();
        window.try_admit(&cfg, Instant::now());
        window.clear();
        assert!(window.is_empty());
    }
}
