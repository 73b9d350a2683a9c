//! Poller configuration
//!
//! Defines the tunables of a polling session: per-kind intervals, the
//! per-request timeout, the consecutive-error threshold, and the overall
//! polling deadline.

use cierre_core::domain::job::JobKind;
use std::collections::HashMap;
use std::time::Duration;

/// Consecutive transport failures tolerated before a session aborts
pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 3;

/// Overall deadline of a session that never sees a terminal status
pub const DEFAULT_MAX_POLL_DURATION: Duration = Duration::from_secs(30 * 60);

/// Upper bound of the derived per-request timeout
const MAX_DERIVED_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Poller configuration
///
/// Intervals are fixed per job kind. There is no adaptive backoff: callers
/// pick an interval proportional to the expected job latency.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Interval applied to every kind, overriding the kind defaults
    pub poll_interval: Option<Duration>,

    /// Per-kind interval overrides
    pub intervals: HashMap<JobKind, Duration>,

    /// Per-request timeout; derived from the interval when unset
    pub request_timeout: Option<Duration>,

    /// Consecutive transport failures before the session aborts
    pub max_consecutive_errors: u32,

    /// Maximum wall time a session keeps polling
    pub max_poll_duration: Duration,
}

impl PollerConfig {
    /// Creates a configuration with defaults
    pub fn new() -> Self {
        Self {
            poll_interval: None,
            intervals: HashMap::new(),
            request_timeout: None,
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
            max_poll_duration: DEFAULT_MAX_POLL_DURATION,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Recognised environment variables:
    /// - POLL_INTERVAL_MS (optional, overrides every kind's interval)
    /// - REQUEST_TIMEOUT_MS (optional, default: 3/4 of the interval, at most 10s)
    /// - MAX_CONSECUTIVE_ERRORS (optional, default: 3)
    /// - MAX_POLL_DURATION_SECS (optional, default: 1800)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var_u64 = |name: &str| lookup(name).and_then(|s| s.trim().parse::<u64>().ok());

        let poll_interval = var_u64("POLL_INTERVAL_MS").map(Duration::from_millis);

        let request_timeout = var_u64("REQUEST_TIMEOUT_MS").map(Duration::from_millis);

        // Counts that do not fit a u32 are treated as unset
        let max_consecutive_errors = var_u64("MAX_CONSECUTIVE_ERRORS")
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(DEFAULT_MAX_CONSECUTIVE_ERRORS);

        let max_poll_duration = var_u64("MAX_POLL_DURATION_SECS")
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_MAX_POLL_DURATION);

        Self {
            poll_interval,
            intervals: HashMap::new(),
            request_timeout,
            max_consecutive_errors,
            max_poll_duration,
        }
    }

    /// Overrides the interval of one job kind
    pub fn with_interval(mut self, kind: JobKind, interval: Duration) -> Self {
        self.intervals.insert(kind, interval);
        self
    }

    /// Interval used for sessions of the given kind
    pub fn interval_for(&self, kind: JobKind) -> Duration {
        self.intervals
            .get(&kind)
            .copied()
            .or(self.poll_interval)
            .unwrap_or_else(|| kind.default_interval())
    }

    /// Per-request timeout for sessions of the given kind
    ///
    /// Always shorter than the interval so a hung request counts as a
    /// transport failure before the next tick is due.
    pub fn request_timeout_for(&self, kind: JobKind) -> Duration {
        let interval = self.interval_for(kind);
        let derived = (interval * 3 / 4).min(MAX_DERIVED_REQUEST_TIMEOUT);
        match self.request_timeout {
            Some(timeout) if timeout < interval => timeout,
            _ => derived,
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval.is_some_and(|d| d.is_zero())
            || self.intervals.values().any(|d| d.is_zero())
        {
            return Err("poll interval must be greater than 0".to_string());
        }

        if self.request_timeout.is_some_and(|d| d.is_zero()) {
            return Err("request_timeout must be greater than 0".to_string());
        }

        if let (Some(timeout), Some(interval)) = (self.request_timeout, self.poll_interval) {
            if timeout >= interval {
                return Err("request_timeout must be shorter than poll_interval".to_string());
            }
        }

        if self.max_consecutive_errors == 0 {
            return Err("max_consecutive_errors must be greater than 0".to_string());
        }

        if self.max_poll_duration.is_zero() {
            return Err("max_poll_duration must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self::new()
    }
}
