//! Retry policy and failure classification for outbound model and search calls.
//!
//! Classification prefers structured signals (HTTP status, Google RPC status)
//! and only falls back to message inspection when nothing structured is
//! available. The message heuristic is best effort: providers do not promise
//! stable error wording.

use std::fmt;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    RateLimited,
    Overloaded,
    Timeout,
    Fatal,
}

impl FailureKind {
    pub fn label(self) -> &'static str {
        match self {
            FailureKind::RateLimited => "rate_limited",
            FailureKind::Overloaded => "overloaded",
            FailureKind::Timeout => "timeout",
            FailureKind::Fatal => "fatal",
        }
    }

    /// Whether the same strategy should be retried after a backoff delay.
    pub fn is_retryable(self) -> bool {
        matches!(self, FailureKind::RateLimited | FailureKind::Overloaded)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Failure of a single call of the unit of work.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct WorkError {
    pub kind: FailureKind,
    pub message: String,
}

impl WorkError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(FailureKind::RateLimited, message)
    }

    pub fn overloaded(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Overloaded, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Fatal, message)
    }

    /// Transport-level failure talking to `service` (no HTTP status available).
    pub fn from_transport(service: &str, err: &reqwest::Error) -> Self {
        let message = format!("{service} request failed: {err}");
        if err.is_timeout() {
            return Self::timeout(message);
        }
        if err.is_connect() {
            return Self::overloaded(message);
        }
        Self::from_message(message, FailureKind::Overloaded)
    }

    /// Classify a free-form message, treating anything unrecognised as `fallback`.
    pub fn from_message(message: impl Into<String>, fallback: FailureKind) -> Self {
        let message = message.into();
        let kind = classify_message(&message).unwrap_or(fallback);
        Self { kind, message }
    }
}

// Patterns are lowercase; the message is lowercased before matching.
pub const FATAL_PATTERNS: &[&str] = &[
    "api key not valid",
    "invalid api key",
    "api_key_invalid",
    "unauthenticated",
    "unauthorized",
    "permission denied",
    "permission_denied",
    "forbidden",
];

pub const RATE_LIMIT_PATTERNS: &[&str] = &[
    "429",
    "rate limit",
    "rate_limit_exceeded",
    "too many requests",
    "quota",
    "resource exhausted",
    "resource_exhausted",
    "limit exceeded",
];

pub const OVERLOAD_PATTERNS: &[&str] = &[
    "503",
    "502",
    "overloaded",
    "service unavailable",
    "temporarily unavailable",
    "server error",
    "internal error",
    "capacity",
];

pub const TIMEOUT_PATTERNS: &[&str] = &[
    "timed out",
    "timeout",
    "deadline exceeded",
    "deadline_exceeded",
];

/// Best-effort classification from an error message.
pub fn classify_message(message: &str) -> Option<FailureKind> {
    let lower = message.to_ascii_lowercase();
    let matches = |patterns: &[&str]| patterns.iter().any(|p| lower.contains(p));

    if matches(FATAL_PATTERNS) {
        return Some(FailureKind::Fatal);
    }
    if matches(RATE_LIMIT_PATTERNS) {
        return Some(FailureKind::RateLimited);
    }
    if matches(OVERLOAD_PATTERNS) {
        return Some(FailureKind::Overloaded);
    }
    if matches(TIMEOUT_PATTERNS) {
        return Some(FailureKind::Timeout);
    }
    None
}

/// Classification from a Google RPC status string (e.g. `RESOURCE_EXHAUSTED`).
pub fn classify_rpc_status(status: &str) -> Option<FailureKind> {
    match status.trim().to_ascii_uppercase().as_str() {
        "RESOURCE_EXHAUSTED" => Some(FailureKind::RateLimited),
        "UNAVAILABLE" | "INTERNAL" | "ABORTED" => Some(FailureKind::Overloaded),
        "DEADLINE_EXCEEDED" => Some(FailureKind::Timeout),
        "UNAUTHENTICATED" | "PERMISSION_DENIED" | "INVALID_ARGUMENT" | "NOT_FOUND"
        | "FAILED_PRECONDITION" => Some(FailureKind::Fatal),
        _ => None,
    }
}

pub fn classify_http_status(code: u16) -> Option<FailureKind> {
    match code {
        429 => Some(FailureKind::RateLimited),
        408 => Some(FailureKind::Timeout),
        500..=599 => Some(FailureKind::Overloaded),
        400..=499 => Some(FailureKind::Fatal),
        _ => None,
    }
}

/// Classify a failed HTTP exchange: RPC status, then HTTP status, then message.
pub fn classify_api_failure(http_status: u16, rpc_status: Option<&str>, message: &str) -> FailureKind {
    rpc_status
        .and_then(classify_rpc_status)
        .or_else(|| classify_http_status(http_status))
        .or_else(|| classify_message(message))
        .unwrap_or(FailureKind::Fatal)
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries allowed per strategy after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Minimum wait after an `Overloaded` failure.
    pub overload_floor: Duration,
    pub jitter_min: f64,
    pub jitter_max: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(160),
            overload_floor: Duration::from_secs(60),
            jitter_min: 0.1,
            jitter_max: 0.3,
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.max_delay < self.base_delay {
            return Err(anyhow::anyhow!(
                "max retry delay ({}s) must be >= base retry delay ({}s)",
                self.max_delay.as_secs_f64(),
                self.base_delay.as_secs_f64()
            ));
        }
        if self.overload_floor > self.max_delay {
            return Err(anyhow::anyhow!(
                "overload floor ({}s) must be <= max retry delay ({}s)",
                self.overload_floor.as_secs_f64(),
                self.max_delay.as_secs_f64()
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_min)
            || !(0.0..=1.0).contains(&self.jitter_max)
            || self.jitter_min > self.jitter_max
        {
            return Err(anyhow::anyhow!(
                "invalid jitter range {}..{}; expected 0.0 <= min <= max <= 1.0",
                self.jitter_min,
                self.jitter_max
            ));
        }
        Ok(())
    }

    /// Exponential delay for the `retry_index`-th retry (0-based), capped, without jitter.
    pub fn base_delay_for(&self, retry_index: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry_index);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Delay before the next retry.
    ///
    /// Never shorter than `previous`, so delays within one strategy never
    /// shrink after an overload floor was applied.
    pub fn delay_for(
        &self,
        retry_index: u32,
        kind: FailureKind,
        previous: Option<Duration>,
    ) -> Duration {
        let jitter = self.sample_jitter();
        let mut delay = self
            .base_delay_for(retry_index)
            .mul_f64(1.0 + jitter)
            .min(self.max_delay);
        if kind == FailureKind::Overloaded {
            delay = delay.max(self.overload_floor);
        }
        if let Some(previous) = previous {
            delay = delay.max(previous);
        }
        delay
    }

    fn sample_jitter(&self) -> f64 {
        if self.jitter_max <= 0.0 {
            return 0.0;
        }
        if self.jitter_max <= self.jitter_min {
            return self.jitter_min;
        }
        rand::rng().random_range(self.jitter_min..=self.jitter_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(60),
            overload_floor: Duration::from_secs(45),
            jitter_min: 0.0,
            jitter_max: 0.0,
        }
    }

    #[test]
    fn base_delay_doubles_until_capped() {
        let policy = no_jitter();
        let delays = (0..5)
            .map(|i| policy.base_delay_for(i).as_secs())
            .collect::<Vec<_>>();
        assert_eq!(delays, vec![10, 20, 40, 60, 60]);
        assert_eq!(policy.base_delay_for(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn overload_floor_raises_short_delays() {
        let policy = no_jitter();
        assert_eq!(
            policy.delay_for(0, FailureKind::Overloaded, None),
            Duration::from_secs(45)
        );
        assert_eq!(
            policy.delay_for(0, FailureKind::RateLimited, None),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn delays_never_shrink_after_an_overload_floor() {
        let policy = no_jitter();
        let first = policy.delay_for(0, FailureKind::Overloaded, None);
        let second = policy.delay_for(1, FailureKind::RateLimited, Some(first));
        assert!(second >= first);
        assert_eq!(second, Duration::from_secs(45));
    }

    #[test]
    fn jittered_delays_stay_within_bounds() {
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(1_000),
            ..RetryPolicy::default()
        };
        for _ in 0..50 {
            let delay = policy.delay_for(1, FailureKind::RateLimited, None);
            assert!(delay >= Duration::from_millis(21_999));
            assert!(delay <= Duration::from_millis(26_001));
        }
    }

    #[test]
    fn validate_rejects_inverted_bounds() {
        let mut policy = no_jitter();
        policy.max_delay = Duration::from_secs(1);
        assert!(policy.validate().is_err());

        let mut policy = no_jitter();
        policy.overload_floor = Duration::from_secs(600);
        let err = policy.validate().expect_err("floor above the cap should fail");
        assert!(err.to_string().contains("must be <= max retry delay"));

        let mut policy = no_jitter();
        policy.jitter_min = 0.5;
        policy.jitter_max = 0.2;
        assert!(policy.validate().is_err());

        assert!(RetryPolicy::default().validate().is_ok());
    }

    #[test]
    fn valid_policies_never_exceed_the_cap() {
        let policy = RetryPolicy {
            overload_floor: Duration::from_secs(160),
            jitter_min: 0.3,
            jitter_max: 0.3,
            ..RetryPolicy::default()
        };
        policy.validate().expect("floor equal to the cap is allowed");
        for retry_index in 0..6 {
            for kind in [FailureKind::RateLimited, FailureKind::Overloaded] {
                assert!(policy.delay_for(retry_index, kind, None) <= policy.max_delay);
            }
        }
    }

    #[test]
    fn structured_status_wins_over_message() {
        assert_eq!(
            classify_api_failure(429, Some("RESOURCE_EXHAUSTED"), "whatever"),
            FailureKind::RateLimited
        );
        assert_eq!(
            classify_api_failure(503, Some("UNAVAILABLE"), "The model is overloaded"),
            FailureKind::Overloaded
        );
        assert_eq!(
            classify_api_failure(400, Some("INVALID_ARGUMENT"), "API key not valid"),
            FailureKind::Fatal
        );
        assert_eq!(
            classify_api_failure(504, None, "gateway"),
            FailureKind::Overloaded
        );
        assert_eq!(
            classify_api_failure(0, None, "request timed out"),
            FailureKind::Timeout
        );
        assert_eq!(classify_api_failure(0, None, "mystery"), FailureKind::Fatal);
    }

    #[test]
    fn message_heuristic_matches_known_wording() {
        assert_eq!(
            classify_message("Error 429: Too Many Requests"),
            Some(FailureKind::RateLimited)
        );
        assert_eq!(
            classify_message("You exceeded your current quota"),
            Some(FailureKind::RateLimited)
        );
        assert_eq!(
            classify_message("503 The model is overloaded. Please try again later."),
            Some(FailureKind::Overloaded)
        );
        assert_eq!(
            classify_message("API key not valid. Please pass a valid API key."),
            Some(FailureKind::Fatal)
        );
        assert_eq!(
            classify_message("operation timed out"),
            Some(FailureKind::Timeout)
        );
        assert_eq!(classify_message("syntax error"), None);
    }

    #[test]
    fn only_rate_limit_and_overload_are_retryable() {
        assert!(FailureKind::RateLimited.is_retryable());
        assert!(FailureKind::Overloaded.is_retryable());
        assert!(!FailureKind::Timeout.is_retryable());
        assert!(!FailureKind::Fatal.is_retryable());
    }
}
