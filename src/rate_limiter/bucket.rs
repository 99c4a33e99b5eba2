//! @ai:module:intent Adaptive token bucket that backs off on rate-limit errors
//! @ai:module:layer infrastructure
//! @ai:module:public_api AdaptiveTokenBucket, RateLimitConfig
//! @ai:module:stateless false

use crate::error::{Error, Result};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Upper bound of the random extra wait, as a fraction of the computed wait
const JITTER_FRACTION: f64 = 0.1;

/// @ai:intent Throttling parameters for one rate-limit taxonomy
/// @ai:effects pure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_initial_rate")]
    pub initial_per_second_request_rate: f64,
    #[serde(default = "default_maximum_rate")]
    pub maximum_per_second_request_rate: f64,
    #[serde(default = "default_minimum_rate")]
    pub minimum_per_second_request_rate: f64,
    #[serde(default = "default_enforcement_window")]
    pub enforcement_window_minutes: f64,
    #[serde(default = "default_reduction_factor")]
    pub rate_reduction_factor: f64,
    #[serde(default = "default_increase_factor")]
    pub rate_increase_factor: f64,
    #[serde(default = "default_cooldown")]
    pub cooldown_seconds: f64,
    /// Error kinds absorbed by the limiter
    #[serde(default = "default_error_kinds")]
    pub error_kinds: Vec<String>,
    /// None retries rate-limited calls until they stop being rate limited
    #[serde(default)]
    pub max_rate_limit_retries: Option<u32>,
}

fn default_initial_rate() -> f64 {
    5.0
}

fn default_maximum_rate() -> f64 {
    20.0
}

fn default_minimum_rate() -> f64 {
    0.1
}

fn default_enforcement_window() -> f64 {
    1.0
}

fn default_reduction_factor() -> f64 {
    0.5
}

fn default_increase_factor() -> f64 {
    0.01
}

fn default_cooldown() -> f64 {
    5.0
}

fn default_error_kinds() -> Vec<String> {
    vec![crate::llm::TOO_MANY_REQUESTS.to_string()]
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            initial_per_second_request_rate: default_initial_rate(),
            maximum_per_second_request_rate: default_maximum_rate(),
            minimum_per_second_request_rate: default_minimum_rate(),
            enforcement_window_minutes: default_enforcement_window(),
            rate_reduction_factor: default_reduction_factor(),
            rate_increase_factor: default_increase_factor(),
            cooldown_seconds: default_cooldown(),
            error_kinds: default_error_kinds(),
            max_rate_limit_retries: None,
        }
    }
}

impl RateLimitConfig {
    /// @ai:intent Check rate bounds and factors
    /// @ai:effects pure
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("initial_per_second_request_rate", self.initial_per_second_request_rate),
            ("maximum_per_second_request_rate", self.maximum_per_second_request_rate),
            ("minimum_per_second_request_rate", self.minimum_per_second_request_rate),
            ("enforcement_window_minutes", self.enforcement_window_minutes),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }

        if self.minimum_per_second_request_rate > self.maximum_per_second_request_rate {
            return Err(Error::InvalidConfig(
                "minimum request rate exceeds maximum request rate".to_string(),
            ));
        }

        if !(self.rate_reduction_factor > 0.0 && self.rate_reduction_factor < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "rate_reduction_factor must be in (0, 1), got {}",
                self.rate_reduction_factor
            )));
        }

        if !self.rate_increase_factor.is_finite() || self.rate_increase_factor < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "rate_increase_factor must not be negative, got {}",
                self.rate_increase_factor
            )));
        }

        let durations = [
            ("enforcement_window_minutes", self.enforcement_window_minutes * 60.0),
            ("cooldown_seconds", self.cooldown_seconds),
            (
                "minimum_per_second_request_rate",
                1.0 / self.minimum_per_second_request_rate,
            ),
        ];
        for (name, secs) in durations {
            if Duration::try_from_secs_f64(secs).is_err() {
                return Err(Error::InvalidConfig(format!(
                    "{} does not describe a usable duration ({} seconds)",
                    name, secs
                )));
            }
        }

        Ok(())
    }
}

struct BucketState {
    rate: f64,
    tokens: f64,
    last_refill: Instant,
    last_rate_update: Instant,
    last_error: Option<Instant>,
}

/// @ai:intent Token bucket whose refill rate adapts to observed rate-limit errors
///            The rate creeps up while calls succeed and halves (by default) on an error
pub struct AdaptiveTokenBucket {
    state: Mutex<BucketState>,
    initial_rate: f64,
    maximum_rate: f64,
    minimum_rate: f64,
    enforcement_window: Duration,
    reduction_factor: f64,
    increase_factor: f64,
    cooldown: Duration,
}

impl AdaptiveTokenBucket {
    /// @ai:intent Create a bucket holding a single token
    /// @ai:pre config.validate() succeeded
    /// @ai:effects time
    pub fn new(config: &RateLimitConfig) -> Self {
        let now = Instant::now();
        let initial_rate = config
            .initial_per_second_request_rate
            .clamp(
                config.minimum_per_second_request_rate,
                config.maximum_per_second_request_rate,
            );

        Self {
            state: Mutex::new(BucketState {
                rate: initial_rate,
                tokens: 1.0,
                last_refill: now,
                last_rate_update: now,
                last_error: None,
            }),
            initial_rate,
            maximum_rate: config.maximum_per_second_request_rate,
            minimum_rate: config.minimum_per_second_request_rate,
            enforcement_window: Duration::try_from_secs_f64(config.enforcement_window_minutes * 60.0)
                .unwrap_or(Duration::MAX),
            reduction_factor: config.rate_reduction_factor,
            increase_factor: config.rate_increase_factor,
            cooldown: Duration::try_from_secs_f64(config.cooldown_seconds).unwrap_or(Duration::MAX),
        }
    }

    /// @ai:intent Current refill rate in requests per second
    /// @ai:effects pure
    pub fn rate(&self) -> f64 {
        self.state.lock().rate
    }

    /// @ai:intent Grow the rate while no errors occur; reset after a long idle period
    /// @ai:effects state:write
    fn increase_rate(&self, state: &mut BucketState, now: Instant) {
        let idle = now.duration_since(state.last_rate_update);

        if idle > self.enforcement_window {
            state.rate = self.initial_rate;
        } else {
            let grown = state.rate * (self.increase_factor * idle.as_secs_f64()).exp();
            state.rate = grown.min(self.maximum_rate);
        }
        state.last_rate_update = now;
    }

    /// @ai:intent Refill tokens based on elapsed time
    /// @ai:effects state:write
    fn refill_tokens(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.duration_since(state.last_refill);
        let capacity = (state.rate * self.enforcement_window.as_secs_f64()).max(1.0);
        state.tokens = (state.tokens + elapsed.as_secs_f64() * state.rate).min(capacity);
        state.last_refill = now;
    }

    /// @ai:intent Take a token if one is available, otherwise report how long to wait
    /// @ai:effects state:write, time
    pub fn try_acquire(&self) -> std::result::Result<(), Duration> {
        let now = Instant::now();
        let mut state = self.state.lock();
        self.increase_rate(&mut state, now);
        self.refill_tokens(&mut state, now);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return Ok(());
        }

        let tokens_needed = 1.0 - state.tokens;
        Err(Duration::try_from_secs_f64(tokens_needed / state.rate).unwrap_or(Duration::MAX))
    }

    /// @ai:intent Wait (suspending the task) until a token is available
    /// @ai:effects state:write, time
    pub async fn wait_until_ready(&self) {
        while let Err(wait) = self.try_acquire() {
            tokio::time::sleep(with_jitter(wait)).await;
        }
    }

    /// @ai:intent Wait (blocking the thread) until a token is available
    /// @ai:effects state:write, time
    pub fn wait_until_ready_blocking(&self) {
        while let Err(wait) = self.try_acquire() {
            std::thread::sleep(with_jitter(wait));
        }
    }

    /// @ai:intent Reduce the rate after a rate-limit error
    ///            Requests that started within the cooldown of the last reduction are ignored,
    ///            so one wave of errors from concurrent callers reduces the rate once
    /// @ai:post returns true when the rate was reduced
    /// @ai:effects state:write
    pub fn on_rate_limit_error(&self, request_started: Instant) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock();

        if let Some(last_error) = state.last_error {
            // An unrepresentable cooldown end never expires
            let within_cooldown = last_error
                .checked_add(self.cooldown)
                .is_none_or(|until| request_started < until);
            if within_cooldown {
                return false;
            }
        }

        let original_rate = state.rate;
        state.rate = (original_rate * self.reduction_factor).max(self.minimum_rate);
        state.tokens = 0.0;
        state.last_refill = now;
        state.last_rate_update = now;
        state.last_error = Some(now);

        tracing::info!(
            "Reducing request rate from {:.3}/s to {:.3}/s after rate limit error",
            original_rate,
            state.rate
        );
        true
    }
}

/// @ai:intent Add up to JITTER_FRACTION of random extra wait
/// @ai:effects random
fn with_jitter(wait: Duration) -> Duration {
    let factor = 1.0 + rand::rng().random_range(0.0..JITTER_FRACTION);
    Duration::try_from_secs_f64(wait.as_secs_f64() * factor).unwrap_or(wait)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> RateLimitConfig {
        RateLimitConfig {
            initial_per_second_request_rate: 20.0,
            maximum_per_second_request_rate: 40.0,
            minimum_per_second_request_rate: 1.0,
            cooldown_seconds: 60.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_first_request_is_immediate() {
        let bucket = AdaptiveTokenBucket::new(&fast_config());
        assert!(bucket.try_acquire().is_ok());
    }

    #[test]
    fn test_empty_bucket_reports_wait() {
        let bucket = AdaptiveTokenBucket::new(&fast_config());
        bucket.try_acquire().unwrap();

        let wait = bucket.try_acquire().unwrap_err();
        assert!(wait > Duration::ZERO);
        assert!(wait <= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_wait_until_ready_throttles_excess_requests() {
        let bucket = AdaptiveTokenBucket::new(&fast_config());

        let start = Instant::now();
        for _ in 0..3 {
            bucket.wait_until_ready().await;
        }

        assert!(start.elapsed() >= Duration::from_millis(80));
    }

    #[test]
    fn test_rate_limit_error_halves_rate_once_per_cooldown() {
        let bucket = AdaptiveTokenBucket::new(&fast_config());
        let before = Instant::now();

        assert!(bucket.on_rate_limit_error(before));
        let reduced = bucket.rate();
        assert!((reduced - 10.0).abs() < 0.1);

        assert!(!bucket.on_rate_limit_error(Instant::now()));
        assert!((bucket.rate() - reduced).abs() < 1e-9);
    }

    #[test]
    fn test_rate_never_drops_below_minimum() {
        let config = RateLimitConfig {
            cooldown_seconds: 0.0,
            ..fast_config()
        };
        let bucket = AdaptiveTokenBucket::new(&config);

        for _ in 0..10 {
            bucket.on_rate_limit_error(Instant::now());
        }
        assert!(bucket.rate() >= 1.0);
    }

    #[test]
    fn test_validate_rejects_bad_reduction_factor() {
        let config = RateLimitConfig {
            rate_reduction_factor: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(RateLimitConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unrepresentable_durations() {
        let huge_window = RateLimitConfig {
            enforcement_window_minutes: 1e30,
            ..Default::default()
        };
        let huge_cooldown = RateLimitConfig {
            cooldown_seconds: 1e30,
            ..Default::default()
        };
        let nan_cooldown = RateLimitConfig {
            cooldown_seconds: f64::NAN,
            ..Default::default()
        };
        let vanishing_minimum = RateLimitConfig {
            minimum_per_second_request_rate: 1e-300,
            ..Default::default()
        };

        for config in [huge_window, huge_cooldown, nan_cooldown, vanishing_minimum] {
            assert!(
                matches!(config.validate(), Err(Error::InvalidConfig(_))),
                "accepted {:?}",
                config
            );
        }
    }

    #[test]
    fn test_huge_cooldown_suppresses_further_reductions_without_panicking() {
        let config = RateLimitConfig {
            cooldown_seconds: 1e30,
            ..fast_config()
        };
        let bucket = AdaptiveTokenBucket::new(&config);

        assert!(bucket.on_rate_limit_error(Instant::now()));
        assert!(!bucket.on_rate_limit_error(Instant::now()));
        assert!((bucket.rate() - 10.0).abs() < 0.1);
    }

    #[test]
    fn test_jitter_saturates_instead_of_overflowing() {
        assert_eq!(with_jitter(Duration::MAX), Duration::MAX);
    }
}
