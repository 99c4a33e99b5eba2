//! @ai:module:intent Executor configuration shared by both variants
//! @ai:module:layer domain
//! @ai:module:public_api ExecutorOptions
//! @ai:module:stateless true

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// @ai:intent Retry, abort and concurrency policy for a batch run
/// @ai:effects pure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorOptions {
    /// Additional attempts after the first one
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub exit_on_error: bool,
    /// Worker count; concurrent variant only
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Per-attempt timeout in seconds; concurrent variant only
    #[serde(default)]
    pub timeout_secs: Option<f64>,
}

fn default_concurrency() -> usize {
    3
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            max_retries: 0,
            exit_on_error: false,
            concurrency: default_concurrency(),
            timeout_secs: None,
        }
    }
}

impl ExecutorOptions {
    /// @ai:intent Set the retry budget
    /// @ai:effects pure
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_exit_on_error(mut self, exit_on_error: bool) -> Self {
        self.exit_on_error = exit_on_error;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs_f64());
        self
    }

    /// @ai:intent Total attempts allowed per item
    /// @ai:effects pure
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// @ai:intent Per-attempt timeout as a Duration
    /// @ai:pre validate() succeeded
    /// @ai:effects pure
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }

    /// @ai:intent Reject malformed configuration before any work starts
    /// @ai:effects pure
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }

        if let Some(secs) = self.timeout_secs {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "timeout must be a positive number of seconds, got {}",
                    secs
                )));
            }
            if Duration::try_from_secs_f64(secs).is_err() {
                return Err(Error::InvalidConfig(format!(
                    "timeout of {} seconds is too large",
                    secs
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ExecutorOptions::default();
        assert_eq!(options.max_attempts(), 1);
        assert_eq!(options.concurrency, 3);
        assert!(!options.exit_on_error);
        assert!(options.timeout().is_none());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let options = ExecutorOptions::default().with_concurrency(0);
        assert!(matches!(options.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_negative_timeout() {
        let options = ExecutorOptions {
            timeout_secs: Some(-1.0),
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unrepresentable_timeout() {
        let options = ExecutorOptions {
            timeout_secs: Some(1e30),
            ..Default::default()
        };
        assert!(matches!(options.validate(), Err(Error::InvalidConfig(_))));
        assert!(options.timeout().is_none());
    }

    #[test]
    fn test_deserialize_partial_table() {
        let options: ExecutorOptions = toml::from_str("max_retries = 4\ntimeout_secs = 2.5").unwrap();
        assert_eq!(options.max_attempts(), 5);
        assert_eq!(options.concurrency, 3);
        assert_eq!(options.timeout(), Some(Duration::from_millis(2500)));
    }
}
