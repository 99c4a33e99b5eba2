//! @ai:module:intent Transparent rate-limit absorption around generation functions
//! @ai:module:layer infrastructure
//! @ai:module:public_api RateLimiter, AdaptiveTokenBucket, RateLimitConfig
//! @ai:module:stateless false

pub mod bucket;

pub use bucket::{AdaptiveTokenBucket, RateLimitConfig};

use crate::error::Result;
use crate::executor::{ExecutorError, StopSignal};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

/// @ai:intent Wraps generation functions so matching rate-limit errors never reach the executor
///            A rate-limited call that eventually succeeds looks like one slow attempt
#[derive(Clone)]
pub struct RateLimiter {
    bucket: Arc<AdaptiveTokenBucket>,
    error_kinds: Arc<Vec<String>>,
    max_rate_limit_retries: Option<u32>,
    stop_signal: Option<StopSignal>,
}

impl RateLimiter {
    /// @ai:intent Create a limiter from configuration
    /// @ai:effects pure
    pub fn new(config: &RateLimitConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            bucket: Arc::new(AdaptiveTokenBucket::new(config)),
            error_kinds: Arc::new(config.error_kinds.clone()),
            max_rate_limit_retries: config.max_rate_limit_retries,
            stop_signal: None,
        })
    }

    /// @ai:intent Cap the number of absorbed rate-limit errors per call
    /// @ai:effects pure
    pub fn with_max_rate_limit_retries(mut self, max: u32) -> Self {
        self.max_rate_limit_retries = Some(max);
        self
    }

    /// @ai:intent Stop re-invoking once the batch stops; the last rate-limit error is returned
    /// @ai:effects pure
    pub fn with_stop_signal(mut self, signal: StopSignal) -> Self {
        self.stop_signal = Some(signal);
        self
    }

    fn is_stopped(&self) -> bool {
        self.stop_signal.as_ref().is_some_and(StopSignal::is_stopped)
    }

    /// @ai:intent Wait for a token; false when the batch stopped first
    /// @ai:effects time
    async fn wait_unless_stopped(&self) -> bool {
        match &self.stop_signal {
            Some(signal) => tokio::select! {
                _ = self.bucket.wait_until_ready() => !signal.is_stopped(),
                _ = signal.stopped() => false,
            },
            None => {
                self.bucket.wait_until_ready().await;
                true
            }
        }
    }

    /// @ai:intent Whether this limiter absorbs the given error
    /// @ai:effects pure
    pub fn matches(&self, err: &ExecutorError) -> bool {
        err.rate_limit_kind()
            .map(|kind| self.error_kinds.iter().any(|k| k == kind))
            .unwrap_or(false)
    }

    /// @ai:intent Record an absorbed error; false when the retry cap is exceeded
    /// @ai:effects state:write
    fn absorb(&self, err: &ExecutorError, absorbed: u32, request_started: Instant) -> bool {
        if let Some(max) = self.max_rate_limit_retries {
            if absorbed > max {
                tracing::warn!(
                    "Rate limit retries exhausted after {} rate-limited calls: {}",
                    absorbed,
                    err
                );
                return false;
            }
        }

        self.bucket.on_rate_limit_error(request_started);
        tracing::debug!("Absorbed rate limit error #{}: {}", absorbed, err);
        true
    }

    /// @ai:intent Invoke an async function, retrying the same input while it is rate limited
    /// @ai:effects time, io (whatever f does)
    pub async fn call<I, O, F, Fut>(&self, f: &F, input: I) -> std::result::Result<O, ExecutorError>
    where
        I: Clone,
        F: Fn(I) -> Fut,
        Fut: Future<Output = std::result::Result<O, ExecutorError>>,
    {
        let mut absorbed = 0u32;
        let mut request_started = Instant::now();
        self.bucket.wait_until_ready().await;

        loop {
            match f(input.clone()).await {
                Err(err) if self.matches(&err) => {
                    absorbed += 1;
                    if !self.absorb(&err, absorbed, request_started) {
                        return Err(err);
                    }

                    request_started = Instant::now();
                    if self.is_stopped() || !self.wait_unless_stopped().await {
                        tracing::debug!("Batch stopped; not retrying rate-limited call");
                        return Err(err);
                    }
                }
                outcome => return outcome,
            }
        }
    }

    /// @ai:intent Blocking counterpart of call
    /// @ai:effects time, io (whatever f does)
    pub fn call_blocking<I, O, F>(&self, f: &F, input: I) -> std::result::Result<O, ExecutorError>
    where
        I: Clone,
        F: Fn(I) -> std::result::Result<O, ExecutorError>,
    {
        let mut absorbed = 0u32;

        loop {
            let request_started = Instant::now();
            self.bucket.wait_until_ready_blocking();

            match f(input.clone()) {
                Err(err) if self.matches(&err) => {
                    absorbed += 1;
                    if !self.absorb(&err, absorbed, request_started) {
                        return Err(err);
                    }
                    if self.is_stopped() {
                        tracing::debug!("Batch stopped; not retrying rate-limited call");
                        return Err(err);
                    }
                }
                outcome => return outcome,
            }
        }
    }

    /// @ai:intent Wrap an async generation function; the result has the same signature
    ///            Wrapping an already wrapped function throttles each taxonomy independently
    /// @ai:effects pure
    pub fn wrap<I, O, F, Fut>(
        &self,
        f: F,
    ) -> impl Fn(I) -> BoxFuture<'static, std::result::Result<O, ExecutorError>> + Send + Sync + 'static
    where
        I: Clone + Send + 'static,
        O: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<O, ExecutorError>> + Send + 'static,
    {
        let limiter = self.clone();
        let f = Arc::new(f);

        move |input: I| {
            let limiter = limiter.clone();
            let f = f.clone();
            async move { limiter.call(&*f, input).await }.boxed()
        }
    }

    /// @ai:intent Wrap a blocking generation function; the result has the same signature
    /// @ai:effects pure
    pub fn wrap_blocking<I, O, F>(
        &self,
        f: F,
    ) -> impl Fn(I) -> std::result::Result<O, ExecutorError>
    where
        I: Clone,
        F: Fn(I) -> std::result::Result<O, ExecutorError>,
    {
        let limiter = self.clone();
        move |input: I| limiter.call_blocking(&f, input)
    }
}
