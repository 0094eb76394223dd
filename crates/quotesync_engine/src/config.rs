//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use quotesync_protocol::Strategy;
use rand::Rng;
use std::time::Duration;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Period of the automatic sync trigger.
    pub sync_interval: Duration,
    /// Strategy used for conflicts until [`set_strategy`] changes it.
    ///
    /// [`set_strategy`]: crate::SyncEngine::set_strategy
    pub default_strategy: Strategy,
    /// Upper bound for a single fetch or upload call.
    pub fetch_timeout: Duration,
    /// Retry configuration for failed fetches.
    pub retry: RetryConfig,
    /// Whether pending local items are uploaded after each applied cycle.
    pub upload_pending: bool,
    /// How often a cycle re-resolves after losing an apply race with an insert.
    pub max_apply_attempts: u32,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(
        sync_interval: Duration,
        default_strategy: Strategy,
        fetch_timeout: Duration,
        retry: RetryConfig,
    ) -> Self {
        Self {
            sync_interval,
            default_strategy,
            fetch_timeout,
            retry,
            upload_pending: true,
            max_apply_attempts: 3,
        }
    }

    /// Sets the automatic sync interval.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the default conflict strategy.
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.default_strategy = strategy;
        self
    }

    /// Sets the fetch timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Enables or disables uploading of pending items.
    pub fn with_upload_pending(mut self, upload: bool) -> Self {
        self.upload_pending = upload;
        self
    }

    /// Sets the number of apply attempts per cycle.
    pub fn with_max_apply_attempts(mut self, attempts: u32) -> Self {
        self.max_apply_attempts = attempts;
        self
    }

    /// Checks that the configuration can drive an engine.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] for zero durations or attempt
    /// counts, and for a backoff multiplier that is not a finite number of
    /// at least 1.
    pub fn validate(&self) -> SyncResult<()> {
        if self.sync_interval.is_zero() {
            return Err(SyncError::InvalidConfig("sync interval must be non-zero".into()));
        }
        if self.fetch_timeout.is_zero() {
            return Err(SyncError::InvalidConfig("fetch timeout must be non-zero".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(SyncError::InvalidConfig(
                "retry max_attempts must be at least 1".into(),
            ));
        }
        let multiplier = self.retry.backoff_multiplier;
        if !(multiplier.is_finite() && multiplier >= 1.0) {
            return Err(SyncError::InvalidConfig(format!(
                "backoff multiplier must be finite and at least 1, got {multiplier}"
            )));
        }
        if self.max_apply_attempts == 0 {
            return Err(SyncError::InvalidConfig(
                "max_apply_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(30),
            Strategy::ServerWins,
            Duration::from_secs(10),
            RetryConfig::default(),
        )
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of fetch attempts, the first one included.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.add_jitter = jitter;
        self
    }

    /// Calculates the delay before a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        // NaN collapses to the cap; negatives to zero.
        let delay_secs = base_delay.min(self.max_delay.as_secs_f64()).max(0.0);

        if self.add_jitter {
            // Up to 25% jitter
            let jitter = delay_secs * 0.25 * rand::thread_rng().gen::<f64>();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}
