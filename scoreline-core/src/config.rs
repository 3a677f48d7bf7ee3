//! Tunable configuration for the sync core.
//!
//! The backoff curve and attempt cap are configuration, not contract; the
//! defaults here match the retry policy used elsewhere in the project.

/// Retry policy for the sync engine.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts before an action becomes terminal.
    pub max_attempts: u32,
    /// Initial delay between attempts in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay between attempts in milliseconds.
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff.
    pub multiplier: f64,
    /// Per-call timeout in milliseconds; an elapsed timeout counts as a
    /// retryable failure.
    pub call_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 100,
            max_delay_ms: 10_000,
            multiplier: 2.0,
            call_timeout_ms: 15_000,
        }
    }
}

impl RetryConfig {
    /// A policy with no delays, for deterministic tests.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            initial_delay_ms: 0,
            max_delay_ms: 0,
            ..Self::default()
        }
    }

    /// Calculate the backoff delay for a given attempt number (0-indexed).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
        #[allow(clippy::cast_sign_loss)]
        {
            let base_delay = self.initial_delay_ms as f64 * self.multiplier.powi(attempt as i32);
            base_delay.min(self.max_delay_ms as f64) as u64
        }
    }
}

/// Capacity limits for the local action log.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum queued actions before the oldest pending entries are evicted.
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 500 }
    }
}

/// Debounce policy for connectivity-driven sync requests.
#[derive(Debug, Clone)]
pub struct DebounceConfig {
    /// Window in milliseconds during which repeated online transitions
    /// collapse into a single sync request.
    pub window_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self { window_ms: 2_000 }
    }
}
