//! Configuration for the matching engine.

use crate::error::{MatchError, Result};
use crate::types::{COMPATIBILITY_THRESHOLD, TIMEZONE_WINDOW_HOURS};
use serde::{Deserialize, Serialize};

/// Main configuration for the matching engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Minimum pairwise cosine similarity for compatibility
    pub compatibility_threshold: f32,

    /// Neighbors requested per candidate retrieval. Capped at the index
    /// boundary to bound downstream pairwise-verification cost.
    pub top_k: usize,

    /// Half-width of the timezone window around the joining user's offset
    pub timezone_window_hours: i32,

    /// Retry policy for transient index failures
    pub retry: RetryConfig,

    /// Background reconciliation of the waiting pool
    pub reconcile: ReconcileConfig,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            compatibility_threshold: COMPATIBILITY_THRESHOLD,
            top_k: 50,
            timezone_window_hours: TIMEZONE_WINDOW_HOURS,
            retry: RetryConfig::default(),
            reconcile: ReconcileConfig::default(),
        }
    }
}

impl MatchingConfig {
    /// Validate configuration bounds.
    pub fn validate(&self) -> Result<()> {
        if !(-1.0..=1.0).contains(&self.compatibility_threshold) {
            return Err(MatchError::invalid_input(
                "compatibility_threshold must lie in [-1, 1]",
            ));
        }
        if self.top_k == 0 {
            return Err(MatchError::invalid_input("top_k must be positive"));
        }
        if self.timezone_window_hours < 0 {
            return Err(MatchError::invalid_input(
                "timezone_window_hours must be non-negative",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(MatchError::invalid_input("retry.max_attempts must be positive"));
        }
        // A zero period would panic in the scheduler's interval timer.
        if self.reconcile.interval_seconds == 0 {
            return Err(MatchError::invalid_input(
                "reconcile.interval_seconds must be positive",
            ));
        }
        Ok(())
    }
}

/// Bounded exponential backoff for transient external failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first
    pub max_attempts: usize,

    /// Delay before the first retry
    pub initial_backoff_ms: u64,

    /// Ceiling applied to the doubled delay
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 100,
            max_backoff_ms: 2_000,
        }
    }
}

/// Waiting pool reconciliation scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Period of the background reconcile sweep
    pub interval_seconds: u64,

    /// Pool size that triggers an immediate reconcile on enqueue
    pub trigger_pool_size: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 300,
            trigger_pool_size: crate::types::MIN_SQUAD_SIZE,
        }
    }
}
