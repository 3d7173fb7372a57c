//! Retry policy for the orchestration step.
//!
//! Only the work before dispatch is retried here. Once batches are handed to
//! the dispatcher, failures are recorded per contact and per batch instead.

use crate::config::BackoffConfig;
use crate::error::EnrichmentError;
use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
    jitter_enabled: bool,
    jitter_max_percentage: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.backoff_multiplier,
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter_enabled: config.jitter_enabled,
            jitter_max_percentage: config.jitter_max_percentage,
        }
    }

    /// No retries, no waiting
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            multiplier: 1.0,
            max_delay: Duration::ZERO,
            jitter_enabled: false,
            jitter_max_percentage: 0.0,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total attempts including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Whether a failure on `attempt` (1-based) should be followed by another try
    pub fn should_retry(&self, error: &EnrichmentError, attempt: u32) -> bool {
        error.is_transient() && attempt < self.max_attempts()
    }

    /// Delay before the attempt following `attempt` (1-based), without jitter
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(scaled)
    }

    /// Delay before the attempt following `attempt` (1-based), with jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.base_delay_for(attempt);
        if !self.jitter_enabled || self.jitter_max_percentage <= 0.0 || delay.is_zero() {
            return delay;
        }

        let jitter_range = delay.as_secs_f64() * self.jitter_max_percentage;
        let jitter = rand::rng().random_range(0.0..=jitter_range);
        delay + Duration::from_secs_f64(jitter)
    }
}
