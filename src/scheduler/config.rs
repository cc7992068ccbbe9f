//! Scheduler configuration: strategy, concurrency, retries, propagation.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::executor::ResourceLimits;

/// How the scheduler walks the execution plan.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// One node at a time, in level order then definition order.
    Sequential,
    /// Level by level; within a level up to `max_concurrency` nodes run
    /// concurrently, the next admitted as soon as a slot frees.
    #[default]
    Parallel,
    /// As [`Strategy::Parallel`], but single-node levels run inline without
    /// task-spawn overhead.
    Hybrid,
    /// A global ready queue: any node whose dependencies have all completed
    /// may be admitted, regardless of level boundaries, capacity permitting.
    Adaptive,
}

impl Strategy {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Sequential => "sequential",
            Strategy::Parallel => "parallel",
            Strategy::Hybrid => "hybrid",
            Strategy::Adaptive => "adaptive",
        }
    }
}

/// Delay curve between retry attempts.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// `initial_delay * attempt`.
    Linear,
    /// `initial_delay * 2^attempt`, capped at `max_delay`.
    #[default]
    Exponential,
    /// Always `initial_delay`.
    Fixed,
}

/// Retry behavior for failed node attempts.
///
/// An attempt is re-admitted only when the error's kind string (see
/// [`NodeError::kind`](crate::executor::NodeError::kind)) appears in
/// `retryable_errors` and attempts remain.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first (3 means up to 2 retries).
    pub max_attempts: u32,
    pub backoff: BackoffStrategy,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub retryable_errors: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::Exponential,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            retryable_errors: vec!["transient".to_string()],
        }
    }
}

impl RetryPolicy {
    /// Whether an error kind is eligible for retry.
    #[must_use]
    pub fn is_retryable(&self, kind: &str) -> bool {
        self.retryable_errors.iter().any(|k| k == kind)
    }

    /// Delay before the given retry (`attempt` is 1-based: 1 for the first
    /// re-admission).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = match self.backoff {
            BackoffStrategy::Linear => self.initial_delay.saturating_mul(attempt),
            BackoffStrategy::Exponential => self
                .initial_delay
                .saturating_mul(2u32.saturating_pow(attempt)),
            BackoffStrategy::Fixed => self.initial_delay,
        };
        delay.min(self.max_delay)
    }
}

/// What happens to the rest of the graph when a node fails for good.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailurePropagation {
    /// First unrecoverable failure cancels in-flight and unstarted nodes.
    #[default]
    FailFast,
    /// Independent branches keep running; transitive dependents of the
    /// failed node are skipped.
    Continue,
    /// Compensation hooks run for completed ancestors of the failed node,
    /// in reverse completion order, then the execution finalizes as failed.
    Compensate,
}

/// Full configuration for one `execute` call.
///
/// # Examples
///
/// ```rust
/// use gridflow::scheduler::{ExecutionConfig, FailurePropagation, Strategy};
/// use std::time::Duration;
///
/// let config = ExecutionConfig::default()
///     .with_strategy(Strategy::Adaptive)
///     .with_max_concurrency(8)
///     .with_timeout(Duration::from_secs(30))
///     .with_failure_propagation(FailurePropagation::Continue);
/// assert_eq!(config.max_concurrency, 8);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExecutionConfig {
    pub strategy: Strategy,
    /// Upper bound on concurrently executing nodes (at least 1).
    pub max_concurrency: usize,
    /// Global deadline for the whole execution.
    pub timeout: Option<Duration>,
    /// Default per-node deadline; a node's `timeout_ms` config overrides it.
    pub node_timeout: Option<Duration>,
    pub retry_policy: RetryPolicy,
    pub failure_propagation: FailurePropagation,
    pub resource_limits: ResourceLimits,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            max_concurrency: 4,
            timeout: None,
            node_timeout: None,
            retry_policy: RetryPolicy::default(),
            failure_propagation: FailurePropagation::default(),
            resource_limits: ResourceLimits::default(),
        }
    }
}

impl ExecutionConfig {
    #[must_use]
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    #[must_use]
    pub fn with_failure_propagation(mut self, failure_propagation: FailurePropagation) -> Self {
        self.failure_propagation = failure_propagation;
        self
    }

    #[must_use]
    pub fn with_resource_limits(mut self, resource_limits: ResourceLimits) -> Self {
        self.resource_limits = resource_limits;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_backoff_scales_with_attempt() {
        let policy = RetryPolicy {
            backoff: BackoffStrategy::Linear,
            initial_delay: Duration::from_millis(100),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(3), Duration::from_millis(300));
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let policy = RetryPolicy {
            backoff: BackoffStrategy::Exponential,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(500));
        assert_eq!(policy.delay_for(10), Duration::from_millis(500));
    }

    #[test]
    fn fixed_backoff_ignores_attempt() {
        let policy = RetryPolicy {
            backoff: BackoffStrategy::Fixed,
            initial_delay: Duration::from_millis(250),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(1), policy.delay_for(7));
    }

    #[test]
    fn retryability_is_kind_based() {
        let policy = RetryPolicy::default();
        assert!(policy.is_retryable("transient"));
        assert!(!policy.is_retryable("validation"));
    }

    #[test]
    fn max_concurrency_floors_at_one() {
        let config = ExecutionConfig::default().with_max_concurrency(0);
        assert_eq!(config.max_concurrency, 1);
    }
}
