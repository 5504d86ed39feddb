//! Reconnect policies.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::state::CloseKind;

/// Default delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(500);

/// Input to a reconnect decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectContext {
    /// 1-based number of the attempt being considered, counted since the
    /// last established connection.
    pub attempt: u32,
    /// How the previous connection (or attempt) ended.
    pub cause: CloseKind,
}

/// Outcome of a reconnect decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    RetryAfter(Duration),
    GiveUp,
}

/// Exponential back-off bounds.
///
/// The delay starts at `initial_delay` and doubles per attempt, capped at
/// `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl BackoffConfig {
    /// Clamp delays to at least 1 ms and ensure `initial_delay <= max_delay`.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.initial_delay = self.initial_delay.max(Duration::from_millis(1));
        self.max_delay = self.max_delay.max(Duration::from_millis(1));
        if self.initial_delay > self.max_delay {
            std::mem::swap(&mut self.initial_delay, &mut self.max_delay);
        }
        self
    }

    /// Delay before the given 1-based attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        self.initial_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }
}

type DecideFn = dyn Fn(&ReconnectContext) -> ReconnectDecision + Send + Sync;

/// Decides whether, and after how long, a closed link reconnects.
#[derive(Clone)]
pub struct ReconnectPolicy {
    decide: Arc<DecideFn>,
}

impl ReconnectPolicy {
    /// Build a policy from any decision function.
    pub fn new<F>(decide: F) -> Self
    where
        F: Fn(&ReconnectContext) -> ReconnectDecision + Send + Sync + 'static,
    {
        Self {
            decide: Arc::new(decide),
        }
    }

    /// Retry forever with a constant delay.
    pub fn fixed(delay: Duration) -> Self {
        Self::new(move |_| ReconnectDecision::RetryAfter(delay))
    }

    /// Retry forever with exponential back-off.
    pub fn backoff(config: BackoffConfig) -> Self {
        let config = config.normalized();
        Self::new(move |ctx| ReconnectDecision::RetryAfter(config.delay_for(ctx.attempt)))
    }

    /// Never reconnect.
    pub fn never() -> Self {
        Self::new(|_| ReconnectDecision::GiveUp)
    }

    /// Give up once `max` attempts have been made.
    #[must_use]
    pub fn with_max_attempts(self, max: u32) -> Self {
        let inner = self.decide;
        Self::new(move |ctx| {
            if ctx.attempt > max {
                ReconnectDecision::GiveUp
            } else {
                inner(ctx)
            }
        })
    }

    pub fn decide(&self, ctx: &ReconnectContext) -> ReconnectDecision {
        (self.decide)(ctx)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_RECONNECT_DELAY)
    }
}

impl fmt::Debug for ReconnectPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconnectPolicy").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(attempt: u32) -> ReconnectContext {
        ReconnectContext {
            attempt,
            cause: CloseKind::Broken,
        }
    }

    #[test]
    fn default_is_fixed_half_second() {
        assert_eq!(
            ReconnectPolicy::default().decide(&ctx(7)),
            ReconnectDecision::RetryAfter(Duration::from_millis(500))
        );
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = ReconnectPolicy::backoff(BackoffConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        });
        let delays: Vec<_> = (1..=4).map(|n| policy.decide(&ctx(n))).collect();
        assert_eq!(
            delays,
            vec![
                ReconnectDecision::RetryAfter(Duration::from_millis(100)),
                ReconnectDecision::RetryAfter(Duration::from_millis(200)),
                ReconnectDecision::RetryAfter(Duration::from_millis(350)),
                ReconnectDecision::RetryAfter(Duration::from_millis(350)),
            ]
        );
    }

    #[test]
    fn backoff_survives_huge_attempt_counts() {
        let config = BackoffConfig::default();
        assert_eq!(config.delay_for(u32::MAX), config.max_delay);
    }

    #[test]
    fn normalizes_inverted_bounds() {
        let cfg = BackoffConfig {
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::ZERO,
        }
        .normalized();
        assert_eq!(cfg.initial_delay, Duration::from_millis(1));
        assert_eq!(cfg.max_delay, Duration::from_millis(5));
    }

    #[test]
    fn max_attempts_gives_up() {
        let policy = ReconnectPolicy::fixed(Duration::from_millis(1)).with_max_attempts(2);
        assert!(matches!(policy.decide(&ctx(2)), ReconnectDecision::RetryAfter(_)));
        assert_eq!(policy.decide(&ctx(3)), ReconnectDecision::GiveUp);
    }

    #[test]
    fn never_gives_up_immediately() {
        assert_eq!(ReconnectPolicy::never().decide(&ctx(1)), ReconnectDecision::GiveUp);
    }

    #[test]
    fn custom_policy_sees_cause() {
        let policy = ReconnectPolicy::new(|ctx| match ctx.cause {
            CloseKind::ConnectFailed => ReconnectDecision::RetryAfter(Duration::from_secs(2)),
            _ => ReconnectDecision::RetryAfter(Duration::ZERO),
        });
        let failed = ReconnectContext {
            attempt: 1,
            cause: CloseKind::ConnectFailed,
        };
        assert_eq!(
            policy.decide(&failed),
            ReconnectDecision::RetryAfter(Duration::from_secs(2))
        );
    }
}
