//! Retry Controller
//!
//! Wraps [`LlmProvider::dispatch`] with bounded exponential backoff.
//!
//! ## Policy
//!
//! - Delay before attempt `n + 1` is `min(base * 2^(n-1), max_delay)` plus
//!   uniform jitter in `[0, delay / 2]`, raised to any `retry_after` hint
//! - Only transient errors retry; fatal errors return after one attempt
//! - At most `max_attempts` dispatches per call
//! - Every dispatch is bounded by what is left of `timeout_ceiling`; a backoff
//!   that would cross the ceiling aborts instead of sleeping
//! - The caller's deadline and cancellation token interrupt both in-flight
//!   dispatches and backoff sleeps

use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::defaults::{
    DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY_MS, DEFAULT_TIMEOUT_CEILING_SECS,
};
use crate::error::AnalysisError;
use crate::llm::{LlmProvider, ModelConfig, ProviderError};
use crate::prompt::Prompt;
use crate::types::{AttemptRecord, CallOutcome, ProviderCall};

/// Caps the shift in the backoff doubling.
const MAX_BACKOFF_EXPONENT: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Total wall time for one call, backoff included
    pub timeout_ceiling: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            timeout_ceiling: Duration::from_secs(DEFAULT_TIMEOUT_CEILING_SECS),
        }
    }
}

impl RetryPolicy {
    /// Backoff after failed attempt `attempt` (1-based), before jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    fn delay_with_jitter(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let delay = self.backoff(attempt);
        let half_ms = u64::try_from(delay.as_millis() / 2).unwrap_or(u64::MAX);
        let jitter = if half_ms > 0 {
            Duration::from_millis(rand::thread_rng().gen_range(0..=half_ms))
        } else {
            Duration::ZERO
        };
        let delay = delay.saturating_add(jitter);
        retry_after.map_or(delay, |hint| delay.max(hint))
    }
}

/// Caller-side limits for one analysis request.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub deadline: Option<Instant>,
    pub cancel: CancellationToken,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A timeout too large to represent as an instant means no deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

async fn deadline_reached(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Dispatch `prompt` until it succeeds, fails fatally, or the budget runs out.
    pub async fn call_with_retry(
        &self,
        provider: &dyn LlmProvider,
        prompt: &Prompt,
        model: &ModelConfig,
        ctx: &CallContext,
    ) -> Result<ProviderCall, AnalysisError> {
        let kind = prompt.kind();
        let started = Instant::now();
        // None: the ceiling lies beyond any representable instant
        let ceiling_at = started.checked_add(self.policy.timeout_ceiling);
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut last_error = String::new();

        let exhausted = |attempts: u32, last_error: String| AnalysisError::RetryBudgetExhausted {
            kind,
            attempts,
            elapsed_ms: started.elapsed().as_millis(),
            last_error,
        };

        for attempt in 1..=max_attempts {
            if ctx.cancel.is_cancelled() {
                return Err(AnalysisError::Cancelled {
                    kind,
                    attempts: attempt - 1,
                });
            }
            if ctx.deadline_passed() {
                return Err(AnalysisError::DeadlineExceeded {
                    kind,
                    attempts: attempt - 1,
                });
            }

            let dispatch_started = Instant::now();
            let remaining = ceiling_at.map_or(self.policy.timeout_ceiling, |at| {
                at.saturating_duration_since(dispatch_started)
            });
            debug!(
                kind = %kind,
                attempt,
                digest = %prompt.digest(),
                remaining_ms = remaining.as_millis(),
                "Dispatching prompt"
            );

            let result = tokio::select! {
                biased;
                () = ctx.cancel.cancelled() => {
                    return Err(AnalysisError::Cancelled { kind, attempts: attempt });
                }
                () = deadline_reached(ctx.deadline) => {
                    return Err(AnalysisError::DeadlineExceeded { kind, attempts: attempt });
                }
                result = tokio::time::timeout(remaining, provider.dispatch(prompt, model)) => result,
            };
            let latency = dispatch_started.elapsed();

            let error = match result {
                Ok(Ok(reply)) => {
                    attempts.push(AttemptRecord {
                        attempt_number: attempt,
                        outcome: CallOutcome::Success,
                        latency,
                        error: None,
                        backoff: None,
                    });
                    let call = ProviderCall {
                        call_id: Uuid::new_v4(),
                        provider_id: provider.provider_id().to_string(),
                        model_id: model.model_id.clone(),
                        prompt: prompt.text().to_string(),
                        raw_response: Some(reply.text),
                        latency: started.elapsed(),
                        attempt_number: attempt,
                        outcome: CallOutcome::Success,
                        usage: reply.usage,
                        attempts,
                    };
                    info!(
                        kind = %kind,
                        provider = %call.provider_id,
                        attempt,
                        latency_ms = call.latency.as_millis(),
                        tokens = call.usage.total(),
                        "Provider call succeeded"
                    );
                    return Ok(call);
                }
                Ok(Err(err)) if !err.is_transient() => {
                    warn!(kind = %kind, attempt, error = %err, "Fatal provider error, not retrying");
                    return Err(err.into_fatal(provider.provider_id()));
                }
                Ok(Err(err)) => err,
                Err(_) => {
                    warn!(kind = %kind, attempt, "Dispatch cut off at the retry ceiling");
                    return Err(exhausted(
                        attempt,
                        format!(
                            "dispatch still running at the {}s ceiling",
                            self.policy.timeout_ceiling.as_secs_f32()
                        ),
                    ));
                }
            };

            last_error = error.to_string();
            let mut record = AttemptRecord {
                attempt_number: attempt,
                outcome: CallOutcome::TransientFailure,
                latency,
                error: Some(last_error.clone()),
                backoff: None,
            };

            if attempt == max_attempts {
                attempts.push(record);
                break;
            }

            let delay = self.policy.delay_with_jitter(attempt, error.retry_after());
            let crosses_ceiling = match (Instant::now().checked_add(delay), ceiling_at) {
                (Some(resume_at), Some(ceiling_at)) => resume_at > ceiling_at,
                (Some(_), None) => false,
                (None, _) => true,
            };
            if crosses_ceiling {
                warn!(
                    kind = %kind,
                    attempt,
                    delay_ms = delay.as_millis(),
                    "Next backoff would cross the retry ceiling, giving up"
                );
                return Err(exhausted(attempt, last_error));
            }

            record.backoff = Some(delay);
            attempts.push(record);
            warn!(
                kind = %kind,
                attempt,
                max_attempts,
                error = %error,
                next_retry_ms = delay.as_millis(),
                "Transient provider error, backing off"
            );

            tokio::select! {
                biased;
                () = ctx.cancel.cancelled() => {
                    return Err(AnalysisError::Cancelled { kind, attempts: attempt });
                }
                () = deadline_reached(ctx.deadline) => {
                    return Err(AnalysisError::DeadlineExceeded { kind, attempts: attempt });
                }
                () = tokio::time::sleep(delay) => {}
            }
        }

        warn!(
            kind = %kind,
            attempts = attempts.len(),
            error = %last_error,
            "Retry budget exhausted"
        );
        Err(exhausted(max_attempts, last_error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockProvider, ScriptedFailure};
    use crate::types::EntityKind;
    use tokio_test::{assert_err, assert_ok};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            timeout_ceiling: Duration::from_secs(5),
        }
    }

    fn rate_limited() -> ScriptedFailure {
        ScriptedFailure::Fail(ProviderError::RateLimited {
            retry_after: None,
            message: "slow down".to_string(),
        })
    }

    fn prompt() -> Prompt {
        Prompt::new(EntityKind::Campaign, "DATA:\n```json\n[{\"id\": \"c1\"}]\n```")
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            timeout_ceiling: Duration::from_secs(120),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_secs(1));
        assert_eq!(policy.backoff(3), Duration::from_secs(2));
        assert_eq!(policy.backoff(9), Duration::from_secs(8));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(8));
    }

    #[test]
    fn jitter_stays_within_half_the_delay() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let delay = policy.delay_with_jitter(2, None);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_millis(1500));
        }
        let hinted = policy.delay_with_jitter(1, Some(Duration::from_secs(30)));
        assert_eq!(hinted, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn rate_limited_twice_then_success() {
        let mock = MockProvider::with_script([rate_limited(), rate_limited()]);
        let controller = RetryController::new(fast_policy());

        let call = assert_ok!(
            controller
                .call_with_retry(&mock, &prompt(), &ModelConfig::new("mock-model"), &CallContext::new())
                .await
        );

        assert_eq!(call.outcome, CallOutcome::Success);
        assert_eq!(call.attempt_number, 3);
        assert_eq!(call.retries(), 2);
        assert!(call.raw_response.is_some());
        assert_eq!(call.attempts.len(), 3);
        assert_eq!(call.attempts[0].outcome, CallOutcome::TransientFailure);
        assert!(call.attempts[0].backoff.is_some());
        assert_eq!(mock.dispatch_count(), 3);
    }

    #[tokio::test]
    async fn authentication_error_is_not_retried() {
        let mock = MockProvider::with_script([ScriptedFailure::Fail(ProviderError::Authentication {
            message: "invalid x-api-key".to_string(),
        })]);
        let controller = RetryController::new(fast_policy());

        let err = assert_err!(
            controller
                .call_with_retry(&mock, &prompt(), &ModelConfig::new("mock-model"), &CallContext::new())
                .await
        );

        assert!(matches!(err, AnalysisError::Authentication { .. }));
        assert_eq!(mock.dispatch_count(), 1);
    }

    #[tokio::test]
    async fn never_exceeds_max_attempts() {
        let mock = MockProvider::with_script((0..10).map(|_| {
            ScriptedFailure::Fail(ProviderError::ProviderServer {
                status: 503,
                message: "overloaded".to_string(),
            })
        }));
        let controller = RetryController::new(fast_policy());

        let err = assert_err!(
            controller
                .call_with_retry(&mock, &prompt(), &ModelConfig::new("mock-model"), &CallContext::new())
                .await
        );

        match err {
            AnalysisError::RetryBudgetExhausted {
                attempts, last_error, ..
            } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("overloaded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(mock.dispatch_count(), 3);
    }

    #[tokio::test]
    async fn backoff_past_the_ceiling_aborts_without_sleeping() {
        let mock = MockProvider::with_script([rate_limited()]);
        let controller = RetryController::new(RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(10),
            timeout_ceiling: Duration::from_millis(200),
        });

        let started = std::time::Instant::now();
        let err = assert_err!(
            controller
                .call_with_retry(&mock, &prompt(), &ModelConfig::new("mock-model"), &CallContext::new())
                .await
        );

        assert!(matches!(err, AnalysisError::RetryBudgetExhausted { attempts: 1, .. }));
        assert!(started.elapsed() < Duration::from_millis(200));
        assert_eq!(mock.dispatch_count(), 1);
    }

    #[tokio::test]
    async fn huge_retry_after_hint_exhausts_the_budget() {
        let mock = MockProvider::with_script([ScriptedFailure::Fail(ProviderError::RateLimited {
            retry_after: Some(Duration::from_secs(u64::MAX)),
            message: "come back never".to_string(),
        })]);
        let controller = RetryController::new(fast_policy());

        let started = std::time::Instant::now();
        let err = assert_err!(
            controller
                .call_with_retry(&mock, &prompt(), &ModelConfig::new("mock-model"), &CallContext::new())
                .await
        );

        assert!(matches!(err, AnalysisError::RetryBudgetExhausted { attempts: 1, .. }), "{err}");
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(mock.dispatch_count(), 1);
    }

    #[tokio::test]
    async fn unrepresentable_ceiling_and_deadline_do_not_panic() {
        let mock = MockProvider::with_script([rate_limited()]);
        let controller = RetryController::new(RetryPolicy {
            timeout_ceiling: Duration::MAX,
            ..fast_policy()
        });
        let ctx = CallContext::with_timeout(Duration::MAX);
        assert!(ctx.deadline.is_none());

        let call = assert_ok!(
            controller
                .call_with_retry(&mock, &prompt(), &ModelConfig::new("mock-model"), &ctx)
                .await
        );
        assert_eq!(call.attempt_number, 2);
    }

    #[tokio::test]
    async fn slow_dispatch_is_bounded_by_the_ceiling() {
        let mock = MockProvider::with_script([ScriptedFailure::Stall(Duration::from_secs(5))]);
        let controller = RetryController::new(RetryPolicy {
            timeout_ceiling: Duration::from_millis(100),
            ..fast_policy()
        });

        let started = std::time::Instant::now();
        let err = assert_err!(
            controller
                .call_with_retry(&mock, &prompt(), &ModelConfig::new("mock-model"), &CallContext::new())
                .await
        );

        assert!(matches!(err, AnalysisError::RetryBudgetExhausted { .. }));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn deadline_during_backoff_surfaces_promptly() {
        let mock = MockProvider::with_script([rate_limited()]);
        let controller = RetryController::new(RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(4),
            timeout_ceiling: Duration::from_secs(60),
        });
        let ctx = CallContext::with_timeout(Duration::from_millis(50));

        let started = std::time::Instant::now();
        let err = assert_err!(
            controller
                .call_with_retry(&mock, &prompt(), &ModelConfig::new("mock-model"), &ctx)
                .await
        );

        assert!(matches!(err, AnalysisError::DeadlineExceeded { attempts: 1, .. }));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn cancellation_stops_an_in_flight_dispatch() {
        let mock = MockProvider::with_script([ScriptedFailure::Stall(Duration::from_secs(5))]);
        let controller = RetryController::new(fast_policy());
        let ctx = CallContext::new();
        let cancel = ctx.cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let err = assert_err!(
            controller
                .call_with_retry(&mock, &prompt(), &ModelConfig::new("mock-model"), &ctx)
                .await
        );
        assert!(matches!(err, AnalysisError::Cancelled { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn retry_after_hint_is_respected() {
        let mock = MockProvider::with_script([ScriptedFailure::Fail(ProviderError::RateLimited {
            retry_after: Some(Duration::from_millis(60)),
            message: "slow down".to_string(),
        })]);
        let controller = RetryController::new(fast_policy());

        let started = std::time::Instant::now();
        let call = assert_ok!(
            controller
                .call_with_retry(&mock, &prompt(), &ModelConfig::new("mock-model"), &CallContext::new())
                .await
        );

        assert_eq!(call.attempt_number, 2);
        assert!(started.elapsed() >= Duration::from_millis(60));
        assert_eq!(call.attempts[0].backoff, Some(Duration::from_millis(60)));
    }
}
