//! Adaptive execution controller.
//!
//! Runs a unit of work through an ordered ladder of strategies, from the most
//! thorough to the cheapest. Rate-limit and overload failures are retried on
//! the same strategy with exponential backoff; timeouts drop to the next
//! strategy; fatal failures end the run immediately.

use std::fmt;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::retry::{FailureKind, RetryPolicy, WorkError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Full,
    Quick,
    Emergency,
}

impl Scope {
    pub fn label(self) -> &'static str {
        match self {
            Scope::Full => "full",
            Scope::Quick => "quick",
            Scope::Emergency => "emergency",
        }
    }

    pub fn uses_search(self) -> bool {
        !matches!(self, Scope::Emergency)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strategy {
    pub name: String,
    pub scope: Scope,
    pub timeout: Duration,
}

impl Strategy {
    pub fn new(name: impl Into<String>, scope: Scope, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            scope,
            timeout,
        }
    }
}

/// Full (10 min) → Quick (5 min) → Emergency (2 min).
pub fn default_strategies() -> Vec<Strategy> {
    strategies_with_timeouts(
        Duration::from_secs(600),
        Duration::from_secs(300),
        Duration::from_secs(120),
    )
}

pub fn strategies_with_timeouts(full: Duration, quick: Duration, emergency: Duration) -> Vec<Strategy> {
    vec![
        Strategy::new("Full Analysis", Scope::Full, full),
        Strategy::new("Quick Analysis", Scope::Quick, quick),
        Strategy::new("Emergency Analysis", Scope::Emergency, emergency),
    ]
}

/// The work a strategy drives. Implementations must not retry internally.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn run(&self, scope: Scope) -> std::result::Result<String, WorkError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptResult {
    pub strategy: String,
    pub scope: Scope,
    /// 1-based attempt number within the strategy.
    pub attempt: u32,
    pub success: bool,
    pub output: Option<String>,
    pub failure: Option<FailureKind>,
    pub error: Option<String>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    AttemptStarted {
        strategy: String,
        scope: Scope,
        attempt: u32,
        timeout: Duration,
    },
    AttemptFailed {
        strategy: String,
        attempt: u32,
        kind: FailureKind,
        message: String,
    },
    RetryScheduled {
        strategy: String,
        retry: u32,
        kind: FailureKind,
        delay: Duration,
    },
    StrategyAdvanced {
        from: String,
        to: String,
    },
    Succeeded {
        strategy: String,
        attempt: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControllerError {
    #[error("all {strategies} strategies exhausted{}", last_error_suffix(.last_error))]
    Exhausted {
        strategies: usize,
        last_error: Option<WorkError>,
    },
    #[error("{strategy} aborted: {source}")]
    Aborted {
        strategy: String,
        #[source]
        source: WorkError,
    },
}

fn last_error_suffix(last_error: &Option<WorkError>) -> String {
    last_error
        .as_ref()
        .map(|err| format!("; last error: {err}"))
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded {
        strategy: String,
        scope: Scope,
        output: String,
    },
    Exhausted {
        last_error: Option<WorkError>,
    },
    Aborted {
        strategy: String,
        error: WorkError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub attempts: Vec<AttemptResult>,
    pub backoff_delays: Vec<Duration>,
    strategy_count: usize,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RunOutcome::Succeeded { .. })
    }

    pub fn output(&self) -> Option<&str> {
        match &self.outcome {
            RunOutcome::Succeeded { output, .. } => Some(output),
            _ => None,
        }
    }

    pub fn attempts_for(&self, strategy: &str) -> usize {
        self.attempts
            .iter()
            .filter(|attempt| attempt.strategy == strategy)
            .count()
    }

    /// Distinct strategies tried, in order.
    pub fn strategies_tried(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for attempt in &self.attempts {
            if names.last() != Some(&attempt.strategy.as_str()) {
                names.push(&attempt.strategy);
            }
        }
        names
    }

    pub fn into_result(self) -> std::result::Result<String, ControllerError> {
        match self.outcome {
            RunOutcome::Succeeded { output, .. } => Ok(output),
            RunOutcome::Exhausted { last_error } => Err(ControllerError::Exhausted {
                strategies: self.strategy_count,
                last_error,
            }),
            RunOutcome::Aborted { strategy, error } => Err(ControllerError::Aborted {
                strategy,
                source: error,
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdaptiveController {
    strategies: Vec<Strategy>,
    policy: RetryPolicy,
}

impl AdaptiveController {
    pub fn new(strategies: Vec<Strategy>, policy: RetryPolicy) -> Result<Self> {
        if strategies.is_empty() {
            return Err(anyhow::anyhow!(
                "at least one analysis strategy is required"
            ));
        }
        if let Some(strategy) = strategies.iter().find(|s| s.timeout.is_zero()) {
            return Err(anyhow::anyhow!(
                "strategy '{}' has a zero timeout",
                strategy.name
            ));
        }
        policy.validate()?;
        Ok(Self { strategies, policy })
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn run(&self, work: &dyn UnitOfWork) -> RunReport {
        self.run_with_observer(work, &mut |_| {}).await
    }

    pub async fn run_with_observer(
        &self,
        work: &dyn UnitOfWork,
        observe: &mut (dyn FnMut(&ControllerEvent) + Send),
    ) -> RunReport {
        let mut attempts = Vec::<AttemptResult>::new();
        let mut backoff_delays = Vec::<Duration>::new();
        let mut last_error: Option<WorkError> = None;
        let finish = |outcome, attempts, backoff_delays| RunReport {
            outcome,
            attempts,
            backoff_delays,
            strategy_count: self.strategies.len(),
        };

        for (index, strategy) in self.strategies.iter().enumerate() {
            let mut retries = 0u32;
            let mut previous_delay: Option<Duration> = None;

            loop {
                let attempt = retries + 1;
                observe(&ControllerEvent::AttemptStarted {
                    strategy: strategy.name.clone(),
                    scope: strategy.scope,
                    attempt,
                    timeout: strategy.timeout,
                });
                tracing::info!(
                    strategy = %strategy.name,
                    scope = %strategy.scope,
                    attempt,
                    timeout_secs = strategy.timeout.as_secs(),
                    "starting strategy attempt"
                );

                let started = Instant::now();
                let result =
                    match tokio::time::timeout(strategy.timeout, work.run(strategy.scope)).await {
                        Ok(result) => result,
                        Err(_) => Err(WorkError::timeout(format!(
                            "{} timed out after {}s",
                            strategy.name,
                            strategy.timeout.as_secs()
                        ))),
                    };
                let elapsed = started.elapsed();

                let err = match result {
                    Ok(output) => {
                        tracing::info!(
                            strategy = %strategy.name,
                            attempt,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "strategy succeeded"
                        );
                        attempts.push(AttemptResult {
                            strategy: strategy.name.clone(),
                            scope: strategy.scope,
                            attempt,
                            success: true,
                            output: Some(output.clone()),
                            failure: None,
                            error: None,
                            elapsed,
                        });
                        observe(&ControllerEvent::Succeeded {
                            strategy: strategy.name.clone(),
                            attempt,
                        });
                        return finish(
                            RunOutcome::Succeeded {
                                strategy: strategy.name.clone(),
                                scope: strategy.scope,
                                output,
                            },
                            attempts,
                            backoff_delays,
                        );
                    }
                    Err(err) => err,
                };

                tracing::warn!(
                    strategy = %strategy.name,
                    attempt,
                    kind = %err.kind,
                    error = %err.message,
                    "strategy attempt failed"
                );
                attempts.push(AttemptResult {
                    strategy: strategy.name.clone(),
                    scope: strategy.scope,
                    attempt,
                    success: false,
                    output: None,
                    failure: Some(err.kind),
                    error: Some(err.message.clone()),
                    elapsed,
                });
                observe(&ControllerEvent::AttemptFailed {
                    strategy: strategy.name.clone(),
                    attempt,
                    kind: err.kind,
                    message: err.message.clone(),
                });

                match err.kind {
                    FailureKind::Fatal => {
                        tracing::error!(strategy = %strategy.name, error = %err.message, "fatal failure, aborting run");
                        return finish(
                            RunOutcome::Aborted {
                                strategy: strategy.name.clone(),
                                error: err,
                            },
                            attempts,
                            backoff_delays,
                        );
                    }
                    FailureKind::Timeout => {
                        last_error = Some(err);
                        break;
                    }
                    FailureKind::RateLimited | FailureKind::Overloaded => {
                        if retries >= self.policy.max_retries {
                            tracing::warn!(
                                strategy = %strategy.name,
                                retries,
                                "retry budget spent"
                            );
                            last_error = Some(err);
                            break;
                        }
                        let delay = self.policy.delay_for(retries, err.kind, previous_delay);
                        retries += 1;
                        observe(&ControllerEvent::RetryScheduled {
                            strategy: strategy.name.clone(),
                            retry: retries,
                            kind: err.kind,
                            delay,
                        });
                        tracing::info!(
                            strategy = %strategy.name,
                            retry = retries,
                            delay_ms = delay.as_millis() as u64,
                            "backing off before retry"
                        );
                        tokio::time::sleep(delay).await;
                        backoff_delays.push(delay);
                        previous_delay = Some(delay);
                    }
                }
            }

            if let Some(next) = self.strategies.get(index + 1) {
                observe(&ControllerEvent::StrategyAdvanced {
                    from: strategy.name.clone(),
                    to: next.name.clone(),
                });
                tracing::info!(from = %strategy.name, to = %next.name, "falling back to next strategy");
            }
        }

        tracing::error!(
            strategies = self.strategies.len(),
            "all strategies exhausted"
        );
        finish(
            RunOutcome::Exhausted { last_error },
            attempts,
            backoff_delays,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    enum Step {
        Succeed(&'static str),
        Fail(FailureKind),
        Hang,
    }

    #[derive(Default)]
    struct ScriptedWork {
        script: Mutex<HashMap<Scope, VecDeque<Step>>>,
        calls: Mutex<Vec<Scope>>,
    }

    impl ScriptedWork {
        fn on(self, scope: Scope, steps: Vec<Step>) -> Self {
            self.script
                .lock()
                .unwrap()
                .insert(scope, steps.into_iter().collect());
            self
        }

        fn calls(&self) -> Vec<Scope> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl UnitOfWork for ScriptedWork {
        async fn run(&self, scope: Scope) -> std::result::Result<String, WorkError> {
            self.calls.lock().unwrap().push(scope);
            let step = self
                .script
                .lock()
                .unwrap()
                .get_mut(&scope)
                .and_then(VecDeque::pop_front)
                .unwrap_or(Step::Fail(FailureKind::Timeout));
            match step {
                Step::Succeed(text) => Ok(text.to_string()),
                Step::Fail(kind) => Err(WorkError::new(kind, format!("scripted {kind}"))),
                Step::Hang => std::future::pending().await,
            }
        }
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(160),
            overload_floor: Duration::from_secs(60),
            jitter_min: 0.0,
            jitter_max: 0.0,
        }
    }

    fn controller(max_retries: u32) -> AdaptiveController {
        AdaptiveController::new(default_strategies(), policy(max_retries)).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_makes_no_further_calls() {
        let work = ScriptedWork::default().on(Scope::Full, vec![Step::Succeed("full report")]);
        let report = controller(3).run(&work).await;

        assert_eq!(report.output(), Some("full report"));
        assert_eq!(work.calls(), vec![Scope::Full]);
        assert!(report.backoff_delays.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_advances_without_retrying() {
        let work = ScriptedWork::default()
            .on(Scope::Full, vec![Step::Fail(FailureKind::Timeout)])
            .on(Scope::Quick, vec![Step::Succeed("quick report")]);
        let report = controller(3).run(&work).await;

        assert_eq!(work.calls(), vec![Scope::Full, Scope::Quick]);
        assert_eq!(report.output(), Some("quick report"));
        assert_eq!(report.attempts_for("Full Analysis"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_call_is_cut_off_at_the_strategy_timeout() {
        let work = ScriptedWork::default()
            .on(Scope::Full, vec![Step::Hang])
            .on(Scope::Quick, vec![Step::Succeed("quick report")]);
        let report = controller(3).run(&work).await;

        let full = &report.attempts[0];
        assert_eq!(full.failure, Some(FailureKind::Timeout));
        assert!(full.elapsed >= Duration::from_secs(600));
        assert!(full.elapsed < Duration::from_secs(601));
        assert!(full.output.is_none());
        assert_eq!(report.output(), Some("quick report"));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limits_retry_same_strategy_up_to_cap() {
        let work = ScriptedWork::default()
            .on(
                Scope::Full,
                vec![
                    Step::Fail(FailureKind::RateLimited),
                    Step::Fail(FailureKind::Overloaded),
                    Step::Fail(FailureKind::RateLimited),
                ],
            )
            .on(Scope::Quick, vec![Step::Succeed("quick report")]);
        let report = controller(2).run(&work).await;

        assert_eq!(work.calls(), vec![Scope::Full, Scope::Full, Scope::Full, Scope::Quick]);
        assert_eq!(report.backoff_delays.len(), 2);
        assert!(
            report
                .backoff_delays
                .windows(2)
                .all(|pair| pair[1] >= pair[0])
        );
        assert_eq!(
            report.backoff_delays,
            vec![Duration::from_secs(10), Duration::from_secs(60)]
        );
        assert_eq!(report.output(), Some("quick report"));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_aborts_without_trying_later_strategies() {
        let work = ScriptedWork::default()
            .on(Scope::Full, vec![Step::Fail(FailureKind::Fatal)])
            .on(Scope::Quick, vec![Step::Succeed("never")]);
        let report = controller(3).run(&work).await;

        assert_eq!(work.calls(), vec![Scope::Full]);
        assert!(matches!(
            report.outcome,
            RunOutcome::Aborted { ref strategy, .. } if strategy == "Full Analysis"
        ));
        let err = report.into_result().unwrap_err();
        assert!(err.to_string().contains("Full Analysis aborted"));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_in_a_fallback_strategy_still_aborts() {
        let work = ScriptedWork::default()
            .on(Scope::Full, vec![Step::Hang])
            .on(Scope::Quick, vec![Step::Fail(FailureKind::Fatal)])
            .on(Scope::Emergency, vec![Step::Succeed("never")]);
        let report = controller(3).run(&work).await;

        assert_eq!(work.calls(), vec![Scope::Full, Scope::Quick]);
        assert!(matches!(
            report.outcome,
            RunOutcome::Aborted { ref strategy, .. } if strategy == "Quick Analysis"
        ));
        assert!(report.backoff_delays.is_empty());
        assert_eq!(report.attempts_for("Emergency Analysis"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausting_every_strategy_reports_failure() {
        let work = ScriptedWork::default()
            .on(Scope::Full, vec![Step::Fail(FailureKind::Timeout)])
            .on(Scope::Quick, vec![Step::Hang])
            .on(Scope::Emergency, vec![Step::Fail(FailureKind::Timeout)]);
        let report = controller(3).run(&work).await;

        assert_eq!(work.calls(), vec![Scope::Full, Scope::Quick, Scope::Emergency]);
        assert_eq!(
            report.strategies_tried(),
            vec!["Full Analysis", "Quick Analysis", "Emergency Analysis"]
        );
        assert!(matches!(report.outcome, RunOutcome::Exhausted { last_error: Some(_) }));
        let err = report.into_result().unwrap_err();
        assert!(err.to_string().starts_with("all 3 strategies exhausted"));
    }

    #[tokio::test(start_paused = true)]
    async fn full_timeout_then_quick_rate_limited_twice() {
        let work = ScriptedWork::default()
            .on(Scope::Full, vec![Step::Hang])
            .on(
                Scope::Quick,
                vec![
                    Step::Fail(FailureKind::RateLimited),
                    Step::Fail(FailureKind::RateLimited),
                    Step::Succeed("quick report"),
                ],
            );
        let report = controller(3).run(&work).await;

        assert!(matches!(
            report.outcome,
            RunOutcome::Succeeded { ref strategy, scope: Scope::Quick, .. } if strategy == "Quick Analysis"
        ));
        assert_eq!(report.backoff_delays.len(), 2);
        assert_eq!(report.attempts_for("Full Analysis"), 1);
        assert_eq!(report.attempts_for("Quick Analysis"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn observer_sees_fallback_events_in_order() {
        let work = ScriptedWork::default()
            .on(Scope::Full, vec![Step::Fail(FailureKind::Timeout)])
            .on(Scope::Quick, vec![Step::Succeed("ok")]);
        let mut seen = Vec::new();
        controller(3)
            .run_with_observer(&work, &mut |event| seen.push(event.clone()))
            .await;

        assert!(matches!(seen[0], ControllerEvent::AttemptStarted { attempt: 1, .. }));
        assert!(matches!(seen[1], ControllerEvent::AttemptFailed { kind: FailureKind::Timeout, .. }));
        assert_eq!(
            seen[2],
            ControllerEvent::StrategyAdvanced {
                from: "Full Analysis".to_string(),
                to: "Quick Analysis".to_string(),
            }
        );
        assert!(matches!(seen.last(), Some(ControllerEvent::Succeeded { .. })));
    }

    #[test]
    fn empty_ladder_is_rejected() {
        assert!(AdaptiveController::new(Vec::new(), RetryPolicy::default()).is_err());
        let zero = vec![Strategy::new("Instant", Scope::Quick, Duration::ZERO)];
        assert!(AdaptiveController::new(zero, RetryPolicy::default()).is_err());
    }
}
