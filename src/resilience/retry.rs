//! Retry coordinator.
//!
//! Resubmits the transient failures of a batch through the dispatcher until
//! every id resolves or the attempt budget runs out. The loop carries its state
//! explicitly (`pending`, `results`, `attempt`); it never recurses.

use crate::batch::dispatcher::{ConcurrentDispatcher, OutcomeMap, RecordBatch};
use crate::telemetry::{DispatchEvent, DispatchObserver};
use crate::types::{RecordId, ResponseOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Which outcomes are resubmitted, how often, and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Fixed wait before each retry.
    pub backoff: Duration,
    /// Statuses that are retried in addition to status 0 (no response).
    pub retry_on_status: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_secs(2),
            retry_on_status: vec![429, 500],
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
            ..Self::default()
        }
    }

    pub fn with_retry_on_status(mut self, statuses: Vec<u16>) -> Self {
        self.retry_on_status = statuses;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Status 0 (connection lost, timeout, forced finalize) is always retryable.
    pub fn is_retryable(&self, outcome: &ResponseOutcome) -> bool {
        outcome.http_status == 0 || self.retry_on_status.contains(&outcome.http_status)
    }

    fn decide(&self, state: &BatchState) -> Decision {
        if !state.pending.is_empty() && state.attempt < self.max_attempts() {
            Decision::Retry {
                delay: self.backoff,
            }
        } else {
            Decision::Stop
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Retry { delay: Duration },
    Stop,
}

/// Loop state of one coordinator run.
struct BatchState {
    pending: RecordBatch,
    results: OutcomeMap,
    attempt: u32,
    last_dispatch_at: Option<Instant>,
}

/// Final merged outcomes of one batch.
#[derive(Debug, Clone)]
pub struct RetryReport {
    /// Latest outcome per id.
    pub outcomes: OutcomeMap,
    /// Dispatch attempts made for the batch.
    pub attempts: u32,
    /// Start of the most recent dispatch, if any happened.
    pub last_dispatch_at: Option<Instant>,
    /// Ids still failing transiently when the budget ran out.
    pub unresolved: Vec<RecordId>,
}

pub struct RetryCoordinator {
    dispatcher: ConcurrentDispatcher,
    policy: RetryPolicy,
    observer: Arc<dyn DispatchObserver>,
}

impl RetryCoordinator {
    pub fn new(
        dispatcher: ConcurrentDispatcher,
        policy: RetryPolicy,
        observer: Arc<dyn DispatchObserver>,
    ) -> Self {
        Self {
            dispatcher,
            policy,
            observer,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn run(&self, records: RecordBatch) -> RetryReport {
        let mut state = BatchState {
            pending: records,
            results: OutcomeMap::new(),
            attempt: 0,
            last_dispatch_at: None,
        };

        while !state.pending.is_empty() {
            state.attempt += 1;
            self.observer.on_event(&DispatchEvent::AttemptStarted {
                attempt: state.attempt,
                pending: state.pending.len(),
            });

            let report = self.dispatcher.dispatch(&state.pending).await;
            state.last_dispatch_at = Some(report.started_at);

            let completed = report.outcomes.len();
            let mut retryable = 0;
            for (id, mut outcome) in report.outcomes {
                // Ids only ever leave `pending`, so every id here has been tried `attempt` times.
                outcome.attempts = state.attempt;
                if self.policy.is_retryable(&outcome) {
                    retryable += 1;
                } else {
                    state.pending.remove(&id);
                }
                state.results.insert(id, outcome);
            }

            self.observer.on_event(&DispatchEvent::AttemptFinished {
                attempt: state.attempt,
                completed,
                retryable,
                deadline_hit: report.deadline_hit,
            });

            match self.policy.decide(&state) {
                Decision::Retry { delay } => {
                    self.observer.on_event(&DispatchEvent::RetryScheduled {
                        attempt: state.attempt,
                        pending: state.pending.len(),
                        backoff: delay,
                    });
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Decision::Stop => break,
            }
        }

        let unresolved: Vec<RecordId> = state.pending.keys().copied().collect();
        if !unresolved.is_empty() {
            self.observer.on_event(&DispatchEvent::RetriesExhausted {
                unresolved: unresolved.clone(),
            });
        }

        RetryReport {
            outcomes: state.results,
            attempts: state.attempt,
            last_dispatch_at: state.last_dispatch_at,
            unresolved,
        }
    }
}
