//! Concurrent dispatcher.

use crate::telemetry::{DispatchEvent, DispatchObserver};
use crate::transport::{RawResponse, Transport, TransportError};
use crate::types::{RecordId, RequestRecord, ResponseOutcome, TransportErrorKind};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

/// Records keyed by their stable id.
pub type RecordBatch = BTreeMap<RecordId, RequestRecord>;

/// Outcomes keyed by record id; iteration order is input order.
pub type OutcomeMap = BTreeMap<RecordId, ResponseOutcome>;

/// Result of one dispatch of a record batch.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    /// One outcome per submitted id.
    pub outcomes: OutcomeMap,
    pub started_at: Instant,
    /// True when the batch deadline force-finalized outstanding requests.
    pub deadline_hit: bool,
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum requests in flight at once.
    pub max_concurrency: usize,
    /// Upper bound on the whole dispatch.
    pub batch_deadline: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 20,
            batch_deadline: Duration::from_secs(20),
        }
    }
}

/// Runs a batch of requests in parallel and collects one outcome per id.
///
/// Requests run as tasks on a [`JoinSet`], gated by a semaphore sized to the
/// quota. Each dispatch owns its own permits, so concurrent dispatches never
/// queue behind one another. The caller waits on whichever comes first: the next task completion
/// or the batch deadline. Whatever is still outstanding at the deadline is
/// finalized as a timeout with status 0.
pub struct ConcurrentDispatcher {
    transport: Arc<dyn Transport>,
    config: DispatcherConfig,
    observer: Arc<dyn DispatchObserver>,
}

impl ConcurrentDispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: DispatcherConfig,
        observer: Arc<dyn DispatchObserver>,
    ) -> Self {
        Self {
            transport,
            config,
            observer,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub async fn dispatch(&self, records: &RecordBatch) -> DispatchReport {
        let started_at = Instant::now();
        let deadline = started_at + self.config.batch_deadline;
        let mut outcomes = OutcomeMap::new();
        if records.is_empty() {
            return DispatchReport {
                outcomes,
                started_at,
                deadline_hit: false,
            };
        }

        let permits = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for record in records.values() {
            self.observer.on_event(&DispatchEvent::RequestSent {
                id: record.id,
                url: record.url.clone(),
            });
            let transport = Arc::clone(&self.transport);
            let permits = Arc::clone(&permits);
            let record = record.clone();
            tasks.spawn(async move {
                // Never closed, so acquisition cannot fail.
                let _permit = permits.acquire_owned().await.ok();
                let result = transport.fetch(&record).await;
                to_outcome(&record, result)
            });
        }

        let deadline_timer = tokio::time::sleep_until(deadline);
        tokio::pin!(deadline_timer);
        let mut timer_fired = false;

        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok(outcome)) => {
                        outcomes.insert(outcome.id, outcome);
                    }
                    // Panicked or cancelled task; its id is filled in below.
                    Some(Err(_)) => {}
                    None => break,
                },
                _ = &mut deadline_timer => {
                    timer_fired = true;
                    break;
                }
            }
        }

        let deadline_hit = self.finalize(tasks, records, &mut outcomes, timer_fired).await;

        for outcome in outcomes.values() {
            self.observer.on_event(&DispatchEvent::RequestFinished {
                id: outcome.id,
                status: outcome.http_status,
                class: outcome.class(),
            });
        }

        DispatchReport {
            outcomes,
            started_at,
            deadline_hit,
        }
    }

    /// Release every request task and make sure each submitted id has an outcome.
    ///
    /// Returns true when at least one id had to be finalized as a deadline timeout.
    async fn finalize(
        &self,
        mut tasks: JoinSet<ResponseOutcome>,
        records: &RecordBatch,
        outcomes: &mut OutcomeMap,
        timer_fired: bool,
    ) -> bool {
        tasks.abort_all();
        // Tasks that finished before the abort still hand back their outcome.
        while let Some(joined) = tasks.join_next().await {
            if let Ok(outcome) = joined {
                outcomes.entry(outcome.id).or_insert(outcome);
            }
        }

        let mut expired = false;
        for (id, record) in records {
            outcomes.entry(*id).or_insert_with(|| {
                if timer_fired {
                    expired = true;
                    ResponseOutcome::deadline_expired(record)
                } else {
                    ResponseOutcome::from_transport_error(
                        record,
                        TransportErrorKind::Other,
                        "request task ended without producing a response",
                    )
                }
            });
        }
        expired
    }
}

fn to_outcome(
    record: &RequestRecord,
    result: std::result::Result<RawResponse, TransportError>,
) -> ResponseOutcome {
    match result {
        Ok(raw) => ResponseOutcome::from_http(record, raw.status, raw.headers, raw.body),
        Err(e) => ResponseOutcome::from_transport_error(record, e.kind(), e.to_string()),
    }
}
