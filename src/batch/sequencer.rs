//! Batch sequencer.

use super::dispatcher::{OutcomeMap, RecordBatch};
use crate::resilience::rate_limiter::RateLimiter;
use crate::resilience::retry::RetryCoordinator;
use crate::telemetry::{DispatchEvent, DispatchObserver};
use crate::error::{Error, ErrorContext};
use crate::types::{RecordId, RequestRecord, ResponseOutcome};
use futures::Stream;
use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Merged outcomes of one batch, keyed by record id.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    /// Position of the batch in the sequence (0-based).
    pub index: usize,
    pub outcomes: OutcomeMap,
    /// Dispatch attempts the batch needed (0 for an empty batch).
    pub attempts: u32,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn get(&self, id: RecordId) -> Option<&ResponseOutcome> {
        self.outcomes.get(&id)
    }

    /// Outcomes in input order.
    pub fn iter(&self) -> impl Iterator<Item = &ResponseOutcome> {
        self.outcomes.values()
    }

    pub fn success_count(&self) -> usize {
        self.outcomes.values().filter(|o| o.success).count()
    }

    pub fn failure_count(&self) -> usize {
        self.len() - self.success_count()
    }

    pub fn into_outcomes(self) -> OutcomeMap {
        self.outcomes
    }
}

/// Lazy, single-pass sequence of batch results.
pub type BatchStream = Pin<Box<dyn Stream<Item = BatchResult> + Send>>;

/// Splits records into quota-sized batches and runs them one after another.
///
/// Each pull of the returned stream waits for the rate limiter, then runs one
/// batch (retries included) to completion. Batches never overlap; only the
/// requests inside a batch run concurrently.
pub struct BatchSequencer {
    coordinator: Arc<RetryCoordinator>,
    batch_size: usize,
    min_batch_interval: Duration,
    observer: Arc<dyn DispatchObserver>,
}

struct SequenceState {
    batches: std::vec::IntoIter<RecordBatch>,
    next_index: usize,
    limiter: RateLimiter,
    coordinator: Arc<RetryCoordinator>,
    observer: Arc<dyn DispatchObserver>,
}

impl BatchSequencer {
    pub fn new(
        coordinator: Arc<RetryCoordinator>,
        batch_size: usize,
        min_batch_interval: Duration,
        observer: Arc<dyn DispatchObserver>,
    ) -> Self {
        Self {
            coordinator,
            batch_size: batch_size.max(1),
            min_batch_interval,
            observer,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Split `records` into consecutive batches of at most `batch_size`, keeping input order.
    ///
    /// Fails with a validation error when two records share an id.
    pub fn partition(
        records: Vec<RequestRecord>,
        batch_size: usize,
    ) -> crate::Result<Vec<RecordBatch>> {
        let batch_size = batch_size.max(1);
        let mut seen = HashSet::with_capacity(records.len());
        let mut batches = Vec::with_capacity(records.len().div_ceil(batch_size));
        let mut current = RecordBatch::new();
        for record in records {
            if !seen.insert(record.id) {
                return Err(Error::validation_with_context(
                    "duplicate record id",
                    ErrorContext::new()
                        .with_field_path("records")
                        .with_details(format!("id {} appears more than once", record.id))
                        .with_source("batch_sequencer"),
                ));
            }
            current.insert(record.id, record);
            if current.len() == batch_size {
                batches.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            batches.push(current);
        }
        Ok(batches)
    }

    /// Start a new sequence over `records`.
    ///
    /// Every call returns an independent stream with its own limiter state.
    /// An empty input yields exactly one empty [`BatchResult`] and never
    /// touches the network. Duplicate record ids are rejected up front,
    /// before anything is sent.
    pub fn sequence(&self, records: Vec<RequestRecord>) -> crate::Result<BatchStream> {
        let mut batches = Self::partition(records, self.batch_size)?;
        if batches.is_empty() {
            batches.push(RecordBatch::new());
        }

        let state = SequenceState {
            batches: batches.into_iter(),
            next_index: 0,
            limiter: RateLimiter::new(self.min_batch_interval),
            coordinator: Arc::clone(&self.coordinator),
            observer: Arc::clone(&self.observer),
        };

        Ok(Box::pin(futures::stream::unfold(state, |mut st| async move {
            let batch = st.batches.next()?;
            let index = st.next_index;
            st.next_index += 1;

            if batch.is_empty() {
                return Some((
                    BatchResult {
                        index,
                        ..BatchResult::default()
                    },
                    st,
                ));
            }

            let wait = st.limiter.wait_duration(Instant::now());
            if !wait.is_zero() {
                st.observer.on_event(&DispatchEvent::RateLimitWait { batch: index, wait });
                tokio::time::sleep(wait).await;
            }

            st.observer.on_event(&DispatchEvent::BatchStarted {
                batch: index,
                size: batch.len(),
            });
            let report = st.coordinator.run(batch).await;
            if let Some(at) = report.last_dispatch_at {
                st.limiter.record_start(at);
            }

            let result = BatchResult {
                index,
                outcomes: report.outcomes,
                attempts: report.attempts,
            };
            st.observer.on_event(&DispatchEvent::BatchFinished {
                batch: index,
                succeeded: result.success_count(),
                failed: result.failure_count(),
                attempts: result.attempts,
            });
            Some((result, st))
        })))
    }
}
