//! 调度观测模块：通过显式注入的观察者接口记录调度过程。
//!
//! # Dispatch Observation
//!
//! The dispatcher, retry coordinator, sequencer and stream consumer never log on
//! their own. They emit typed [`DispatchEvent`]s to an injected
//! [`DispatchObserver`], so whether (and how) anything is logged is decided at
//! construction time rather than through ambient global state.
//!
//! | Observer | Description |
//! |----------|-------------|
//! | [`TracingObserver`] | Default; forwards events to `tracing` |
//! | [`NoopObserver`] | Discards everything |
//! | [`InMemoryObserver`] | Records events, for tests |
//! | [`CompositeObserver`] | Fans out to several observers |

use crate::types::{OutcomeClass, RecordId};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lifecycle events of the dispatch engine.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    /// A batch is about to run (after any rate-limit wait).
    BatchStarted { batch: usize, size: usize },
    /// The sequencer is sleeping to respect the minimum batch interval.
    RateLimitWait { batch: usize, wait: Duration },
    /// One dispatch of the pending set is starting.
    AttemptStarted { attempt: u32, pending: usize },
    /// A single request is being sent.
    RequestSent { id: RecordId, url: String },
    /// A single request finished (or was force-finalized).
    RequestFinished {
        id: RecordId,
        status: u16,
        class: OutcomeClass,
    },
    /// A dispatch finished; `deadline_hit` is set when outstanding requests were force-finalized.
    AttemptFinished {
        attempt: u32,
        completed: usize,
        retryable: usize,
        deadline_hit: bool,
    },
    RetryScheduled {
        attempt: u32,
        pending: usize,
        backoff: Duration,
    },
    /// Retry budget spent with ids still failing.
    RetriesExhausted { unresolved: Vec<RecordId> },
    BatchFinished {
        batch: usize,
        succeeded: usize,
        failed: usize,
        attempts: u32,
    },
    StreamOpened { url: String },
    StreamResponse { status: u16, header_size: usize },
    /// The scratch file was released. `exhausted` is true when every record was read.
    StreamClosed { records: usize, exhausted: bool },
}

/// Receives engine events. Implementations must be cheap; they are called inline.
pub trait DispatchObserver: Send + Sync {
    fn on_event(&self, event: &DispatchEvent);
}

/// Forwards events to `tracing`. Per-request events are only logged when `verbose`.
#[derive(Debug, Clone, Default)]
pub struct TracingObserver {
    verbose: bool,
}

impl TracingObserver {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl DispatchObserver for TracingObserver {
    fn on_event(&self, event: &DispatchEvent) {
        match event {
            DispatchEvent::BatchStarted { batch, size } => {
                info!(batch, size, "starting batch");
            }
            DispatchEvent::RateLimitWait { batch, wait } => {
                debug!(batch, wait_ms = wait.as_millis() as u64, "waiting for batch slot");
            }
            DispatchEvent::AttemptStarted { attempt, pending } => {
                debug!(attempt, pending, "dispatching attempt");
            }
            DispatchEvent::RequestSent { id, url } => {
                if self.verbose {
                    debug!(id, url = %url, "sending request");
                }
            }
            DispatchEvent::RequestFinished { id, status, class } => {
                if self.verbose {
                    debug!(id, status, class = ?class, "request finished");
                }
            }
            DispatchEvent::AttemptFinished {
                attempt,
                completed,
                retryable,
                deadline_hit,
            } => {
                if *deadline_hit {
                    warn!(attempt, completed, retryable, "batch deadline elapsed; outstanding requests finalized as timeouts");
                } else {
                    debug!(attempt, completed, retryable, "attempt finished");
                }
            }
            DispatchEvent::RetryScheduled {
                attempt,
                pending,
                backoff,
            } => {
                info!(
                    attempt,
                    pending,
                    backoff_ms = backoff.as_millis() as u64,
                    "retrying transient failures"
                );
            }
            DispatchEvent::RetriesExhausted { unresolved } => {
                warn!(count = unresolved.len(), ids = ?unresolved, "retry budget exhausted");
            }
            DispatchEvent::BatchFinished {
                batch,
                succeeded,
                failed,
                attempts,
            } => {
                info!(batch, succeeded, failed, attempts, "batch finished");
            }
            DispatchEvent::StreamOpened { url } => {
                info!(url = %url, "opening listgen stream");
            }
            DispatchEvent::StreamResponse {
                status,
                header_size,
            } => {
                debug!(status, header_size, "listgen response received");
            }
            DispatchEvent::StreamClosed { records, exhausted } => {
                debug!(records, exhausted, "listgen scratch file released");
            }
        }
    }
}

/// Discards every event.
pub struct NoopObserver;

impl DispatchObserver for NoopObserver {
    fn on_event(&self, _: &DispatchEvent) {}
}

/// Returns a no-op observer.
pub fn noop_observer() -> Arc<dyn DispatchObserver> {
    Arc::new(NoopObserver)
}

/// In-memory observer for testing.
#[derive(Default)]
pub struct InMemoryObserver {
    events: Mutex<Vec<DispatchEvent>>,
}

impl InMemoryObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DispatchEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of recorded events matching `pred`.
    pub fn count(&self, pred: impl Fn(&DispatchEvent) -> bool) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| pred(e))
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl DispatchObserver for InMemoryObserver {
    fn on_event(&self, event: &DispatchEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }
}

/// Fans each event out to several observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn DispatchObserver>>,
}

impl CompositeObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, observer: Arc<dyn DispatchObserver>) -> Self {
        self.observers.push(observer);
        self
    }
}

impl DispatchObserver for CompositeObserver {
    fn on_event(&self, event: &DispatchEvent) {
        for o in &self.observers {
            o.on_event(event);
        }
    }
}
