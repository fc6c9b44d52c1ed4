//! Shared fixtures for integration tests.
//!
//! [`ScriptedTransport`] answers each record id from a per-id queue of scripted
//! steps, so retry sequences (429 then 200, and so on) are deterministic.

#![allow(dead_code)]

pub mod mock_server;

use async_trait::async_trait;
use bytes::Bytes;
use reach_client::batch::{ConcurrentDispatcher, DispatcherConfig, RecordBatch};
use reach_client::error::Error;
use reach_client::resilience::{RetryCoordinator, RetryPolicy};
use reach_client::telemetry::{DispatchObserver, InMemoryObserver};
use reach_client::transport::{
    RawResponse, StreamRequest, StreamingResponse, Transport, TransportError,
};
use reach_client::types::{InputRow, RecordId, RequestRecord};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

pub const MATCH_BODY: &str = r#"{"versium":{"num_matches":1,"results":[{"phone":"5551234"}]}}"#;

/// Which transport failure a scripted step raises.
#[derive(Debug, Clone, Copy)]
pub enum Failure {
    ConnectionLost,
    Timeout,
}

/// One scripted answer to a fetch.
#[derive(Debug, Clone)]
pub enum Step {
    Respond {
        status: u16,
        body: String,
        delay: Duration,
    },
    Fail {
        failure: Failure,
        delay: Duration,
    },
}

impl Step {
    pub fn status(status: u16) -> Self {
        let body = if status == 200 {
            MATCH_BODY.to_string()
        } else {
            format!(r#"{{"errors":["status {}"]}}"#, status)
        };
        Step::Respond {
            status,
            body,
            delay: Duration::ZERO,
        }
    }

    pub fn fail(failure: Failure) -> Self {
        Step::Fail {
            failure,
            delay: Duration::ZERO,
        }
    }

    pub fn after(self, wait: Duration) -> Self {
        match self {
            Step::Respond { status, body, .. } => Step::Respond {
                status,
                body,
                delay: wait,
            },
            Step::Fail { failure, .. } => Step::Fail {
                failure,
                delay: wait,
            },
        }
    }
}

/// What `open_stream` answers.
#[derive(Debug, Clone)]
pub enum StreamScript {
    Respond {
        status: u16,
        reason: String,
        headers: Vec<(String, String)>,
        chunks: Vec<Bytes>,
        /// Fail the body after the chunks were delivered.
        fail_after: bool,
    },
    Fail(Failure),
}

impl StreamScript {
    pub fn ok(chunks: &[&str]) -> Self {
        StreamScript::Respond {
            status: 200,
            reason: "OK".to_string(),
            headers: vec![(
                "content-type".to_string(),
                "application/x-ndjson".to_string(),
            )],
            chunks: chunks.iter().map(|c| Bytes::from(c.to_string())).collect(),
            fail_after: false,
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        StreamScript::Respond {
            status,
            reason: String::new(),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            chunks: vec![Bytes::from(body.to_string())],
            fail_after: false,
        }
    }
}

fn to_error(failure: Failure) -> TransportError {
    match failure {
        Failure::ConnectionLost => TransportError::ConnectionLost("connection reset by peer".into()),
        Failure::Timeout => TransportError::Timeout,
    }
}

#[derive(Default)]
pub struct ScriptedTransport {
    queues: Mutex<HashMap<RecordId, VecDeque<Step>>>,
    sticky: Mutex<HashMap<RecordId, Step>>,
    calls: Mutex<Vec<(RecordId, Instant)>>,
    stream: Mutex<Option<StreamScript>>,
    stream_requests: Mutex<Vec<StreamRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue steps for `id`; once drained, the id answers 200.
    pub fn script(&self, id: RecordId, steps: Vec<Step>) {
        self.queues.lock().unwrap().insert(id, steps.into());
    }

    /// Answer every fetch for `id` with `step` once its queue is drained.
    pub fn always(&self, id: RecordId, step: Step) {
        self.sticky.lock().unwrap().insert(id, step);
    }

    pub fn set_stream(&self, script: StreamScript) {
        *self.stream.lock().unwrap() = Some(script);
    }

    pub fn calls(&self) -> Vec<(RecordId, Instant)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, id: RecordId) -> usize {
        self.calls().iter().filter(|(i, _)| *i == id).count()
    }

    pub fn stream_requests(&self) -> Vec<StreamRequest> {
        self.stream_requests.lock().unwrap().clone()
    }

    fn next_step(&self, id: RecordId) -> Step {
        if let Some(step) = self
            .queues
            .lock()
            .unwrap()
            .get_mut(&id)
            .and_then(|q| q.pop_front())
        {
            return step;
        }
        self.sticky
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| Step::status(200))
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch(&self, record: &RequestRecord) -> Result<RawResponse, TransportError> {
        self.calls.lock().unwrap().push((record.id, Instant::now()));
        match self.next_step(record.id) {
            Step::Respond {
                status,
                body,
                delay,
            } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(RawResponse::new(status, body).with_header("content-type", "application/json"))
            }
            Step::Fail { failure, delay } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Err(to_error(failure))
            }
        }
    }

    async fn open_stream(
        &self,
        request: &StreamRequest,
    ) -> Result<StreamingResponse, TransportError> {
        self.stream_requests.lock().unwrap().push(request.clone());
        let script = self
            .stream
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| StreamScript::ok(&[]));
        match script {
            StreamScript::Fail(failure) => Err(to_error(failure)),
            StreamScript::Respond {
                status,
                reason,
                headers,
                chunks,
                fail_after,
            } => {
                let mut items: Vec<reach_client::Result<Bytes>> =
                    chunks.into_iter().map(Ok).collect();
                if fail_after {
                    items.push(Err(Error::Transport(TransportError::ConnectionLost(
                        "stream interrupted".into(),
                    ))));
                }
                Ok(StreamingResponse {
                    status,
                    reason,
                    headers,
                    body: Box::pin(futures::stream::iter(items)),
                })
            }
        }
    }
}

/// `n` records with ids `0..n` and one input field each.
pub fn records(n: usize) -> Vec<RequestRecord> {
    (0..n)
        .map(|i| {
            RequestRecord::new(
                i,
                format!("http://reach.test/v2/contact?email=user{}%40example.com", i),
                InputRow::new().with("email", format!("user{}@example.com", i)),
            )
        })
        .collect()
}

pub fn batch(n: usize) -> RecordBatch {
    records(n).into_iter().map(|r| (r.id, r)).collect()
}

pub fn dispatcher(
    transport: Arc<ScriptedTransport>,
    max_concurrency: usize,
    batch_deadline: Duration,
    observer: Arc<dyn DispatchObserver>,
) -> ConcurrentDispatcher {
    ConcurrentDispatcher::new(
        transport,
        DispatcherConfig {
            max_concurrency,
            batch_deadline,
        },
        observer,
    )
}

/// Coordinator with a 20-wide dispatcher, 20 s deadline and the given retry budget.
pub fn coordinator(
    transport: Arc<ScriptedTransport>,
    max_retries: u32,
    backoff: Duration,
    observer: Arc<InMemoryObserver>,
) -> RetryCoordinator {
    RetryCoordinator::new(
        dispatcher(transport, 20, Duration::from_secs(20), observer.clone()),
        RetryPolicy::new(max_retries, backoff),
        observer,
    )
}
