//! Response outcomes and their classification.

use super::record::{InputRow, RecordId, RequestRecord};
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Parsed response headers (name → value).
pub type ResponseHeaders = BTreeMap<String, String>;

/// Transport-level failure classification. `None` means an HTTP response was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    #[default]
    None,
    ConnectionLost,
    Timeout,
    Other,
}

/// Retry-relevant classification of a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeClass {
    /// No response: DNS / connect failure or connection dropped mid-flight.
    ConnectionError,
    /// Per-request timeout, or force-finalized by the batch deadline.
    Timeout,
    /// HTTP 429.
    RateLimited,
    /// HTTP 500.
    ServerError,
    /// Any other 4xx.
    ClientError,
    /// HTTP 200.
    Success,
    /// Any other status (1xx/2xx other than 200/3xx/5xx other than 500).
    Unexpected,
}

impl OutcomeClass {
    pub fn from_parts(http_status: u16, transport_error: TransportErrorKind) -> Self {
        match (http_status, transport_error) {
            (0, TransportErrorKind::Timeout) => OutcomeClass::Timeout,
            (0, _) => OutcomeClass::ConnectionError,
            (200, _) => OutcomeClass::Success,
            (429, _) => OutcomeClass::RateLimited,
            (500, _) => OutcomeClass::ServerError,
            (400..=499, _) => OutcomeClass::ClientError,
            _ => OutcomeClass::Unexpected,
        }
    }
}

/// Result of one record's attempt sequence.
///
/// `http_status == 0` means no HTTP response was received; `transport_error`
/// says why. When produced by the retry coordinator this is always the outcome
/// of the record's *last* attempt.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseOutcome {
    pub id: RecordId,
    pub http_status: u16,
    pub transport_error: TransportErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub headers: ResponseHeaders,
    #[serde(skip)]
    pub body_raw: Option<Bytes>,
    pub body: Option<Value>,
    pub match_found: bool,
    pub success: bool,
    pub inputs: InputRow,
    /// Dispatch attempts consumed by this record (set by the retry coordinator).
    pub attempts: u32,
}

impl ResponseOutcome {
    /// Build an outcome from a received HTTP response.
    pub fn from_http(
        record: &RequestRecord,
        http_status: u16,
        headers: ResponseHeaders,
        body_raw: Bytes,
    ) -> Self {
        let body: Option<Value> = serde_json::from_slice(&body_raw).ok();
        let match_found = body.as_ref().map(reports_match).unwrap_or(false);
        Self {
            id: record.id,
            http_status,
            transport_error: TransportErrorKind::None,
            error_message: None,
            headers,
            body_raw: Some(body_raw),
            body,
            match_found,
            success: http_status == 200,
            inputs: record.inputs.clone(),
            attempts: 0,
        }
    }

    /// Build an outcome for an attempt that never produced an HTTP response.
    pub fn from_transport_error(
        record: &RequestRecord,
        kind: TransportErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: record.id,
            http_status: 0,
            transport_error: kind,
            error_message: Some(message.into()),
            headers: ResponseHeaders::new(),
            body_raw: None,
            body: None,
            match_found: false,
            success: false,
            inputs: record.inputs.clone(),
            attempts: 0,
        }
    }

    /// Outcome for a request still outstanding when the batch deadline expired.
    pub fn deadline_expired(record: &RequestRecord) -> Self {
        Self::from_transport_error(
            record,
            TransportErrorKind::Timeout,
            "batch deadline elapsed before the request completed",
        )
    }

    pub fn class(&self) -> OutcomeClass {
        OutcomeClass::from_parts(self.http_status, self.transport_error)
    }
}

/// True when the decoded body reports a non-zero `versium.num_matches`.
fn reports_match(body: &Value) -> bool {
    match body.get("versium").and_then(|v| v.get("num_matches")) {
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty() && s != "0",
        Some(Value::Bool(b)) => *b,
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(Value::Null) | None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> RequestRecord {
        RequestRecord::new(
            7,
            "https://api.example.test/v2/contact?email=a%40b.c",
            InputRow::new().with("email", "a@b.c"),
        )
    }

    #[test]
    fn test_from_http_decodes_body_and_match_count() {
        let body = Bytes::from_static(br#"{"versium":{"num_matches":2,"results":[{},{}]}}"#);
        let outcome = ResponseOutcome::from_http(&record(), 200, ResponseHeaders::new(), body);
        assert!(outcome.success);
        assert!(outcome.match_found);
        assert_eq!(outcome.id, 7);
        assert_eq!(outcome.inputs.get("email"), Some("a@b.c"));
        assert_eq!(outcome.class(), OutcomeClass::Success);
    }

    #[test]
    fn test_zero_matches_and_non_json_body() {
        let zero = Bytes::from_static(br#"{"versium":{"num_matches":0}}"#);
        let outcome = ResponseOutcome::from_http(&record(), 200, ResponseHeaders::new(), zero);
        assert!(!outcome.match_found);

        let html = Bytes::from_static(b"<html>bad gateway</html>");
        let outcome = ResponseOutcome::from_http(&record(), 502, ResponseHeaders::new(), html);
        assert!(outcome.body.is_none());
        assert!(outcome.body_raw.is_some());
        assert!(!outcome.success);
        assert_eq!(outcome.class(), OutcomeClass::Unexpected);
    }

    #[test]
    fn test_classification_table() {
        use OutcomeClass::*;
        use TransportErrorKind as K;
        assert_eq!(OutcomeClass::from_parts(0, K::Timeout), Timeout);
        assert_eq!(OutcomeClass::from_parts(0, K::ConnectionLost), ConnectionError);
        assert_eq!(OutcomeClass::from_parts(0, K::Other), ConnectionError);
        assert_eq!(OutcomeClass::from_parts(429, K::None), RateLimited);
        assert_eq!(OutcomeClass::from_parts(500, K::None), ServerError);
        assert_eq!(OutcomeClass::from_parts(404, K::None), ClientError);
        assert_eq!(OutcomeClass::from_parts(503, K::None), Unexpected);
    }

    #[test]
    fn test_deadline_expired_is_status_zero_timeout() {
        let outcome = ResponseOutcome::deadline_expired(&record());
        assert_eq!(outcome.http_status, 0);
        assert_eq!(outcome.transport_error, TransportErrorKind::Timeout);
        assert!(!outcome.success);
        assert!(outcome.error_message.is_some());
    }
}
