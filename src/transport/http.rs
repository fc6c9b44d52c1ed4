use super::{RawResponse, StreamRequest, StreamingResponse, Transport, TransportError};
use crate::config::ClientConfig;
use crate::types::{RequestRecord, ResponseHeaders};
use crate::Result;
use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::HeaderMap;
use reqwest::Proxy;
use std::time::Duration;

/// reqwest-backed [`Transport`].
///
/// Connect and total timeouts are applied per request; the connection pool is
/// sized to the batch quota so one batch can keep a connection per request.
pub struct HttpTransport {
    client: reqwest::Client,
    request_timeout: Option<Duration>,
    stream_timeout: Option<Duration>,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.quota_per_second.max(1))
            .pool_idle_timeout(Some(Duration::from_secs(90)));

        if let Some(proxy_url) = &config.proxy_url {
            let proxy = Proxy::all(proxy_url).map_err(TransportError::Http)?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(TransportError::Http)?;

        let non_zero = |d: Duration| if d.is_zero() { None } else { Some(d) };
        Ok(Self {
            client,
            request_timeout: non_zero(config.request_timeout),
            stream_timeout: non_zero(config.stream_timeout),
        })
    }

    fn collect_headers(headers: &HeaderMap) -> Vec<(String, String)> {
        headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, record: &RequestRecord) -> std::result::Result<RawResponse, TransportError> {
        let mut req = self.client.get(&record.url);
        for (name, value) in &record.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = self.request_timeout {
            req = req.timeout(timeout);
        }

        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let headers: ResponseHeaders = Self::collect_headers(resp.headers()).into_iter().collect();
        let body = resp.bytes().await?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }

    async fn open_stream(
        &self,
        request: &StreamRequest,
    ) -> std::result::Result<StreamingResponse, TransportError> {
        let mut req = self.client.post(&request.url).form(&request.form);
        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = self.stream_timeout {
            req = req.timeout(timeout);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let headers = Self::collect_headers(resp.headers());
        let body = resp
            .bytes_stream()
            .map_err(|e| crate::Error::Transport(TransportError::Http(e)));

        Ok(StreamingResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            body: Box::pin(body),
        })
    }
}
