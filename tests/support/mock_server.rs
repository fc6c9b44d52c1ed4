//! Mock HTTP server setup for tests that go through the real HTTP transport.

use mockito::{Matcher, Mock, Server, ServerGuard};
use reach_client::{ClientConfig, ReachClient};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub const API_KEY: &str = "test-key";

/// Test fixture that manages a mock server
pub struct MockServerFixture {
    pub server: Arc<Mutex<ServerGuard>>,
    pub base_url: String,
}

impl MockServerFixture {
    pub async fn new() -> Self {
        let server = Server::new_async().await;
        let base_url = server.url();
        Self {
            server: Arc::new(Mutex::new(server)),
            base_url,
        }
    }

    /// Configuration pointed at the mock server, with no retry backoff or batch spacing.
    pub fn config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_base_url(self.base_url.clone())
            .with_retry_backoff(Duration::ZERO)
            .with_min_batch_interval(Duration::ZERO)
    }

    pub fn client(&self, config: ClientConfig) -> reach_client::Result<ReachClient> {
        ReachClient::builder(API_KEY)
            .config(config)
            .observer(reach_client::telemetry::noop_observer())
            .build()
    }

    /// JSON response for an append tool, matched on path, API key and the given
    /// query pairs, expected to be hit `hits` times.
    pub async fn mock_append(
        &self,
        data_tool: &str,
        query: Vec<(&str, &str)>,
        status: usize,
        body: &str,
        hits: usize,
    ) -> Mock {
        let mut server = self.server.lock().await;
        let query = Matcher::AllOf(
            query
                .into_iter()
                .map(|(k, v)| Matcher::UrlEncoded(k.to_string(), v.to_string()))
                .collect(),
        );
        server
            .mock("GET", Matcher::Regex(format!(r"^/v2/{}(\?|$)", data_tool)))
            .match_query(query)
            .match_header("x-versium-api-key", API_KEY)
            .match_header("accept", "application/json")
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body)
            .expect(hits)
            .create_async()
            .await
    }

    /// NDJSON (or error) response for a listgen tool, matched on the exact
    /// urlencoded form body. Pairs must be listed in the order they are sent;
    /// repeated keys such as `domain[]` are matched as written.
    pub async fn mock_listgen(
        &self,
        data_tool: &str,
        form: Vec<(&str, &str)>,
        status: usize,
        content_type: &str,
        body: &str,
    ) -> Mock {
        let mut server = self.server.lock().await;
        let form = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(form)
            .finish();
        server
            .mock("POST", format!("/v2/{}", data_tool).as_str())
            .match_header("x-versium-api-key", API_KEY)
            .match_body(Matcher::Exact(form))
            .with_status(status)
            .with_header("content-type", content_type)
            .with_body(body)
            .create_async()
            .await
    }
}
