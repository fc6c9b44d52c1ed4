use crate::batch::{BatchSequencer, ConcurrentDispatcher, DispatcherConfig};
use crate::client::core::ReachClient;
use crate::client::request::RequestFactory;
use crate::config::ClientConfig;
use crate::error::{Error, ErrorContext};
use crate::resilience::{RetryCoordinator, RetryPolicy};
use crate::stream::StreamConsumer;
use crate::telemetry::{DispatchObserver, TracingObserver};
use crate::transport::{HttpTransport, Transport};
use crate::Result;
use std::sync::Arc;

/// Builder for [`ReachClient`].
///
/// Only the API key is required. Configuration defaults to
/// [`ClientConfig::from_env`]; the observer defaults to a [`TracingObserver`]
/// and the transport to an [`HttpTransport`] built from the configuration.
pub struct ReachClientBuilder {
    api_key: String,
    config: Option<ClientConfig>,
    observer: Option<Arc<dyn DispatchObserver>>,
    transport: Option<Arc<dyn Transport>>,
}

impl ReachClientBuilder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            config: None,
            observer: None,
            transport: None,
        }
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Inject a dispatch observer. Default logs through `tracing`.
    pub fn observer(mut self, observer: Arc<dyn DispatchObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Replace the HTTP transport (primarily for testing).
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<ReachClient> {
        let api_key = self.api_key.trim().to_string();
        if api_key.is_empty() {
            return Err(Error::configuration_with_context(
                "API key must not be empty",
                ErrorContext::new()
                    .with_field_path("api_key")
                    .with_details("set REACH_API_KEY or pass a key to ReachClient::builder")
                    .with_source("client_builder"),
            ));
        }

        let config = self.config.unwrap_or_else(ClientConfig::from_env);
        config.validate()?;

        let observer = self
            .observer
            .unwrap_or_else(|| Arc::new(TracingObserver::new(config.verbose)));
        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(HttpTransport::new(&config)?),
        };

        let requests = RequestFactory::new(&config, api_key)?;

        let dispatcher = ConcurrentDispatcher::new(
            Arc::clone(&transport),
            DispatcherConfig {
                max_concurrency: config.quota_per_second,
                batch_deadline: config.batch_deadline,
            },
            Arc::clone(&observer),
        );
        let policy = RetryPolicy::new(config.max_retries, config.retry_backoff)
            .with_retry_on_status(config.retry_on_status.clone());
        let coordinator = Arc::new(RetryCoordinator::new(
            dispatcher,
            policy,
            Arc::clone(&observer),
        ));
        let sequencer = BatchSequencer::new(
            coordinator,
            config.quota_per_second,
            config.min_batch_interval,
            Arc::clone(&observer),
        );
        let consumer = StreamConsumer::new(
            transport,
            config.scratch_dir.clone(),
            Arc::clone(&observer),
        );

        tracing::debug!(
            base_url = %config.base_url,
            quota = config.quota_per_second,
            max_retries = config.max_retries,
            "reach client ready"
        );

        Ok(ReachClient {
            config,
            requests,
            sequencer,
            consumer,
        })
    }
}
