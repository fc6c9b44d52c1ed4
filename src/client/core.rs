use crate::batch::{BatchSequencer, BatchStream};
use crate::client::builder::ReachClientBuilder;
use crate::client::request::RequestFactory;
use crate::config::ClientConfig;
use crate::stream::{ListgenInputs, ListgenResponse, StreamConsumer};
use crate::types::InputRow;
use crate::Result;
use tracing::info;

/// Client for the REACH data API.
///
/// - [`append`](Self::append) enriches many rows, one GET per row, in
///   quota-sized batches with retries.
/// - [`listgen`](Self::listgen) runs one streaming list-generation query.
pub struct ReachClient {
    pub(crate) config: ClientConfig,
    pub(crate) requests: RequestFactory,
    pub(crate) sequencer: BatchSequencer,
    pub(crate) consumer: StreamConsumer,
}

impl ReachClient {
    pub fn builder(api_key: impl Into<String>) -> ReachClientBuilder {
        ReachClientBuilder::new(api_key)
    }

    /// Shorthand for `ReachClient::builder(api_key).build()` with env configuration.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        ReachClientBuilder::new(api_key).build()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Enrich `rows` through `data_tool`.
    ///
    /// Returns a lazy stream with one [`crate::batch::BatchResult`] per batch of
    /// `quota_per_second` rows. Nothing is sent until the stream is polled. An
    /// empty input yields one empty batch.
    pub fn append(
        &self,
        data_tool: &str,
        rows: Vec<InputRow>,
        output_types: &[&str],
    ) -> Result<BatchStream> {
        self.append_with_params(data_tool, rows, output_types, &[])
    }

    /// [`append`](Self::append) with additional query parameters applied to every row.
    pub fn append_with_params(
        &self,
        data_tool: &str,
        rows: Vec<InputRow>,
        output_types: &[&str],
        extra: &[(&str, &str)],
    ) -> Result<BatchStream> {
        let records = self
            .requests
            .append_records(data_tool, rows, output_types, extra)?;
        info!(
            data_tool,
            rows = records.len(),
            batch_size = self.sequencer.batch_size(),
            "append started"
        );
        self.sequencer.sequence(records)
    }

    /// Run a list-generation query and expose its records as a lazy stream.
    ///
    /// Remote and transport failures are reported in the returned
    /// [`ListgenResponse`]; `Err` is reserved for invalid arguments and local
    /// scratch-file failures.
    pub async fn listgen(
        &self,
        data_tool: &str,
        inputs: ListgenInputs,
        output_types: &[&str],
    ) -> Result<ListgenResponse> {
        let request = self
            .requests
            .listgen_request(data_tool, &inputs, output_types)?;
        info!(data_tool, "listgen started");
        self.consumer.consume(request, inputs).await
    }
}
