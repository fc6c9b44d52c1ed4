//! Request construction for the append and listgen endpoints.

use crate::config::ClientConfig;
use crate::error::{Error, ErrorContext};
use crate::stream::ListgenInputs;
use crate::transport::StreamRequest;
use crate::types::{InputRow, RequestRecord};
use crate::Result;
use std::time::Duration;
use url::Url;

pub const API_KEY_HEADER: &str = "x-versium-api-key";

/// Builds [`RequestRecord`]s and [`StreamRequest`]s following the service's wire contract.
#[derive(Debug, Clone)]
pub struct RequestFactory {
    base_url: Url,
    api_version: u32,
    api_key: String,
    request_timeout: Duration,
}

impl RequestFactory {
    pub fn new(config: &ClientConfig, api_key: impl Into<String>) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            Error::configuration_with_context(
                "base url is not a valid URL",
                ErrorContext::new()
                    .with_field_path("config.base_url")
                    .with_details(e.to_string())
                    .with_source("request_factory"),
            )
        })?;
        Ok(Self {
            base_url,
            api_version: config.api_version,
            api_key: api_key.into(),
            request_timeout: config.request_timeout,
        })
    }

    /// `{base_url}/v{api_version}/{data_tool}`
    pub fn endpoint(&self, data_tool: &str) -> Result<Url> {
        let tool = data_tool.trim();
        if tool.is_empty() {
            return Err(Error::validation_with_context(
                "data tool name must not be empty",
                ErrorContext::new()
                    .with_field_path("data_tool")
                    .with_source("request_factory"),
            ));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                Error::configuration_with_context(
                    "base url cannot carry a path",
                    ErrorContext::new()
                        .with_field_path("config.base_url")
                        .with_source("request_factory"),
                )
            })?
            .pop_if_empty()
            .push(&format!("v{}", self.api_version))
            .push(tool);
        url.set_query(None);
        Ok(url)
    }

    /// Server-side time budget, kept just under the client-side request timeout.
    fn max_time_param(&self) -> Option<String> {
        if self.request_timeout.is_zero() {
            return None;
        }
        let millis = (self.request_timeout.as_millis() as i64 - 200).max(100);
        let secs = format!("{:.3}", millis as f64 / 1000.0);
        Some(secs.trim_end_matches('0').trim_end_matches('.').to_string())
    }

    /// One GET record per row, ids assigned by input position.
    ///
    /// Query order: `output[]` per output type, then the row's fields with
    /// `rcfg_max_time` and `extra` layered on top (later keys replace earlier
    /// ones in place).
    pub fn append_records(
        &self,
        data_tool: &str,
        rows: Vec<InputRow>,
        output_types: &[&str],
        extra: &[(&str, &str)],
    ) -> Result<Vec<RequestRecord>> {
        let endpoint = self.endpoint(data_tool)?;

        let mut records = Vec::with_capacity(rows.len());
        for (id, row) in rows.into_iter().enumerate() {
            let mut params = row.clone();
            if let Some(max_time) = self.max_time_param() {
                params.insert("rcfg_max_time", max_time);
            }
            for (k, v) in extra {
                params.insert(*k, *v);
            }

            let mut url = endpoint.clone();
            {
                let mut query = url.query_pairs_mut();
                for output in output_types {
                    query.append_pair("output[]", output);
                }
                for (k, v) in params.iter() {
                    query.append_pair(k, v);
                }
            }

            records.push(
                RequestRecord::new(id, url.as_str(), row)
                    .with_header("Accept", "application/json")
                    .with_header(API_KEY_HEADER, self.api_key.as_str()),
            );
        }
        Ok(records)
    }

    /// The listgen POST: `output[]` per output type, then every input value as
    /// `field[]`, even when a field carries a single value.
    pub fn listgen_request(
        &self,
        data_tool: &str,
        inputs: &ListgenInputs,
        output_types: &[&str],
    ) -> Result<StreamRequest> {
        let endpoint = self.endpoint(data_tool)?;

        let mut form: Vec<(String, String)> = output_types
            .iter()
            .map(|o| ("output[]".to_string(), o.to_string()))
            .collect();
        for (field, values) in inputs {
            let key = format!("{}[]", field);
            form.extend(values.iter().map(|v| (key.clone(), v.clone())));
        }

        Ok(StreamRequest {
            url: endpoint.to_string(),
            headers: vec![(API_KEY_HEADER.to_string(), self.api_key.clone())],
            form,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> RequestFactory {
        let config = ClientConfig::default().with_base_url("https://api.example.test");
        RequestFactory::new(&config, "secret").unwrap()
    }

    fn query_pairs(url: &str) -> Vec<(String, String)> {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn test_endpoint_path_and_encoding() {
        let f = factory();
        assert_eq!(
            f.endpoint("contact").unwrap().as_str(),
            "https://api.example.test/v2/contact"
        );
        assert_eq!(
            f.endpoint("b2c online").unwrap().as_str(),
            "https://api.example.test/v2/b2c%20online"
        );
        assert!(f.endpoint("  ").is_err());
    }

    #[test]
    fn test_append_records_query_and_headers() {
        let row = InputRow::new()
            .with("first", "Ada")
            .with("email", "ada@example.com");
        let records = factory()
            .append_records("contact", vec![row], &["email", "phone"], &[])
            .unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.id, 0);
        assert_eq!(
            query_pairs(&record.url),
            vec![
                ("output[]".to_string(), "email".to_string()),
                ("output[]".to_string(), "phone".to_string()),
                ("first".to_string(), "Ada".to_string()),
                ("email".to_string(), "ada@example.com".to_string()),
                ("rcfg_max_time".to_string(), "9.8".to_string()),
            ]
        );
        assert!(record
            .headers
            .contains(&("Accept".to_string(), "application/json".to_string())));
        assert!(record
            .headers
            .contains(&(API_KEY_HEADER.to_string(), "secret".to_string())));
        // Inputs are echoed untouched.
        assert_eq!(record.inputs.get("rcfg_max_time"), None);
    }

    #[test]
    fn test_extra_params_override_row_and_defaults() {
        let row = InputRow::new().with("email", "a@b.c").with("rcfg_max_time", "1");
        let records = factory()
            .append_records(
                "contact",
                vec![row],
                &[],
                &[("rcfg_max_time", "3"), ("cfg_maxrecs", "5")],
            )
            .unwrap();
        assert_eq!(
            query_pairs(&records[0].url),
            vec![
                ("email".to_string(), "a@b.c".to_string()),
                ("rcfg_max_time".to_string(), "3".to_string()),
                ("cfg_maxrecs".to_string(), "5".to_string()),
            ]
        );
    }

    #[test]
    fn test_ids_follow_input_order() {
        let rows = (0..5).map(|i| InputRow::new().with("n", i.to_string())).collect();
        let records = factory().append_records("contact", rows, &[], &[]).unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert_eq!(records[3].inputs.get("n"), Some("3"));
    }

    #[test]
    fn test_max_time_floor_and_disable() {
        let mut config = ClientConfig::default();
        config.request_timeout = Duration::from_millis(250);
        let f = RequestFactory::new(&config, "k").unwrap();
        assert_eq!(f.max_time_param().as_deref(), Some("0.1"));

        config.request_timeout = Duration::ZERO;
        let f = RequestFactory::new(&config, "k").unwrap();
        assert_eq!(f.max_time_param(), None);
    }

    #[test]
    fn test_listgen_form_fields() {
        let inputs: ListgenInputs = vec![
            ("domain".to_string(), vec!["example.com".to_string(), "example.org".to_string()]),
            ("title".to_string(), vec!["cto".to_string()]),
            ("unused".to_string(), vec![]),
        ];
        let req = factory()
            .listgen_request("abm", &inputs, &["abm_email"])
            .unwrap();
        assert_eq!(req.url, "https://api.example.test/v2/abm");
        assert_eq!(
            req.form,
            vec![
                ("output[]".to_string(), "abm_email".to_string()),
                ("domain[]".to_string(), "example.com".to_string()),
                ("domain[]".to_string(), "example.org".to_string()),
                ("title[]".to_string(), "cto".to_string()),
            ]
        );
        assert_eq!(
            req.headers,
            vec![(API_KEY_HEADER.to_string(), "secret".to_string())]
        );
    }

    #[test]
    fn test_listgen_single_value_keeps_array_key() {
        let inputs: ListgenInputs = vec![("domain".to_string(), vec!["example.com".to_string()])];
        let req = factory().listgen_request("abm", &inputs, &[]).unwrap();
        assert_eq!(
            req.form,
            vec![("domain[]".to_string(), "example.com".to_string())]
        );
    }
}
