//! 客户端配置：默认值、YAML 文件与环境变量三层覆盖。
//!
//! Client configuration.
//!
//! Values are layered: [`ClientConfig::default`] → optional YAML file
//! ([`ClientConfig::from_yaml_file`]) → `REACH_*` environment variables
//! ([`ClientConfig::with_env_overrides`]). [`ClientConfig::validate`] is called by
//! the client builder before any I/O happens.

use crate::error::{Error, ErrorContext};
use crate::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_BASE_URL: &str = "https://api.versium.com";

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_version: u32,
    /// Requests started per second; also the batch size.
    pub quota_per_second: usize,
    /// Retries after the first attempt (total attempts = max_retries + 1).
    pub max_retries: u32,
    pub connect_timeout: Duration,
    /// Per-request total timeout. Zero disables it.
    pub request_timeout: Duration,
    /// Total timeout for a listgen transfer. Zero disables it.
    pub stream_timeout: Duration,
    /// Upper bound on one dispatch of a batch (all requests together).
    pub batch_deadline: Duration,
    /// Fixed wait between retry attempts.
    pub retry_backoff: Duration,
    /// Minimum spacing between consecutive batch starts.
    pub min_batch_interval: Duration,
    /// HTTP statuses treated as retryable. Status 0 (no response) is always retryable.
    pub retry_on_status: Vec<u16>,
    /// Directory for listgen scratch files; system temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
    pub proxy_url: Option<String>,
    /// Include request/response payloads in debug logs.
    pub verbose: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: 2,
            quota_per_second: 20,
            max_retries: 3,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            stream_timeout: Duration::from_secs(300),
            batch_deadline: Duration::from_secs(20),
            retry_backoff: Duration::from_secs(2),
            min_batch_interval: Duration::from_millis(1100),
            retry_on_status: vec![429, 500],
            scratch_dir: None,
            proxy_url: None,
            verbose: false,
        }
    }
}

/// On-disk shape of a config file. Every field is optional; durations are milliseconds.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    base_url: Option<String>,
    api_version: Option<u32>,
    quota_per_second: Option<usize>,
    max_retries: Option<u32>,
    connect_timeout_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    stream_timeout_ms: Option<u64>,
    batch_deadline_ms: Option<u64>,
    retry_backoff_ms: Option<u64>,
    min_batch_interval_ms: Option<u64>,
    retry_on_status: Option<Vec<u16>>,
    scratch_dir: Option<PathBuf>,
    proxy_url: Option<String>,
    verbose: Option<bool>,
}

impl ConfigFile {
    fn apply(self, mut cfg: ClientConfig) -> ClientConfig {
        if let Some(v) = self.base_url {
            cfg.base_url = v;
        }
        if let Some(v) = self.api_version {
            cfg.api_version = v;
        }
        if let Some(v) = self.quota_per_second {
            cfg.quota_per_second = v;
        }
        if let Some(v) = self.max_retries {
            cfg.max_retries = v;
        }
        if let Some(ms) = self.connect_timeout_ms {
            cfg.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.request_timeout_ms {
            cfg.request_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.stream_timeout_ms {
            cfg.stream_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.batch_deadline_ms {
            cfg.batch_deadline = Duration::from_millis(ms);
        }
        if let Some(ms) = self.retry_backoff_ms {
            cfg.retry_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = self.min_batch_interval_ms {
            cfg.min_batch_interval = Duration::from_millis(ms);
        }
        if let Some(v) = self.retry_on_status {
            cfg.retry_on_status = v;
        }
        if self.scratch_dir.is_some() {
            cfg.scratch_dir = self.scratch_dir;
        }
        if self.proxy_url.is_some() {
            cfg.proxy_url = self.proxy_url;
        }
        if let Some(v) = self.verbose {
            cfg.verbose = v;
        }
        cfg
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(variable = name, value = %raw, "ignoring unparsable environment override");
            None
        }
    }
}

fn env_millis(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(Duration::from_millis)
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a YAML document layered over the defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let file: ConfigFile = serde_yaml::from_str(yaml)?;
        Ok(file.apply(Self::default()))
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&raw)
    }

    /// Defaults with `REACH_*` environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `REACH_*` environment overrides. Unparsable values are logged and ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("REACH_BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = env_parse("REACH_API_VERSION") {
            self.api_version = v;
        }
        if let Some(v) = env_parse("REACH_QPS") {
            self.quota_per_second = v;
        }
        if let Some(v) = env_parse("REACH_MAX_RETRIES") {
            self.max_retries = v;
        }
        if let Some(d) = env_millis("REACH_CONNECT_TIMEOUT_MS") {
            self.connect_timeout = d;
        }
        if let Some(d) = env_millis("REACH_TIMEOUT_MS") {
            self.request_timeout = d;
        }
        if let Some(d) = env_millis("REACH_STREAM_TIMEOUT_MS") {
            self.stream_timeout = d;
        }
        if let Some(d) = env_millis("REACH_BATCH_DEADLINE_MS") {
            self.batch_deadline = d;
        }
        if let Some(d) = env_millis("REACH_RETRY_BACKOFF_MS") {
            self.retry_backoff = d;
        }
        if let Some(d) = env_millis("REACH_MIN_BATCH_INTERVAL_MS") {
            self.min_batch_interval = d;
        }
        if let Ok(v) = std::env::var("REACH_SCRATCH_DIR") {
            self.scratch_dir = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("REACH_PROXY_URL") {
            self.proxy_url = Some(v);
        }
        if let Ok(v) = std::env::var("REACH_VERBOSE") {
            self.verbose = matches!(v.trim(), "1" | "true" | "yes");
        }
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_quota(mut self, quota_per_second: usize) -> Self {
        self.quota_per_second = quota_per_second;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_min_batch_interval(mut self, interval: Duration) -> Self {
        self.min_batch_interval = interval;
        self
    }

    pub fn with_batch_deadline(mut self, deadline: Duration) -> Self {
        self.batch_deadline = deadline;
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, request: Duration) -> Self {
        self.connect_timeout = connect;
        self.request_timeout = request;
        self
    }

    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout;
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Fail fast on values that would make the engine misbehave.
    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &str, msg: &str, details: String| {
            Error::configuration_with_context(
                msg,
                ErrorContext::new()
                    .with_field_path(format!("config.{}", field))
                    .with_details(details)
                    .with_source("config_validator"),
            )
        };

        if self.quota_per_second == 0 {
            return Err(invalid(
                "quota_per_second",
                "quota per second must be at least 1",
                "got 0".to_string(),
            ));
        }
        if self.api_version == 0 {
            return Err(invalid(
                "api_version",
                "api version must be at least 1",
                "got 0".to_string(),
            ));
        }
        if self.batch_deadline.is_zero() {
            return Err(invalid(
                "batch_deadline",
                "batch deadline must be greater than zero",
                "got 0ms".to_string(),
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(invalid(
                "connect_timeout",
                "connect timeout must be greater than zero",
                "got 0ms".to_string(),
            ));
        }
        match url::Url::parse(&self.base_url) {
            Ok(u) if u.scheme() == "http" || u.scheme() == "https" => {}
            Ok(u) => {
                return Err(invalid(
                    "base_url",
                    "base url must use http or https",
                    format!("scheme '{}'", u.scheme()),
                ))
            }
            Err(e) => {
                return Err(invalid(
                    "base_url",
                    "base url is not a valid URL",
                    format!("{}: {}", self.base_url, e),
                ))
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.quota_per_second, 20);
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.min_batch_interval, Duration::from_millis(1100));
        assert_eq!(cfg.retry_backoff, Duration::from_secs(2));
        assert_eq!(cfg.batch_deadline, Duration::from_secs(20));
        assert_eq!(cfg.retry_on_status, vec![429, 500]);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_yaml_layers_over_defaults() {
        let cfg = ClientConfig::from_yaml_str(
            "quota_per_second: 5\nretry_backoff_ms: 250\nretry_on_status: [429, 500, 503]\n",
        )
        .unwrap();
        assert_eq!(cfg.quota_per_second, 5);
        assert_eq!(cfg.retry_backoff, Duration::from_millis(250));
        assert_eq!(cfg.retry_on_status, vec![429, 500, 503]);
        assert_eq!(cfg.max_retries, 3);
    }

    #[test]
    fn test_yaml_rejects_unknown_fields() {
        let err = ClientConfig::from_yaml_str("qps: 5\n").unwrap_err();
        assert!(matches!(err, Error::Yaml(_)));
    }

    #[test]
    fn test_validate_rejects_zero_quota() {
        let err = ClientConfig::default().with_quota(0).validate().unwrap_err();
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("config.quota_per_second")
        );
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        assert!(ClientConfig::default()
            .with_base_url("not a url")
            .validate()
            .is_err());
        assert!(ClientConfig::default()
            .with_base_url("ftp://api.example.test")
            .validate()
            .is_err());
    }

    #[test]
    fn test_validate_rejects_zero_deadline() {
        let err = ClientConfig::default()
            .with_batch_deadline(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_env_overrides_apply_and_skip_unparsable_values() {
        // Only this test touches these variables.
        std::env::set_var("REACH_QPS", "7");
        std::env::set_var("REACH_RETRY_BACKOFF_MS", "250");
        std::env::set_var("REACH_MAX_RETRIES", "notanumber");
        std::env::set_var("REACH_VERBOSE", "true");

        let cfg = ClientConfig::default().with_env_overrides();

        for var in [
            "REACH_QPS",
            "REACH_RETRY_BACKOFF_MS",
            "REACH_MAX_RETRIES",
            "REACH_VERBOSE",
        ] {
            std::env::remove_var(var);
        }

        assert_eq!(cfg.quota_per_second, 7);
        assert_eq!(cfg.retry_backoff, Duration::from_millis(250));
        assert_eq!(cfg.max_retries, 3);
        assert!(cfg.verbose);
        assert_eq!(cfg.batch_deadline, Duration::from_secs(20));
    }
}
