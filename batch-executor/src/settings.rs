//! Runner configuration loaded via OrthoConfig.
//!
//! Values layer as CLI flags over `BATCH_EXECUTOR_*` environment variables
//! over configuration files over declared defaults. Optional values fall back
//! in their accessors.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::domain::{MaxBatchSize, MaxBatchSizeError};

const DEFAULT_METRIC_NAMESPACE: &str = "remote_api";
const DEFAULT_CONTEXT: &str = "batch-exec";

/// Errors raised when settings cannot be turned into runtime values.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// No batch endpoint was configured.
    #[error("no batch endpoint configured (set BATCH_EXECUTOR_ENDPOINT)")]
    MissingEndpoint,
    /// The configured endpoint is not an absolute URL.
    #[error("invalid batch endpoint {value:?}: {source}")]
    InvalidEndpoint {
        /// Raw configured value.
        value: String,
        /// Parser failure.
        #[source]
        source: url::ParseError,
    },
    /// No requests file was configured.
    #[error("no requests file configured (set BATCH_EXECUTOR_REQUESTS_PATH)")]
    MissingRequestsPath,
    /// The configured batch size is unusable.
    #[error(transparent)]
    MaxBatchSize(#[from] MaxBatchSizeError),
}

/// Configuration for the `batch-exec` runner.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "BATCH_EXECUTOR")]
pub struct BatchExecutorSettings {
    /// Batch endpoint receiving `multipart/mixed` envelopes.
    pub endpoint: Option<String>,
    /// Maximum number of items per batch call.
    pub max_batch_size: Option<usize>,
    /// Per-call timeout in seconds.
    #[ortho_config(default = 30)]
    pub timeout_seconds: u64,
    /// User agent override for batch calls.
    pub user_agent: Option<String>,
    /// Namespace prefixed to exported metric names.
    pub metric_namespace: Option<String>,
    /// Caller context attached to every metric sample.
    pub context: Option<String>,
    /// JSON file holding the sub-requests to execute.
    pub requests_path: Option<PathBuf>,
    /// File receiving the Prometheus exposition after a run.
    pub metrics_path: Option<PathBuf>,
}

impl BatchExecutorSettings {
    /// Parse the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::MissingEndpoint`] when unset and
    /// [`SettingsError::InvalidEndpoint`] when unparsable.
    pub fn endpoint(&self) -> Result<Url, SettingsError> {
        let raw = self
            .endpoint
            .as_deref()
            .ok_or(SettingsError::MissingEndpoint)?;
        Url::parse(raw).map_err(|source| SettingsError::InvalidEndpoint {
            value: raw.to_owned(),
            source,
        })
    }

    /// Return the batch size bound, falling back to the default of 100.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::MaxBatchSize`] when the configured value is 0.
    pub fn max_batch_size(&self) -> Result<MaxBatchSize, SettingsError> {
        self.max_batch_size
            .map_or(Ok(MaxBatchSize::DEFAULT), MaxBatchSize::new)
            .map_err(SettingsError::from)
    }

    /// Return the per-call timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Return the configured user agent, if any.
    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    /// Return the metric namespace, falling back to the default.
    #[must_use]
    pub fn metric_namespace(&self) -> &str {
        self.metric_namespace
            .as_deref()
            .unwrap_or(DEFAULT_METRIC_NAMESPACE)
    }

    /// Return the metric context, falling back to the default.
    #[must_use]
    pub fn context(&self) -> &str {
        self.context.as_deref().unwrap_or(DEFAULT_CONTEXT)
    }

    /// Return the requests file path.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::MissingRequestsPath`] when unset.
    pub fn requests_path(&self) -> Result<&Path, SettingsError> {
        self.requests_path
            .as_deref()
            .ok_or(SettingsError::MissingRequestsPath)
    }

    /// Return the metrics exposition file, if one is configured.
    #[must_use]
    pub fn metrics_path(&self) -> Option<&Path> {
        self.metrics_path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for runner configuration parsing.

    use super::*;
    use std::ffi::OsString;

    use env_lock::lock_env;
    use rstest::rstest;

    const VARS: [&str; 8] = [
        "BATCH_EXECUTOR_ENDPOINT",
        "BATCH_EXECUTOR_MAX_BATCH_SIZE",
        "BATCH_EXECUTOR_TIMEOUT_SECONDS",
        "BATCH_EXECUTOR_USER_AGENT",
        "BATCH_EXECUTOR_METRIC_NAMESPACE",
        "BATCH_EXECUTOR_CONTEXT",
        "BATCH_EXECUTOR_REQUESTS_PATH",
        "BATCH_EXECUTOR_METRICS_PATH",
    ];

    fn load_from_empty_args() -> BatchExecutorSettings {
        BatchExecutorSettings::load_from_iter([OsString::from("batch-exec")])
            .expect("config should load")
    }

    fn cleared_env() -> Vec<(&'static str, Option<String>)> {
        VARS.iter().map(|name| (*name, None::<String>)).collect()
    }

    #[rstest]
    fn default_values_are_used_when_missing() {
        let _guard = lock_env(cleared_env());

        let settings = load_from_empty_args();
        assert_eq!(
            settings.max_batch_size().expect("default size"),
            MaxBatchSize::DEFAULT
        );
        assert_eq!(settings.timeout(), Duration::from_secs(30));
        assert_eq!(settings.metric_namespace(), DEFAULT_METRIC_NAMESPACE);
        assert_eq!(settings.context(), DEFAULT_CONTEXT);
        assert!(settings.user_agent().is_none());
        assert!(settings.metrics_path().is_none());
        assert!(matches!(
            settings.endpoint(),
            Err(SettingsError::MissingEndpoint)
        ));
        assert!(matches!(
            settings.requests_path(),
            Err(SettingsError::MissingRequestsPath)
        ));
    }

    #[rstest]
    fn environment_overrides_are_respected() {
        let _guard = lock_env([
            (
                "BATCH_EXECUTOR_ENDPOINT",
                Some("https://compute.example.test/batch/compute/v1".to_owned()),
            ),
            ("BATCH_EXECUTOR_MAX_BATCH_SIZE", Some("25".to_owned())),
            ("BATCH_EXECUTOR_TIMEOUT_SECONDS", Some("5".to_owned())),
            ("BATCH_EXECUTOR_USER_AGENT", Some("caching-agent/1".to_owned())),
            ("BATCH_EXECUTOR_METRIC_NAMESPACE", Some("compute".to_owned())),
            ("BATCH_EXECUTOR_CONTEXT", Some("igm-refresh".to_owned())),
            (
                "BATCH_EXECUTOR_REQUESTS_PATH",
                Some("/tmp/requests.json".to_owned()),
            ),
            (
                "BATCH_EXECUTOR_METRICS_PATH",
                Some("/tmp/batch-metrics.prom".to_owned()),
            ),
        ]);

        let settings = load_from_empty_args();
        assert_eq!(
            settings.endpoint().expect("endpoint parses").as_str(),
            "https://compute.example.test/batch/compute/v1"
        );
        assert_eq!(settings.max_batch_size().expect("valid size").get(), 25);
        assert_eq!(settings.timeout(), Duration::from_secs(5));
        assert_eq!(settings.user_agent(), Some("caching-agent/1"));
        assert_eq!(settings.metric_namespace(), "compute");
        assert_eq!(settings.context(), "igm-refresh");
        assert_eq!(
            settings.requests_path().expect("path set"),
            Path::new("/tmp/requests.json")
        );
        assert_eq!(
            settings.metrics_path(),
            Some(Path::new("/tmp/batch-metrics.prom"))
        );
    }

    #[rstest]
    #[case::zero_size("BATCH_EXECUTOR_MAX_BATCH_SIZE", "0")]
    #[case::relative_endpoint("BATCH_EXECUTOR_ENDPOINT", "batch/compute/v1")]
    fn unusable_values_are_rejected(#[case] name: &'static str, #[case] value: &str) {
        let mut env = cleared_env();
        env.retain(|(var, _)| *var != name);
        env.push((name, Some(value.to_owned())));
        let _guard = lock_env(env);

        let settings = load_from_empty_args();
        let rejected = if name == "BATCH_EXECUTOR_ENDPOINT" {
            settings.endpoint().map(|_| ())
        } else {
            settings.max_batch_size().map(|_| ())
        };
        assert!(rejected.is_err());
    }
}
