//! Domain port surface for per-chunk batch metrics.
//!
//! The executor emits exactly one sample per attempted chunk. A sample
//! carries both the timer observation (`elapsed`) and the counter weight
//! (`weight`, the chunk's item count) so adapters record the two series
//! under identical tags.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use super::define_port_error;

define_port_error! {
    /// Errors exposed when recording batch metrics.
    pub enum BatchMetricsError {
        /// Metric exporter rejected the write.
        Export {
            /// Exporter error text.
            message: String,
        } => "batch metrics exporter failed: {message}",
    }
}

/// Coarse status family used as a metric tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusBucket {
    /// `2xx`
    Success,
    /// `3xx`
    Redirection,
    /// `4xx`
    ClientError,
    /// `5xx`, and any code outside 200..=499.
    ServerError,
}

impl StatusBucket {
    /// Bucket an HTTP status code.
    ///
    /// # Examples
    /// ```
    /// use batch_executor::domain::ports::StatusBucket;
    ///
    /// assert_eq!(StatusBucket::from_status(404).as_str(), "4xx");
    /// assert_eq!(StatusBucket::from_status(0).as_str(), "5xx");
    /// ```
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            200..=299 => Self::Success,
            300..=399 => Self::Redirection,
            400..=499 => Self::ClientError,
            _ => Self::ServerError,
        }
    }

    /// Return the tag value for this bucket.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "2xx",
            Self::Redirection => "3xx",
            Self::ClientError => "4xx",
            Self::ServerError => "5xx",
        }
    }
}

impl fmt::Display for StatusBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One chunk-level metric sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMetricSample {
    /// Caller-supplied context label.
    pub context: String,
    /// Whether the chunk's batch call completed.
    pub success: bool,
    /// Envelope status code; `500` when the failure carried none.
    pub status_code: u16,
    /// Number of items in the chunk.
    pub weight: usize,
    /// Wall time spent on the chunk's batch call.
    pub elapsed: Duration,
}

impl ChunkMetricSample {
    /// Return the status bucket tag derived from `status_code`.
    #[must_use]
    pub const fn status_bucket(&self) -> StatusBucket {
        StatusBucket::from_status(self.status_code)
    }
}

/// Metrics recording port for batch chunk samples.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BatchMetrics: Send + Sync {
    /// Record one timer sample and one counter sample for a chunk.
    ///
    /// ```rust,ignore
    /// use std::time::Duration;
    ///
    /// use batch_executor::domain::ports::{
    ///     BatchMetrics, BatchMetricsError, ChunkMetricSample, NoOpBatchMetrics,
    /// };
    ///
    /// # async fn demo() {
    /// let metrics = NoOpBatchMetrics;
    /// let sample = ChunkMetricSample {
    ///     context: "ctx".to_owned(),
    ///     success: true,
    ///     status_code: 200,
    ///     weight: 3,
    ///     elapsed: Duration::from_millis(12),
    /// };
    ///
    /// let result = metrics.record_chunk(&sample).await;
    /// assert!(result.is_ok());
    /// let _ = Ok::<(), BatchMetricsError>(());
    /// # }
    /// ```
    async fn record_chunk(&self, sample: &ChunkMetricSample) -> Result<(), BatchMetricsError>;
}

/// No-op implementation used when metrics are disabled or in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpBatchMetrics;

#[async_trait]
impl BatchMetrics for NoOpBatchMetrics {
    async fn record_chunk(&self, _sample: &ChunkMetricSample) -> Result<(), BatchMetricsError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    //! Coverage for status bucketing.

    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(200, StatusBucket::Success)]
    #[case(204, StatusBucket::Success)]
    #[case(304, StatusBucket::Redirection)]
    #[case(404, StatusBucket::ClientError)]
    #[case(429, StatusBucket::ClientError)]
    #[case(500, StatusBucket::ServerError)]
    #[case(503, StatusBucket::ServerError)]
    #[case(101, StatusBucket::ServerError)]
    #[case(999, StatusBucket::ServerError)]
    fn buckets_status_codes(#[case] status: u16, #[case] expected: StatusBucket) {
        assert_eq!(StatusBucket::from_status(status), expected);
    }
}
