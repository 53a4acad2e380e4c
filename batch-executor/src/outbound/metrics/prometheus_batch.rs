//! Prometheus adapter for per-chunk batch samples.
//!
//! Each chunk sample feeds two families under identical labels: a histogram
//! of batch call latency and a counter of items carried, so summing the
//! counter recovers the number of items actually transported.

use async_trait::async_trait;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

use crate::domain::ports::{BatchMetrics, BatchMetricsError, ChunkMetricSample};

const LABELS: [&str; 4] = ["context", "success", "status", "status_code"];

/// Prometheus-backed recorder for batch chunk samples.
pub struct PrometheusBatchMetrics {
    batch_execute_seconds: HistogramVec,
    batch_size_total: IntCounterVec,
}

impl PrometheusBatchMetrics {
    /// Create and register both metric families under `namespace`.
    ///
    /// # Errors
    ///
    /// Returns an error when Prometheus rejects metric registration.
    pub fn new(registry: &Registry, namespace: &str) -> Result<Self, prometheus::Error> {
        let batch_execute_seconds = HistogramVec::new(
            HistogramOpts::new(
                "batch_execute_seconds",
                "Latency of batch calls by context and outcome",
            )
            .namespace(namespace),
            &LABELS,
        )?;
        let batch_size_total = IntCounterVec::new(
            Opts::new(
                "batch_size_total",
                "Items carried by batch calls by context and outcome",
            )
            .namespace(namespace),
            &LABELS,
        )?;
        registry.register(Box::new(batch_execute_seconds.clone()))?;
        registry.register(Box::new(batch_size_total.clone()))?;
        Ok(Self {
            batch_execute_seconds,
            batch_size_total,
        })
    }
}

#[async_trait]
impl BatchMetrics for PrometheusBatchMetrics {
    async fn record_chunk(&self, sample: &ChunkMetricSample) -> Result<(), BatchMetricsError> {
        let success = if sample.success { "true" } else { "false" };
        let status_code = sample.status_code.to_string();
        let labels = [
            sample.context.as_str(),
            success,
            sample.status_bucket().as_str(),
            status_code.as_str(),
        ];

        self.batch_execute_seconds
            .get_metric_with_label_values(&labels)
            .map_err(|error| BatchMetricsError::export(error.to_string()))?
            .observe(sample.elapsed.as_secs_f64());
        self.batch_size_total
            .get_metric_with_label_values(&labels)
            .map_err(|error| BatchMetricsError::export(error.to_string()))?
            .inc_by(u64::try_from(sample.weight).unwrap_or(u64::MAX));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for batch chunk metric families.

    use std::time::Duration;

    use super::*;
    use rstest::rstest;

    fn make_metrics() -> (Registry, PrometheusBatchMetrics) {
        let registry = Registry::new();
        let metrics = PrometheusBatchMetrics::new(&registry, "compute")
            .expect("metric registration should succeed");
        (registry, metrics)
    }

    fn sample(success: bool, status_code: u16, weight: usize) -> ChunkMetricSample {
        ChunkMetricSample {
            context: "ZonalServerGroupCaching.igm".to_owned(),
            success,
            status_code,
            weight,
            elapsed: Duration::from_millis(25),
        }
    }

    #[test]
    fn registers_namespaced_families() {
        let (registry, metrics) = make_metrics();
        metrics
            .batch_size_total
            .with_label_values(&["ctx", "true", "2xx", "200"])
            .inc();
        metrics
            .batch_execute_seconds
            .with_label_values(&["ctx", "true", "2xx", "200"])
            .observe(0.5);
        let families = registry.gather();

        for name in ["compute_batch_execute_seconds", "compute_batch_size_total"] {
            assert!(
                families.iter().any(|family| family.name() == name),
                "{name} should be registered"
            );
        }
    }

    #[rstest]
    #[case::success(true, 200, "2xx", 100)]
    #[case::client_error(false, 404, "4xx", 3)]
    #[case::unknown_failure(false, 500, "5xx", 37)]
    #[tokio::test]
    async fn records_timer_and_weighted_counter_with_shared_labels(
        #[case] success: bool,
        #[case] status_code: u16,
        #[case] bucket: &str,
        #[case] weight: usize,
    ) {
        let (_registry, metrics) = make_metrics();

        metrics
            .record_chunk(&sample(success, status_code, weight))
            .await
            .expect("recording should not fail");
        metrics
            .record_chunk(&sample(success, status_code, weight))
            .await
            .expect("recording should not fail");

        let status = status_code.to_string();
        let labels = [
            "ZonalServerGroupCaching.igm",
            if success { "true" } else { "false" },
            bucket,
            status.as_str(),
        ];
        let counter = metrics.batch_size_total.with_label_values(&labels);
        let histogram = metrics.batch_execute_seconds.with_label_values(&labels);

        assert_eq!(counter.get(), 2 * u64::try_from(weight).expect("weight fits"));
        assert_eq!(histogram.get_sample_count(), 2);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = Registry::new();
        PrometheusBatchMetrics::new(&registry, "compute").expect("first registration");
        assert!(PrometheusBatchMetrics::new(&registry, "compute").is_err());
    }
}
