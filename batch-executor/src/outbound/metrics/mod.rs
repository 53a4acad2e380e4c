//! Outbound adapters for metrics exporting.
//!
//! This module provides the Prometheus-backed implementation of the batch
//! metrics port. It is feature-gated behind the `metrics` feature.

mod prometheus_batch;

pub use prometheus_batch::PrometheusBatchMetrics;
