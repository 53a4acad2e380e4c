//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **http_batch**: reqwest transport speaking the `multipart/mixed` batch
//!   envelope protocol
//! - **metrics**: Prometheus-backed chunk metrics (feature-gated)
//!
//! Adapters are thin translators between domain types and wire or exporter
//! representations. They contain no batching logic.

pub mod http_batch;
#[cfg(feature = "metrics")]
pub mod metrics;
