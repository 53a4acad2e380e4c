//! Domain ports and supporting types for the hexagonal boundary.
//!
//! Ports describe how the batching core expects to interact with driven
//! adapters: the batch envelope transport and the metrics exporter. Each
//! trait exposes strongly typed errors so adapters map their failures into
//! predictable variants.

mod macros;
pub(crate) use macros::define_port_error;

mod batch_metrics;
mod batch_transport;

#[cfg(test)]
pub use batch_metrics::MockBatchMetrics;
pub use batch_metrics::{
    BatchMetrics, BatchMetricsError, ChunkMetricSample, NoOpBatchMetrics, StatusBucket,
};
#[cfg(test)]
pub use batch_transport::MockBatchTransport;
pub use batch_transport::{
    BatchTransport, SubRequest, SubRequestMethod, SubResponse, TransportError,
};
