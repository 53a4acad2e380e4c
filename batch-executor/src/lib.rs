//! Bounded-batch execution of typed remote API requests.
//!
//! Callers queue typed requests, each paired with a result handler, on a
//! [`domain::BatchRequest`]. Executing it splits the queue into chunks of at
//! most [`domain::MaxBatchSize`] items and sends each chunk as one batch
//! envelope through the [`domain::ports::BatchTransport`] port. Sub-results
//! are dispatched to handlers in queue order; the first failed batch call
//! stops execution.
//!
//! - [`domain`]: executor, typed requests, query helpers, and ports
//! - [`outbound`]: reqwest batch transport and Prometheus metrics
//! - [`inbound`]: the command-line runner behind `batch-exec`
//! - [`settings`]: OrthoConfig-backed runner configuration

pub mod domain;
pub mod inbound;
pub mod outbound;
pub mod settings;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
