//! Factory producing fresh one-shot executors over shared ports.

use crate::domain::get_first::GetFirstBatchRequest;
use crate::domain::paginated::PaginatedBatchRequest;

use super::{BatchRequest, BatchRequestPorts, BatchRequestRuntime, MaxBatchSize};

/// Hands out executors that share one transport, recorder and runner.
///
/// Executors are one-shot; keep the factory and call [`Self::create`] for
/// each logical batch.
#[derive(Clone)]
pub struct BatchRequestFactory {
    ports: BatchRequestPorts,
    runtime: BatchRequestRuntime,
    max_batch_size: MaxBatchSize,
}

impl BatchRequestFactory {
    /// Build a factory using the default Tokio runner.
    pub fn new(ports: BatchRequestPorts, max_batch_size: MaxBatchSize) -> Self {
        Self::with_runtime(ports, BatchRequestRuntime::default(), max_batch_size)
    }

    /// Build a factory with an injected runtime.
    pub const fn with_runtime(
        ports: BatchRequestPorts,
        runtime: BatchRequestRuntime,
        max_batch_size: MaxBatchSize,
    ) -> Self {
        Self {
            ports,
            runtime,
            max_batch_size,
        }
    }

    /// The chunk size bound given to every executor.
    #[must_use]
    pub const fn max_batch_size(&self) -> MaxBatchSize {
        self.max_batch_size
    }

    /// Create an empty executor.
    #[must_use]
    pub fn create(&self) -> BatchRequest {
        BatchRequest::with_runtime(self.ports.clone(), self.runtime.clone(), self.max_batch_size)
    }

    /// Create an executor answering with the first successful item.
    #[must_use]
    pub fn create_get_first<T: Send + 'static>(&self) -> GetFirstBatchRequest<T> {
        GetFirstBatchRequest::new(self.create())
    }

    /// Create an executor that follows page tokens across batch rounds.
    #[must_use]
    pub fn create_paginated<T: Send + 'static>(&self) -> PaginatedBatchRequest<T> {
        PaginatedBatchRequest::new(self.clone())
    }
}
