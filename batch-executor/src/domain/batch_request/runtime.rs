//! Port and runtime dependency bundles for batch executors.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::ports::{BatchMetrics, BatchTransport, SubResponse, TransportError};

use super::{ChunkCall, ChunkRunner};

/// Port bundle required by batch executors.
#[derive(Clone)]
pub struct BatchRequestPorts {
    /// Outbound batch envelope transport.
    pub transport: Arc<dyn BatchTransport>,
    /// Per-chunk metrics recorder.
    pub metrics: Arc<dyn BatchMetrics>,
}

impl BatchRequestPorts {
    /// Build a strongly-typed executor port bundle.
    pub fn new(transport: Arc<dyn BatchTransport>, metrics: Arc<dyn BatchMetrics>) -> Self {
        Self { transport, metrics }
    }
}

/// Runtime helpers controlling how a chunk's batch call is driven.
#[derive(Clone)]
pub struct BatchRequestRuntime {
    /// Task runner used for each chunk's batch call.
    pub runner: Arc<dyn ChunkRunner>,
}

impl Default for BatchRequestRuntime {
    fn default() -> Self {
        Self {
            runner: Arc::new(TokioChunkRunner),
        }
    }
}

impl BatchRequestRuntime {
    /// Runtime that awaits every chunk call on the caller's task.
    #[must_use]
    pub fn inline() -> Self {
        Self {
            runner: Arc::new(InlineChunkRunner),
        }
    }
}

/// Runner that awaits the chunk call directly on the calling task.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineChunkRunner;

#[async_trait]
impl ChunkRunner for InlineChunkRunner {
    async fn run(&self, call: ChunkCall) -> Result<Vec<SubResponse>, TransportError> {
        call.await
    }
}

/// Runner that spawns the chunk call onto the ambient Tokio runtime.
///
/// The executor still awaits the join handle before preparing the next
/// chunk, so spawning changes where the call runs but not chunk ordering.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioChunkRunner;

#[async_trait]
impl ChunkRunner for TokioChunkRunner {
    async fn run(&self, call: ChunkCall) -> Result<Vec<SubResponse>, TransportError> {
        tokio::spawn(call)
            .await
            .map_err(|error| TransportError::runner(format!("batch chunk task failed: {error}")))?
    }
}
