//! Bounded-batch request executor.
//!
//! A [`BatchRequest`] collects typed requests and their result handlers,
//! splits them into chunks of at most [`MaxBatchSize`] items, and sends each
//! chunk as one batch envelope through the [`BatchTransport`] port. Chunks run
//! strictly in order. The first transport-level failure stops execution and
//! is returned unchanged; later chunks are never attempted. Every attempted
//! chunk records exactly one [`ChunkMetricSample`].

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::ErrorDetails;
use crate::domain::ports::{
    BatchMetrics, BatchTransport, ChunkMetricSample, SubRequest, SubResponse, TransportError,
};
use crate::domain::typed_request::{ResultHandler, TypedRequest, deliver};

mod factory;
mod partition;
mod runtime;

pub use factory::BatchRequestFactory;
pub use runtime::{BatchRequestPorts, BatchRequestRuntime, InlineChunkRunner, TokioChunkRunner};

use partition::partition;

/// Status recorded for a chunk whose batch call completed.
const CHUNK_SUCCESS_STATUS: u16 = 200;
/// Status recorded for a failed chunk whose error carries no HTTP status.
const CHUNK_UNKNOWN_FAILURE_STATUS: u16 = 500;

/// Owned future performing exactly one batch call.
pub type ChunkCall = BoxFuture<'static, Result<Vec<SubResponse>, TransportError>>;

/// Task runner used to drive one chunk's batch call.
///
/// The executor awaits `run` before preparing the next chunk, so ordering
/// and fail-fast hold whatever the runner does internally.
#[async_trait]
pub trait ChunkRunner: Send + Sync {
    /// Drive `call` to completion and return its output.
    ///
    /// ```rust,ignore
    /// let responses = runner.run(Box::pin(async { Ok(Vec::new()) })).await?;
    /// assert!(responses.is_empty());
    /// # Ok::<(), batch_executor::domain::ports::TransportError>(())
    /// ```
    async fn run(&self, call: ChunkCall) -> Result<Vec<SubResponse>, TransportError>;
}

/// Upper bound on the number of items carried by one batch call.
///
/// # Examples
/// ```
/// use batch_executor::domain::MaxBatchSize;
///
/// assert_eq!(MaxBatchSize::default().get(), 100);
/// assert!(MaxBatchSize::new(0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaxBatchSize(NonZeroUsize);

/// Validation errors raised by [`MaxBatchSize::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MaxBatchSizeError {
    /// A batch must be allowed to hold at least one item.
    #[error("max batch size must be at least 1")]
    Zero,
}

impl MaxBatchSize {
    /// Ceiling documented for Google-style batch endpoints.
    pub const DEFAULT: Self = Self(NonZeroUsize::MIN.saturating_add(99));

    /// Validate a batch size.
    ///
    /// # Errors
    /// Returns [`MaxBatchSizeError::Zero`] when `value` is zero.
    pub fn new(value: usize) -> Result<Self, MaxBatchSizeError> {
        NonZeroUsize::new(value)
            .map(Self)
            .ok_or(MaxBatchSizeError::Zero)
    }

    /// Return the size as a plain integer.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0.get()
    }
}

impl Default for MaxBatchSize {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<usize> for MaxBatchSize {
    type Error = MaxBatchSizeError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Failure of a batch query that reduces item outcomes to one answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchQueryError {
    /// A batch call failed as a whole.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// An individual operation failed.
    #[error(transparent)]
    Item(#[from] ErrorDetails),
    /// A list page pointed back at itself as the next page.
    #[error("list returned page token {token:?} for its own page")]
    RepeatedPageToken {
        /// Token returned for the page it identifies.
        token: String,
    },
}

type Dispatch = Box<dyn FnOnce(SubResponse) + Send>;

struct QueuedItem {
    request: SubRequest,
    dispatch: Dispatch,
}

/// One-shot executor for queued typed requests.
///
/// Queue every request first, then call [`BatchRequest::execute`] once.
/// `execute` consumes the executor, so it cannot be reused.
pub struct BatchRequest {
    transport: Arc<dyn BatchTransport>,
    metrics: Arc<dyn BatchMetrics>,
    runner: Arc<dyn ChunkRunner>,
    max_batch_size: MaxBatchSize,
    queue: Vec<QueuedItem>,
}

impl BatchRequest {
    /// Build an executor using the default Tokio runner.
    /// ```rust,ignore
    /// let batch = BatchRequest::new(ports, MaxBatchSize::default());
    /// ```
    pub fn new(ports: BatchRequestPorts, max_batch_size: MaxBatchSize) -> Self {
        Self::with_runtime(ports, BatchRequestRuntime::default(), max_batch_size)
    }

    /// Build an executor with an injected runtime.
    /// ```rust,ignore
    /// let batch = BatchRequest::with_runtime(ports, BatchRequestRuntime::inline(), size);
    /// ```
    pub fn with_runtime(
        ports: BatchRequestPorts,
        runtime: BatchRequestRuntime,
        max_batch_size: MaxBatchSize,
    ) -> Self {
        Self {
            transport: ports.transport,
            metrics: ports.metrics,
            runner: runtime.runner,
            max_batch_size,
            queue: Vec::new(),
        }
    }

    /// Append `request` and the handler receiving its outcome.
    ///
    /// Performs no I/O. Requests with different response types may share
    /// one executor.
    pub fn queue<R, H>(&mut self, request: R, handler: H)
    where
        R: TypedRequest,
        H: ResultHandler<R::Response> + Send + 'static,
    {
        let sub_request = request.to_sub_request();
        self.queue.push(QueuedItem {
            request: sub_request,
            dispatch: Box::new(move |response| deliver(&request, handler, response)),
        });
    }

    /// Number of queued requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Return whether nothing has been queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// The chunk size bound applied by [`BatchRequest::execute`].
    #[must_use]
    pub const fn max_batch_size(&self) -> MaxBatchSize {
        self.max_batch_size
    }

    /// Send every queued request, one batch call per chunk, in order.
    ///
    /// Handlers of a chunk run after its batch call completes and before the
    /// next chunk is submitted. An empty queue makes no calls and records no
    /// metrics.
    ///
    /// ```rust,ignore
    /// batch.queue(JsonRequest::<Value>::get("/compute/v1/projects/demo"), |result| {
    ///     println!("{:?}", result.is_success());
    /// });
    /// batch.execute("ZonalServerGroupCaching.igm").await?;
    /// # Ok::<(), TransportError>(())
    /// ```
    ///
    /// # Errors
    /// Returns the first chunk's [`TransportError`] unchanged. Handlers of
    /// the failed chunk and of every later chunk are never invoked.
    pub async fn execute(self, context: &str) -> Result<(), TransportError> {
        let Self {
            transport,
            metrics,
            runner,
            max_batch_size,
            queue,
        } = self;
        let sender = ChunkSender {
            transport,
            metrics,
            runner,
        };

        let chunks = partition(queue, max_batch_size);
        let chunk_count = chunks.len();
        for (index, chunk) in chunks.into_iter().enumerate() {
            let position = ChunkPosition {
                context,
                index,
                chunk_count,
            };
            sender.send(&position, chunk).await?;
        }
        Ok(())
    }
}

/// Where a chunk sits within one `execute` call, for logs and metrics.
struct ChunkPosition<'a> {
    context: &'a str,
    index: usize,
    chunk_count: usize,
}

struct ChunkSender {
    transport: Arc<dyn BatchTransport>,
    metrics: Arc<dyn BatchMetrics>,
    runner: Arc<dyn ChunkRunner>,
}

impl ChunkSender {
    async fn send(
        &self,
        position: &ChunkPosition<'_>,
        chunk: Vec<QueuedItem>,
    ) -> Result<(), TransportError> {
        let ChunkPosition {
            context,
            index,
            chunk_count,
        } = *position;
        let weight = chunk.len();
        let (requests, dispatchers): (Vec<SubRequest>, Vec<Dispatch>) = chunk
            .into_iter()
            .map(|item| (item.request, item.dispatch))
            .unzip();

        debug!(
            context,
            chunk = index + 1,
            chunk_count,
            size = weight,
            "submitting batch chunk"
        );
        let transport = Arc::clone(&self.transport);
        let call: ChunkCall = Box::pin(async move { transport.send_batch(requests).await });

        let started = Instant::now();
        let outcome = self
            .runner
            .run(call)
            .await
            .and_then(|responses| ensure_response_count(weight, responses));
        let elapsed = started.elapsed();

        match outcome {
            Ok(responses) => {
                self.record(&ChunkMetricSample {
                    context: context.to_owned(),
                    success: true,
                    status_code: CHUNK_SUCCESS_STATUS,
                    weight,
                    elapsed,
                })
                .await;
                debug!(
                    context,
                    chunk = index + 1,
                    chunk_count,
                    size = weight,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "batch chunk completed"
                );
                for (dispatch, response) in dispatchers.into_iter().zip(responses) {
                    dispatch(response);
                }
                Ok(())
            }
            Err(error) => {
                let status_code = error
                    .status_code()
                    .unwrap_or(CHUNK_UNKNOWN_FAILURE_STATUS);
                warn!(
                    context,
                    chunk = index + 1,
                    chunk_count,
                    size = weight,
                    status_code,
                    error = %error,
                    "batch chunk failed; abandoning remaining chunks"
                );
                self.record(&ChunkMetricSample {
                    context: context.to_owned(),
                    success: false,
                    status_code,
                    weight,
                    elapsed,
                })
                .await;
                Err(error)
            }
        }
    }

    async fn record(&self, sample: &ChunkMetricSample) {
        if let Err(error) = self.metrics.record_chunk(sample).await {
            warn!(
                context = %sample.context,
                success = sample.success,
                status_code = sample.status_code,
                error = %error,
                "failed to record batch chunk metrics"
            );
        }
    }
}

fn ensure_response_count(
    expected: usize,
    responses: Vec<SubResponse>,
) -> Result<Vec<SubResponse>, TransportError> {
    if responses.len() == expected {
        Ok(responses)
    } else {
        Err(TransportError::response_count_mismatch(
            expected,
            responses.len(),
        ))
    }
}
