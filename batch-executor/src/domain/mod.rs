//! Batching core: typed requests, chunked execution, and batch queries.
//!
//! Purpose: queue heterogeneous typed requests, send them through the
//! [`ports::BatchTransport`] port in bounded chunks, and route every
//! sub-response back to the handler queued with its request. Nothing here
//! depends on an HTTP client, a metrics exporter, or a configuration crate.
//!
//! Public surface:
//! - BatchRequest: one-shot chunked executor.
//! - BatchRequestFactory: shared wiring handing out fresh executors.
//! - GetFirstBatchRequest: first success across candidate lookups.
//! - PaginatedBatchRequest: follow page tokens across batch rounds.
//! - TypedRequest / ResultHandler: request and outcome contracts.

pub mod batch_request;
mod error_details;
pub mod get_first;
pub mod paginated;
pub mod ports;
mod typed_request;

pub use self::batch_request::{
    BatchQueryError, BatchRequest, BatchRequestFactory, BatchRequestPorts, BatchRequestRuntime,
    ChunkCall, ChunkRunner, InlineChunkRunner, MaxBatchSize, MaxBatchSizeError, TokioChunkRunner,
};
pub(crate) use self::error_details::body_preview;
pub use self::error_details::{ErrorDetails, ErrorReason};
pub use self::get_first::GetFirstBatchRequest;
pub use self::paginated::{JsonListRequest, Page, PaginatedBatchRequest, PaginatedRequest};
pub use self::typed_request::{
    ItemResult, JsonRequest, ResponseMetadata, ResultHandler, TypedRequest,
};
