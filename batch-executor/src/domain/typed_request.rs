//! Typed requests and the handlers that receive their per-item outcomes.
//!
//! A [`TypedRequest`] pairs the wire-level [`SubRequest`] with the response
//! type its body decodes to. A [`ResultHandler`] receives exactly one of
//! `on_success` or `on_failure`; both consume the handler, so a second
//! invocation cannot be expressed.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;

use super::ErrorDetails;
use super::ports::{SubRequest, SubResponse};

/// Status and headers of one embedded sub-response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponseMetadata {
    /// HTTP status of the embedded response.
    pub status: u16,
    /// Embedded response headers, names lower-cased.
    pub headers: BTreeMap<String, String>,
}

/// Outcome of one queued item in a successfully transported chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemResult<T> {
    /// The item succeeded and its body decoded.
    Success {
        /// Decoded response body.
        response: T,
        /// Status and headers of the sub-response.
        metadata: ResponseMetadata,
    },
    /// The item failed or its body could not be decoded.
    Failure {
        /// Failure details.
        error: ErrorDetails,
        /// Status and headers of the sub-response.
        metadata: ResponseMetadata,
    },
}

impl<T> ItemResult<T> {
    /// Return whether this is [`ItemResult::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Borrow the sub-response metadata.
    #[must_use]
    pub const fn metadata(&self) -> &ResponseMetadata {
        match self {
            Self::Success { metadata, .. } | Self::Failure { metadata, .. } => metadata,
        }
    }

    /// Drop the metadata and convert into a plain `Result`.
    ///
    /// # Errors
    /// Returns the failure details for [`ItemResult::Failure`].
    pub fn into_result(self) -> Result<T, ErrorDetails> {
        match self {
            Self::Success { response, .. } => Ok(response),
            Self::Failure { error, .. } => Err(error),
        }
    }
}

/// A request that can be embedded in a batch call and whose successful
/// response body decodes into [`TypedRequest::Response`].
pub trait TypedRequest: Send + 'static {
    /// Decoded response type.
    type Response: Send + 'static;

    /// Build the sub-request embedded in the batch envelope.
    fn to_sub_request(&self) -> SubRequest;

    /// Decode a 2xx sub-response body.
    ///
    /// # Errors
    /// Returns details carrying `status` when the body does not decode.
    fn decode_response(&self, status: u16, body: &[u8]) -> Result<Self::Response, ErrorDetails>;
}

/// Typed request whose response body is JSON decoding into `T`.
///
/// An empty body decodes as JSON `null`, so `JsonRequest<()>` and
/// `JsonRequest<Option<_>>` accept `204 No Content` answers.
///
/// # Examples
/// ```
/// use batch_executor::domain::{JsonRequest, TypedRequest};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Zone {
///     name: String,
/// }
///
/// let request = JsonRequest::<Zone>::get("/compute/v1/projects/demo/zones/us-east1-b");
/// let zone = request
///     .decode_response(200, br#"{"name": "us-east1-b"}"#)
///     .expect("zone decodes");
/// assert_eq!(zone.name, "us-east1-b");
/// ```
pub struct JsonRequest<T> {
    request: SubRequest,
    response: PhantomData<fn() -> T>,
}

impl<T> JsonRequest<T> {
    /// Wrap an existing sub-request.
    #[must_use]
    pub const fn new(request: SubRequest) -> Self {
        Self {
            request,
            response: PhantomData,
        }
    }

    /// Build a body-less `GET` request for `path`.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(SubRequest::get(path))
    }

    /// Borrow the wrapped sub-request.
    #[must_use]
    pub const fn sub_request(&self) -> &SubRequest {
        &self.request
    }
}

impl<T> Clone for JsonRequest<T> {
    fn clone(&self) -> Self {
        Self::new(self.request.clone())
    }
}

impl<T> fmt::Debug for JsonRequest<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonRequest")
            .field("request", &self.request)
            .finish()
    }
}

impl<T> TypedRequest for JsonRequest<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Response = T;

    fn to_sub_request(&self) -> SubRequest {
        self.request.clone()
    }

    fn decode_response(&self, status: u16, body: &[u8]) -> Result<T, ErrorDetails> {
        decode_json(status, body)
    }
}

/// Decode a JSON body, treating a blank body as `null`.
pub(crate) fn decode_json<T: DeserializeOwned>(status: u16, body: &[u8]) -> Result<T, ErrorDetails> {
    let payload: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        body
    };
    serde_json::from_slice(payload).map_err(|error| {
        ErrorDetails::new(status, format!("response body did not decode: {error}"))
    })
}

/// Receiver of exactly one per-item outcome.
///
/// Any `FnOnce(ItemResult<T>)` closure is a handler, which keeps call sites
/// short when both branches feed the same collector.
///
/// # Examples
/// ```
/// use batch_executor::domain::{ErrorDetails, ItemResult, ResponseMetadata, ResultHandler};
///
/// let mut seen = None;
/// let handler = |result: ItemResult<u32>| seen = Some(result.is_success());
/// handler.on_failure(ErrorDetails::new(404, "missing"), ResponseMetadata::default());
/// assert_eq!(seen, Some(false));
/// ```
pub trait ResultHandler<T> {
    /// Receive a decoded successful response.
    fn on_success(self, response: T, metadata: ResponseMetadata);

    /// Receive an item-level failure.
    fn on_failure(self, error: ErrorDetails, metadata: ResponseMetadata);
}

impl<T, F> ResultHandler<T> for F
where
    F: FnOnce(ItemResult<T>),
{
    fn on_success(self, response: T, metadata: ResponseMetadata) {
        self(ItemResult::Success { response, metadata });
    }

    fn on_failure(self, error: ErrorDetails, metadata: ResponseMetadata) {
        self(ItemResult::Failure { error, metadata });
    }
}

/// Decode `response` for `request` and hand the outcome to `handler`.
///
/// 2xx sub-responses are decoded; a decode failure is reported through
/// `on_failure` with the sub-response status. Anything else is reported
/// through `on_failure` with details decoded from the error body.
pub(crate) fn deliver<R, H>(request: &R, handler: H, response: SubResponse)
where
    R: TypedRequest,
    H: ResultHandler<R::Response>,
{
    let success = response.is_success();
    let SubResponse {
        status,
        headers,
        body,
    } = response;
    let metadata = ResponseMetadata { status, headers };

    if !success {
        handler.on_failure(ErrorDetails::from_response_body(status, &body), metadata);
        return;
    }

    match request.decode_response(status, &body) {
        Ok(decoded) => handler.on_success(decoded, metadata),
        Err(error) => handler.on_failure(error, metadata),
    }
}
