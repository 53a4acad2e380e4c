//! Driven port for sending one batch envelope to the remote API.
//!
//! The domain owns the sub-request and sub-response shapes so the executor
//! never depends on the wire codec. Adapters translate a list of
//! [`SubRequest`] values into a single network exchange and hand back one
//! [`SubResponse`] per request, in request order.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::define_port_error;

/// HTTP method carried by one embedded sub-request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubRequestMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
}

impl SubRequestMethod {
    /// Return the request-line token for this method.
    ///
    /// # Examples
    /// ```
    /// use batch_executor::domain::ports::SubRequestMethod;
    ///
    /// assert_eq!(SubRequestMethod::Patch.as_str(), "PATCH");
    /// ```
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for SubRequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One operation embedded in a batch envelope.
///
/// `path` is relative to the API root and includes any query string, for
/// example `/compute/v1/projects/demo/zones/us-central1-a/instances`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubRequest {
    /// HTTP method of the embedded request.
    pub method: SubRequestMethod,
    /// API-root-relative path, query string included.
    pub path: String,
    /// Optional JSON payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl SubRequest {
    /// Build a body-less `GET` sub-request.
    ///
    /// # Examples
    /// ```
    /// use batch_executor::domain::ports::{SubRequest, SubRequestMethod};
    ///
    /// let request = SubRequest::get("/compute/v1/projects/demo");
    /// assert_eq!(request.method, SubRequestMethod::Get);
    /// assert!(request.body.is_none());
    /// ```
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: SubRequestMethod::Get,
            path: path.into(),
            body: None,
        }
    }

    /// Build a sub-request carrying a JSON body.
    pub fn with_body(method: SubRequestMethod, path: impl Into<String>, body: Value) -> Self {
        Self {
            method,
            path: path.into(),
            body: Some(body),
        }
    }
}

/// One independently framed response inside a batch envelope.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubResponse {
    /// HTTP status of the embedded response.
    pub status: u16,
    /// Embedded response headers, names lower-cased.
    pub headers: BTreeMap<String, String>,
    /// Raw embedded response body.
    pub body: Vec<u8>,
}

impl SubResponse {
    /// Build a response with `status` and a raw body and no headers.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// Build a `200` response carrying `body` serialised as JSON.
    ///
    /// # Examples
    /// ```
    /// use batch_executor::domain::ports::SubResponse;
    /// use serde_json::json;
    ///
    /// let response = SubResponse::json(&json!({"name": "igm-1"}));
    /// assert_eq!(response.status, 200);
    /// assert_eq!(response.body, br#"{"name":"igm-1"}"#.to_vec());
    /// ```
    pub fn json(body: &Value) -> Self {
        let mut response = Self::new(200, body.to_string());
        response
            .headers
            .insert("content-type".to_owned(), "application/json".to_owned());
        response
    }

    /// Return whether the embedded status is in the 2xx range.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

define_port_error! {
    /// Failures of the batch call as a whole.
    ///
    /// These are transport-level: the envelope could not be sent, was
    /// rejected, or could not be parsed. Failures of individual operations
    /// inside a parsed envelope are reported per item instead.
    pub enum TransportError {
        /// The envelope was answered with a non-2xx outer status.
        Http {
            /// Outer HTTP status code.
            status: u16,
            /// Compact preview of the outer response body.
            message: String,
        } => "batch call failed with status {status}: {message}",
        /// The batch call exceeded its deadline.
        Timeout {
            /// Underlying client error text.
            message: String,
        } => "batch call timed out: {message}",
        /// The network exchange failed before a response was read.
        Connection {
            /// Underlying client error text.
            message: String,
        } => "batch transport failed: {message}",
        /// The outer response could not be split into sub-responses.
        MalformedEnvelope {
            /// Description of the first framing problem found.
            message: String,
        } => "batch envelope malformed: {message}",
        /// The envelope held a different number of sub-responses than sent.
        ResponseCountMismatch {
            /// Number of sub-requests in the chunk.
            expected: usize,
            /// Number of sub-responses in the envelope.
            actual: usize,
        } => "batch envelope carried {actual} sub-responses for {expected} sub-requests",
        /// The task runner failed to drive the batch call to completion.
        Runner {
            /// Join or scheduling error reported by the runner.
            message: String,
        } => "batch task runner failed: {message}",
    }
}

impl TransportError {
    /// Return the outer HTTP status when the failure carries one.
    ///
    /// # Examples
    /// ```
    /// use batch_executor::domain::ports::TransportError;
    ///
    /// assert_eq!(TransportError::http(404_u16, "missing").status_code(), Some(404));
    /// assert_eq!(TransportError::connection("reset").status_code(), None);
    /// ```
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Port for exchanging one batch envelope with the remote API.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BatchTransport: Send + Sync {
    /// Send `requests` as one batch call and return their sub-responses.
    ///
    /// Implementations must return sub-responses in request order. An
    /// `Err` means the envelope itself failed; individual non-2xx
    /// sub-responses belong in the `Ok` vector.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use batch_executor::domain::ports::{BatchTransport, SubRequest};
    ///
    /// let responses = transport
    ///     .send_batch(vec![SubRequest::get("/compute/v1/projects/demo")])
    ///     .await?;
    /// assert_eq!(responses.len(), 1);
    /// # Ok::<(), batch_executor::domain::ports::TransportError>(())
    /// ```
    async fn send_batch(
        &self,
        requests: Vec<SubRequest>,
    ) -> Result<Vec<SubResponse>, TransportError>;
}
