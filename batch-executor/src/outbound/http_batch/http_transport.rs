//! Reqwest-backed batch envelope transport.
//!
//! This adapter owns transport details only: envelope framing, timeout and
//! HTTP error mapping, and splitting the response into sub-responses. It does
//! not check the sub-response count; the executor does.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, StatusCode, Url};
use tracing::debug;
use uuid::Uuid;

use super::envelope::{decode_responses, encode_requests};
use crate::domain::body_preview;
use crate::domain::ports::{BatchTransport, SubRequest, SubResponse, TransportError};

/// User agent sent when none is configured.
pub const DEFAULT_USER_AGENT: &str = concat!("batch-executor/", env!("CARGO_PKG_VERSION"));

/// Batch transport that POSTs one `multipart/mixed` envelope per call.
pub struct HttpBatchTransport {
    client: Client,
    endpoint: Url,
    user_agent: String,
}

impl HttpBatchTransport {
    /// Build a transport using a reqwest client with an explicit timeout.
    /// ```rust,ignore
    /// let endpoint = Url::parse("https://compute.googleapis.com/batch/compute/v1")?;
    /// let transport = HttpBatchTransport::new(endpoint, Duration::from_secs(30))?;
    /// ```
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        Self::with_user_agent(endpoint, timeout, DEFAULT_USER_AGENT)
    }

    /// Build a transport sending `user_agent` with every batch call.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn with_user_agent(
        endpoint: Url,
        timeout: Duration,
        user_agent: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            user_agent: user_agent.into(),
        })
    }

    /// The batch endpoint every envelope is posted to.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl BatchTransport for HttpBatchTransport {
    async fn send_batch(
        &self,
        requests: Vec<SubRequest>,
    ) -> Result<Vec<SubResponse>, TransportError> {
        let boundary = format!("batch_{}", Uuid::new_v4().simple());
        let envelope = encode_requests(&requests, &boundary);
        debug!(
            endpoint = %self.endpoint,
            requests = requests.len(),
            bytes = envelope.len(),
            "posting batch envelope"
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(USER_AGENT, self.user_agent.as_str())
            .header(CONTENT_TYPE, format!("multipart/mixed; boundary={boundary}"))
            .body(envelope)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let declared_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(map_status_error(status, body.as_ref()));
        }

        let content_type = declared_type.ok_or_else(|| {
            TransportError::malformed_envelope("batch response carried no content type")
        })?;
        decode_responses(&content_type, body.as_ref())
    }
}

fn map_transport_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::timeout(error.to_string())
    } else {
        TransportError::connection(error.to_string())
    }
}

fn map_status_error(status: StatusCode, body: &[u8]) -> TransportError {
    let preview = body_preview(body);
    let message = if preview.is_empty() {
        format!("status {}", status.as_u16())
    } else {
        preview
    };
    TransportError::http(status.as_u16(), message)
}

#[cfg(test)]
mod tests {
    //! Regression coverage for non-network mapping helpers.

    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::not_found(StatusCode::NOT_FOUND, b"{\"error\": \"no such batch path\"}".as_slice(), "{\"error\": \"no such batch path\"}")]
    #[case::unavailable(StatusCode::SERVICE_UNAVAILABLE, b"".as_slice(), "status 503")]
    #[case::whitespace(StatusCode::BAD_GATEWAY, b"  upstream\n\n down ".as_slice(), "upstream down")]
    fn status_errors_carry_status_and_preview(
        #[case] status: StatusCode,
        #[case] body: &[u8],
        #[case] message: &str,
    ) {
        let error = map_status_error(status, body);
        assert_eq!(error, TransportError::http(status.as_u16(), message));
        assert_eq!(error.status_code(), Some(status.as_u16()));
    }

    #[test]
    fn builds_with_default_user_agent() {
        let endpoint = Url::parse("https://compute.example.test/batch/compute/v1")
            .expect("valid endpoint");
        let transport =
            HttpBatchTransport::new(endpoint.clone(), Duration::from_secs(5)).expect("client builds");
        assert_eq!(transport.endpoint(), &endpoint);
        assert!(transport.user_agent.starts_with("batch-executor/"));
    }
}
