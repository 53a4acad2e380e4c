//! Item-level failure details decoded from embedded sub-responses.
//!
//! Remote APIs in the Google style answer failed operations with a JSON body
//! of the form `{"error": {"code": 404, "message": "...", "errors": [...]}}`.
//! When a sub-response carries no such body the details are synthesised from
//! the status code and a compact preview of whatever body was returned.

use serde::{Deserialize, Serialize};
use thiserror::Error;

const PREVIEW_CHAR_LIMIT: usize = 160;

/// Failure details for one operation inside a transported batch.
///
/// # Examples
/// ```
/// use batch_executor::domain::ErrorDetails;
///
/// let body = br#"{"error": {"code": 404, "message": "zone not found"}}"#;
/// let details = ErrorDetails::from_response_body(404, body);
/// assert!(details.is_not_found());
/// assert_eq!(details.message, "zone not found");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("operation failed with status {code}: {message}")]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    /// HTTP status of the failed sub-response.
    pub code: u16,
    /// Human-readable failure message.
    pub message: String,
    /// Structured reasons reported by the remote API, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorReason>,
}

/// One structured reason attached to an [`ErrorDetails`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorReason {
    /// Error domain, for example `global`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Machine-readable reason, for example `notFound`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Reason-specific message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelopeDto {
    error: ErrorBodyDto,
}

#[derive(Deserialize)]
struct ErrorBodyDto {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorReason>,
}

impl ErrorDetails {
    /// Build details with no structured reasons.
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            errors: Vec::new(),
        }
    }

    /// Decode details from a failed sub-response.
    ///
    /// `code` is always the sub-response status; the body only contributes
    /// the message and structured reasons.
    #[must_use]
    pub fn from_response_body(status: u16, body: &[u8]) -> Self {
        match serde_json::from_slice::<ErrorEnvelopeDto>(body) {
            Ok(ErrorEnvelopeDto { error }) => Self {
                code: status,
                message: error
                    .message
                    .filter(|message| !message.trim().is_empty())
                    .unwrap_or_else(|| fallback_message(status, body)),
                errors: error.errors,
            },
            Err(_) => Self::new(status, fallback_message(status, body)),
        }
    }

    /// Return whether the operation failed because its target was missing.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        self.code == 404
    }
}

fn fallback_message(status: u16, body: &[u8]) -> String {
    let preview = body_preview(body);
    if preview.is_empty() {
        format!("status {status}")
    } else {
        preview
    }
}

/// Collapse whitespace in `body` and truncate it for error messages.
pub(crate) fn body_preview(body: &[u8]) -> String {
    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let preview = compact.chars().take(PREVIEW_CHAR_LIMIT).collect::<String>();
    if compact.chars().count() > PREVIEW_CHAR_LIMIT {
        format!("{preview}...")
    } else {
        preview
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for error body decoding.

    use super::*;
    use rstest::rstest;

    #[test]
    fn decodes_google_style_error_bodies() {
        let body = br#"{
            "error": {
                "code": 403,
                "message": "Required 'compute.instances.list' permission",
                "errors": [
                    {"domain": "global", "reason": "forbidden", "message": "denied"}
                ]
            }
        }"#;

        let details = ErrorDetails::from_response_body(403, body);

        assert_eq!(details.code, 403);
        assert_eq!(details.message, "Required 'compute.instances.list' permission");
        assert_eq!(details.errors.len(), 1);
        assert_eq!(
            details.errors.first().and_then(|reason| reason.reason.as_deref()),
            Some("forbidden")
        );
    }

    #[rstest]
    #[case::plain_text(b"backend   unavailable\n".as_slice(), "backend unavailable")]
    #[case::empty_body(b"".as_slice(), "status 503")]
    #[case::error_without_message(br#"{"error": {"code": 503}}"#.as_slice(), "{\"error\": {\"code\": 503}}")]
    fn falls_back_to_body_preview(#[case] body: &[u8], #[case] expected: &str) {
        let details = ErrorDetails::from_response_body(503, body);
        assert_eq!(details.code, 503);
        assert_eq!(details.message, expected);
        assert!(details.errors.is_empty());
    }

    #[test]
    fn status_wins_over_body_code() {
        let details = ErrorDetails::from_response_body(404, br#"{"error": {"code": 500, "message": "gone"}}"#);
        assert!(details.is_not_found());
    }

    #[test]
    fn truncates_long_previews() {
        let body = "x".repeat(PREVIEW_CHAR_LIMIT + 10);
        let preview = body_preview(body.as_bytes());
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), PREVIEW_CHAR_LIMIT + 3);
    }
}
