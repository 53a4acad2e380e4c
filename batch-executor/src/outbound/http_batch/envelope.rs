//! `multipart/mixed` batch envelope codec.
//!
//! Requests are framed as one `application/http` part per sub-request, each
//! tagged `Content-ID: <item-N>`. Responses are split on the boundary named
//! in the outer `Content-Type`; parts tagged `<response-item-N>` are put back
//! in request order. CRLF and bare LF line endings are both accepted.

use std::collections::BTreeMap;

use crate::domain::ports::{SubRequest, SubResponse, TransportError};

const CRLF: &str = "\r\n";

/// Encode `requests` as a `multipart/mixed` body delimited by `boundary`.
pub(super) fn encode_requests(requests: &[SubRequest], boundary: &str) -> String {
    let mut body = String::new();
    for (position, request) in requests.iter().enumerate() {
        body.push_str(&format!(
            "--{boundary}{CRLF}Content-Type: application/http{CRLF}Content-ID: <item-{}>{CRLF}{CRLF}",
            position + 1
        ));
        body.push_str(&format!("{} {} HTTP/1.1{CRLF}", request.method, request.path));
        match &request.body {
            Some(payload) => body.push_str(&format!(
                "Content-Type: application/json; charset=UTF-8{CRLF}{CRLF}{payload}{CRLF}"
            )),
            None => body.push_str(CRLF),
        }
    }
    body.push_str(&format!("--{boundary}--{CRLF}"));
    body
}

/// Extract the `boundary` parameter from a `multipart/mixed` content type.
pub(super) fn boundary_from_content_type(content_type: &str) -> Result<String, TransportError> {
    let mut segments = content_type.split(';');
    let media_type = segments.next().unwrap_or_default().trim();
    if !media_type.eq_ignore_ascii_case("multipart/mixed") {
        return Err(TransportError::malformed_envelope(format!(
            "expected multipart/mixed response, got `{media_type}`"
        )));
    }
    segments
        .filter_map(|parameter| parameter.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().trim_matches('"').to_owned())
        .filter(|boundary| !boundary.is_empty())
        .ok_or_else(|| TransportError::malformed_envelope("response content type has no boundary"))
}

/// Decode a `multipart/mixed` response body into ordered sub-responses.
pub(super) fn decode_responses(
    content_type: &str,
    body: &[u8],
) -> Result<Vec<SubResponse>, TransportError> {
    let boundary = boundary_from_content_type(content_type)?;
    let mut parts = split_parts(body, &boundary)?
        .into_iter()
        .map(decode_part)
        .collect::<Result<Vec<_>, _>>()?;

    if parts.iter().all(|part| part.position.is_some()) {
        parts.sort_by_key(|part| part.position);
        let numbered = parts
            .iter()
            .enumerate()
            .all(|(index, part)| part.position == Some(index));
        if !numbered {
            return Err(TransportError::malformed_envelope(format!(
                "response Content-IDs do not number parts 1 to {}",
                parts.len()
            )));
        }
    }
    Ok(parts.into_iter().map(|part| part.response).collect())
}

struct DecodedPart {
    position: Option<usize>,
    response: SubResponse,
}

fn split_parts<'a>(body: &'a [u8], boundary: &str) -> Result<Vec<&'a [u8]>, TransportError> {
    let delimiter_line = format!("--{boundary}");
    let delimiter = delimiter_line.as_bytes();
    let opening = find(body, delimiter, 0)
        .ok_or_else(|| TransportError::malformed_envelope("opening boundary not found"))?;

    let mut parts = Vec::new();
    let mut cursor = opening + delimiter.len();
    loop {
        let rest = body.get(cursor..).unwrap_or_default();
        if rest.starts_with(b"--") {
            return Ok(parts);
        }
        let line_end = find(body, b"\n", cursor)
            .ok_or_else(|| TransportError::malformed_envelope("boundary line is not terminated"))?;
        let start = line_end + 1;
        let next = find(body, delimiter, start)
            .ok_or_else(|| TransportError::malformed_envelope("closing boundary not found"))?;
        let part = body.get(start..next).unwrap_or_default();
        parts.push(strip_line_break(part));
        cursor = next + delimiter.len();
    }
}

fn decode_part(part: &[u8]) -> Result<DecodedPart, TransportError> {
    let (head, content) = split_head(part);
    let headers = parse_headers(head, "part")?;
    let position = headers.get("content-id").and_then(|id| parse_content_id(id));

    let (response_head, response_body) = split_head(content);
    let response_text = std::str::from_utf8(response_head).map_err(|_| {
        TransportError::malformed_envelope("embedded response head is not valid UTF-8")
    })?;
    let mut lines = response_text.lines();
    let status = parse_status_line(lines.next().unwrap_or_default())?;
    let response_headers = header_map(lines);

    Ok(DecodedPart {
        position,
        response: SubResponse {
            status,
            headers: response_headers,
            body: response_body.to_vec(),
        },
    })
}

fn parse_headers(head: &[u8], what: &str) -> Result<BTreeMap<String, String>, TransportError> {
    let text = std::str::from_utf8(head).map_err(|_| {
        TransportError::malformed_envelope(format!("{what} headers are not valid UTF-8"))
    })?;
    Ok(header_map(text.lines()))
}

fn header_map<'a>(lines: impl Iterator<Item = &'a str>) -> BTreeMap<String, String> {
    lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_owned()))
        .collect()
}

fn parse_status_line(line: &str) -> Result<u16, TransportError> {
    let mut fields = line.split_whitespace();
    let version = fields.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(TransportError::malformed_envelope(format!(
            "invalid embedded status line `{line}`"
        )));
    }
    fields
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| {
            TransportError::malformed_envelope(format!("invalid embedded status line `{line}`"))
        })
}

/// Parse `<response-item-N>` (or `<item-N>`) into a zero-based position.
fn parse_content_id(value: &str) -> Option<usize> {
    let id = value.trim().trim_start_matches('<').trim_end_matches('>');
    let number = id
        .strip_prefix("response-item-")
        .or_else(|| id.strip_prefix("item-"))?;
    number.parse::<usize>().ok()?.checked_sub(1)
}

/// Split a block at its first blank line into head and body.
fn split_head(block: &[u8]) -> (&[u8], &[u8]) {
    let crlf = find(block, b"\r\n\r\n", 0).map(|index| (index, 4));
    let lf = find(block, b"\n\n", 0).map(|index| (index, 2));
    let split = match (crlf, lf) {
        (Some(left), Some(right)) => Some(if left.0 <= right.0 { left } else { right }),
        (left, right) => left.or(right),
    };
    match split {
        Some((index, width)) => (
            block.get(..index).unwrap_or_default(),
            block.get(index + width..).unwrap_or_default(),
        ),
        None => (block, Default::default()),
    }
}

fn strip_line_break(part: &[u8]) -> &[u8] {
    part.strip_suffix(b"\r\n")
        .or_else(|| part.strip_suffix(b"\n"))
        .unwrap_or(part)
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| offset + from)
}
