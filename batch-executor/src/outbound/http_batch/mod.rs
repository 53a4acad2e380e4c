//! HTTP batch envelope adapters.
//!
//! This module provides a reqwest implementation of the `BatchTransport`
//! port that speaks the `multipart/mixed` batch protocol.

mod envelope;
mod http_transport;

pub use http_transport::{DEFAULT_USER_AGENT, HttpBatchTransport};
