//! Inbound adapters that translate external input into executor calls.
//!
//! The command-line runner under [`cli`] is the only entry point: it reads a
//! requests file, runs one batch execution, and reports per-item results.

pub mod cli;
