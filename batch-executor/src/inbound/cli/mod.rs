//! Command-line adapter driving one batch execution from a requests file.
//!
//! The requests file holds a JSON array of sub-requests:
//!
//! ```json
//! [
//!   {"method": "GET", "path": "/compute/v1/projects/demo/zones/us-central1-a"},
//!   {"method": "POST", "path": "/compute/v1/projects/demo/global/networks", "body": {"name": "edge"}}
//! ]
//! ```
//!
//! Each delivered item is written as one JSON line, in queue order.

use std::ffi::OsStr;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cap_std::{ambient_authority, fs::Dir};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::domain::ports::{SubRequest, TransportError};
use crate::domain::{BatchRequestFactory, ErrorDetails, ItemResult, JsonRequest};
use crate::outbound::http_batch::HttpBatchTransport;
use crate::settings::{BatchExecutorSettings, SettingsError};

/// Failures surfaced by the command-line runner.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration was missing or unusable.
    #[error(transparent)]
    Settings(#[from] SettingsError),
    /// The requests file could not be read.
    #[error("read requests file '{}': {source}", path.display())]
    ReadRequests {
        /// Requested path.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// The requests file is not a JSON array of sub-requests.
    #[error("parse requests file '{}': {source}", path.display())]
    ParseRequests {
        /// Requested path.
        path: PathBuf,
        /// Underlying decode failure.
        #[source]
        source: serde_json::Error,
    },
    /// The HTTP client could not be built.
    #[error("build batch transport: {0}")]
    Client(#[from] reqwest::Error),
    /// A batch call failed; later chunks were not attempted.
    #[error("batch execution failed: {0}")]
    Transport(#[from] TransportError),
    /// Result lines could not be written.
    #[error("write results: {0}")]
    Output(#[from] io::Error),
    /// The metrics exposition file could not be written.
    #[error("write metrics file '{}': {source}", path.display())]
    WriteMetrics {
        /// Requested path.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
}

/// Counts reported once a run has written its result lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    /// Items whose outcome was written.
    pub delivered: usize,
    /// Delivered items that failed.
    pub failures: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum Outcome {
    Success,
    Failure,
}

#[derive(Serialize)]
struct ItemLine {
    index: usize,
    status: u16,
    outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorDetails>,
}

impl ItemLine {
    fn new(index: usize, result: ItemResult<Value>) -> Self {
        let status = result.metadata().status;
        match result {
            ItemResult::Success { response, .. } => Self {
                index,
                status,
                outcome: Outcome::Success,
                response: Some(response),
                error: None,
            },
            ItemResult::Failure { error, .. } => Self {
                index,
                status,
                outcome: Outcome::Failure,
                response: None,
                error: Some(error),
            },
        }
    }
}

/// Build the HTTP transport described by `settings`.
///
/// # Errors
/// Returns [`CliError::Settings`] for a missing or invalid endpoint and
/// [`CliError::Client`] when the reqwest client cannot be built.
pub fn http_transport(settings: &BatchExecutorSettings) -> Result<HttpBatchTransport, CliError> {
    let endpoint = settings.endpoint()?;
    let transport = match settings.user_agent() {
        Some(agent) => HttpBatchTransport::with_user_agent(endpoint, settings.timeout(), agent)?,
        None => HttpBatchTransport::new(endpoint, settings.timeout())?,
    };
    Ok(transport)
}

/// Read the JSON array of sub-requests stored at `path`.
///
/// # Errors
/// Returns [`CliError::ReadRequests`] when the file cannot be opened or read
/// and [`CliError::ParseRequests`] when its contents do not decode.
pub fn load_requests(path: &Path) -> Result<Vec<SubRequest>, CliError> {
    let read_error = |source| CliError::ReadRequests {
        path: path.to_path_buf(),
        source,
    };
    let (directory, file_name) = open_parent(path).map_err(read_error)?;
    let contents = directory
        .read_to_string(Path::new(file_name))
        .map_err(read_error)?;
    serde_json::from_str(&contents).map_err(|source| CliError::ParseRequests {
        path: path.to_path_buf(),
        source,
    })
}

/// Replace the file at `path` with the metrics `exposition`.
///
/// The parent directory must already exist.
///
/// # Errors
/// Returns [`CliError::WriteMetrics`] when the directory cannot be opened or
/// the file cannot be written.
pub fn write_metrics(path: &Path, exposition: &str) -> Result<(), CliError> {
    let write_error = |source| CliError::WriteMetrics {
        path: path.to_path_buf(),
        source,
    };
    let (directory, file_name) = open_parent(path).map_err(write_error)?;
    directory
        .write(Path::new(file_name), exposition)
        .map_err(write_error)?;
    info!(path = %path.display(), "metrics written");
    Ok(())
}

fn open_parent(path: &Path) -> io::Result<(Dir, &OsStr)> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = path.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "path must name a file")
    })?;
    let directory = Dir::open_ambient_dir(parent, ambient_authority())?;
    Ok((directory, file_name))
}

/// Execute `requests` as one batch run and write a JSON line per item.
///
/// Lines for items delivered before a transport failure are still written
/// before the failure is returned.
///
/// # Errors
/// Returns [`CliError::Transport`] when a batch call fails and
/// [`CliError::Output`] when writing fails.
pub async fn execute_requests<W: Write>(
    factory: &BatchRequestFactory,
    context: &str,
    requests: Vec<SubRequest>,
    out: &mut W,
) -> Result<RunSummary, CliError> {
    let slots: Arc<Mutex<Vec<Option<ItemResult<Value>>>>> =
        Arc::new(Mutex::new(vec![None; requests.len()]));
    let mut batch = factory.create();
    for (index, request) in requests.into_iter().enumerate() {
        let sink = Arc::clone(&slots);
        batch.queue(
            JsonRequest::<Value>::new(request),
            move |result: ItemResult<Value>| {
                if let Some(slot) = lock(&sink).get_mut(index) {
                    *slot = Some(result);
                }
            },
        );
    }

    let executed = batch.execute(context).await;

    let outcomes = std::mem::take(&mut *lock(&slots));
    let mut summary = RunSummary::default();
    for (index, outcome) in outcomes.into_iter().enumerate() {
        let Some(result) = outcome else { continue };
        summary.delivered += 1;
        if !result.is_success() {
            summary.failures += 1;
        }
        serde_json::to_writer(&mut *out, &ItemLine::new(index, result)).map_err(io::Error::from)?;
        writeln!(out)?;
    }
    out.flush()?;

    executed?;
    info!(
        context,
        delivered = summary.delivered,
        failures = summary.failures,
        "batch run finished"
    );
    Ok(summary)
}

fn lock<T>(slots: &Mutex<T>) -> MutexGuard<'_, T> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests;
