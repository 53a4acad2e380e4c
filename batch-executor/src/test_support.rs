//! Test utilities for the batch executor crate.
//!
//! This module provides shared doubles for both unit tests (in `src/`) and
//! integration tests (in `tests/`). It is only compiled for tests or with the
//! `test-support` feature.

pub mod cap_fs {
    //! Capability-safe filesystem helpers for tests.
    //!
    //! The crate reads request files through `cap_std::fs::Dir`; these
    //! helpers let test suites write fixtures the same way.

    use std::ffi::OsString;
    use std::io;
    use std::path::Path;

    use cap_std::{ambient_authority, fs::Dir};

    /// Write bytes to a file through `cap_std`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use batch_executor::inbound::cli::load_requests;
    /// use batch_executor::test_support::cap_fs::write_file;
    ///
    /// let path = std::env::temp_dir().join("cap-fs-requests-example.json");
    /// write_file(&path, br#"[{"method": "GET", "path": "/zones"}]"#)?;
    /// let requests = load_requests(&path)?;
    /// assert_eq!(requests.len(), 1);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    ///
    /// # Errors
    /// Returns the underlying I/O error.
    pub fn write_file(path: &Path, contents: &[u8]) -> io::Result<()> {
        let (parent, file_name) = parent_and_file_name(path)?;
        let directory = Dir::open_ambient_dir(parent, ambient_authority())?;
        directory.write(Path::new(&file_name), contents)
    }

    fn parent_and_file_name(path: &Path) -> io::Result<(&Path, OsString)> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        let file_name = path.file_name().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "path must include a file name",
            )
        })?;
        Ok((parent, file_name.to_os_string()))
    }
}

pub mod transport {
    //! Scripted batch transport double.

    use std::collections::VecDeque;
    use std::sync::{Mutex, MutexGuard, PoisonError};

    use async_trait::async_trait;
    use serde_json::json;

    use crate::domain::ports::{BatchTransport, SubRequest, SubResponse, TransportError};

    enum ScriptedCall {
        Respond(Vec<SubResponse>),
        Fail(TransportError),
        Hang,
    }

    /// Transport answering each batch call from a script.
    ///
    /// Calls beyond the script echo one `200` JSON sub-response per
    /// sub-request, `{"path": <request path>}`. Every call's sub-requests
    /// are recorded, including calls that fail or hang.
    #[derive(Default)]
    pub struct ScriptedBatchTransport {
        script: Mutex<VecDeque<ScriptedCall>>,
        calls: Mutex<Vec<Vec<SubRequest>>>,
    }

    impl ScriptedBatchTransport {
        /// Build a transport with an empty script.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Answer the next unscripted call with `responses`.
        pub fn push_ok(&self, responses: Vec<SubResponse>) {
            lock(&self.script).push_back(ScriptedCall::Respond(responses));
        }

        /// Fail the next unscripted call with `error`.
        pub fn push_err(&self, error: TransportError) {
            lock(&self.script).push_back(ScriptedCall::Fail(error));
        }

        /// Never complete the next unscripted call.
        pub fn push_pending(&self) {
            lock(&self.script).push_back(ScriptedCall::Hang);
        }

        /// Sub-requests of every call received so far, in call order.
        #[must_use]
        pub fn calls(&self) -> Vec<Vec<SubRequest>> {
            lock(&self.calls).clone()
        }

        /// Number of sub-requests in each call received so far.
        #[must_use]
        pub fn call_sizes(&self) -> Vec<usize> {
            lock(&self.calls).iter().map(Vec::len).collect()
        }
    }

    #[async_trait]
    impl BatchTransport for ScriptedBatchTransport {
        async fn send_batch(
            &self,
            requests: Vec<SubRequest>,
        ) -> Result<Vec<SubResponse>, TransportError> {
            lock(&self.calls).push(requests.clone());
            let next = lock(&self.script).pop_front();
            match next {
                Some(ScriptedCall::Respond(responses)) => Ok(responses),
                Some(ScriptedCall::Fail(error)) => Err(error),
                Some(ScriptedCall::Hang) => std::future::pending().await,
                None => Ok(requests
                    .iter()
                    .map(|request| SubResponse::json(&json!({ "path": request.path })))
                    .collect()),
            }
        }
    }

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub mod metrics {
    //! Recording metrics double.

    use std::sync::{Mutex, PoisonError};

    use async_trait::async_trait;

    use crate::domain::ports::{BatchMetrics, BatchMetricsError, ChunkMetricSample};

    /// Recorder keeping every sample; optionally reports export failures.
    #[derive(Default)]
    pub struct RecordingBatchMetrics {
        samples: Mutex<Vec<ChunkMetricSample>>,
        fail: bool,
    }

    impl RecordingBatchMetrics {
        /// Build a recorder that accepts every sample.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Build a recorder that keeps samples but reports every write as
        /// failed.
        #[must_use]
        pub fn failing() -> Self {
            Self {
                samples: Mutex::default(),
                fail: true,
            }
        }

        /// Samples recorded so far, in recording order.
        #[must_use]
        pub fn samples(&self) -> Vec<ChunkMetricSample> {
            self.samples
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Sum of the weights of every recorded sample.
        #[must_use]
        pub fn total_weight(&self) -> usize {
            self.samples().iter().map(|sample| sample.weight).sum()
        }
    }

    #[async_trait]
    impl BatchMetrics for RecordingBatchMetrics {
        async fn record_chunk(&self, sample: &ChunkMetricSample) -> Result<(), BatchMetricsError> {
            self.samples
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(sample.clone());
            if self.fail {
                return Err(BatchMetricsError::export("recorder offline"));
            }
            Ok(())
        }
    }
}

pub mod handlers {
    //! Result handlers that log outcomes for later assertions.

    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

    use crate::domain::{ErrorDetails, ItemResult};

    /// Shared log of handler invocations keyed by queue index.
    pub struct HandlerLog<T> {
        entries: Arc<Mutex<Vec<(usize, ItemResult<T>)>>>,
    }

    impl<T> Default for HandlerLog<T> {
        fn default() -> Self {
            Self {
                entries: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl<T> Clone for HandlerLog<T> {
        fn clone(&self) -> Self {
            Self {
                entries: Arc::clone(&self.entries),
            }
        }
    }

    impl<T: Send + 'static> HandlerLog<T> {
        /// Build an empty log.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Handler recording its outcome under `index`.
        pub fn handler(&self, index: usize) -> impl FnOnce(ItemResult<T>) + Send + 'static {
            let entries = Arc::clone(&self.entries);
            move |result| {
                entries
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push((index, result));
            }
        }

        /// Total number of handler invocations.
        #[must_use]
        pub fn len(&self) -> usize {
            self.lock().len()
        }

        /// Return whether no handler has run.
        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.lock().is_empty()
        }

        /// Queue indices in invocation order.
        #[must_use]
        pub fn indices(&self) -> Vec<usize> {
            self.lock().iter().map(|(index, _)| *index).collect()
        }

        /// Number of `on_success` invocations.
        #[must_use]
        pub fn success_count(&self) -> usize {
            self.lock()
                .iter()
                .filter(|(_, result)| result.is_success())
                .count()
        }

        /// Queue indices and details of every `on_failure` invocation.
        #[must_use]
        pub fn failures(&self) -> Vec<(usize, ErrorDetails)> {
            self.lock()
                .iter()
                .filter_map(|(index, result)| match result {
                    ItemResult::Failure { error, .. } => Some((*index, error.clone())),
                    ItemResult::Success { .. } => None,
                })
                .collect()
        }

        fn lock(&self) -> MutexGuard<'_, Vec<(usize, ItemResult<T>)>> {
            self.entries.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    impl<T: Clone + Send + 'static> HandlerLog<T> {
        /// Decoded responses of every `on_success` invocation, with indices.
        #[must_use]
        pub fn successes(&self) -> Vec<(usize, T)> {
            self.lock()
                .iter()
                .filter_map(|(index, result)| match result {
                    ItemResult::Success { response, .. } => Some((*index, response.clone())),
                    ItemResult::Failure { .. } => None,
                })
                .collect()
        }
    }
}

pub use handlers::HandlerLog;
pub use metrics::RecordingBatchMetrics;
pub use transport::ScriptedBatchTransport;
