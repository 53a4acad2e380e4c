//! Batch query answering with the first successful item.
//!
//! Useful when the same resource may live in one of several places, for
//! example a regional lookup queued once per zone. Missing-resource answers
//! (`404`) are expected and ignored; any other item failure is reported only
//! when nothing succeeded.

use std::sync::{Arc, Mutex, PoisonError};

use super::batch_request::{BatchQueryError, BatchRequest};
use super::typed_request::{ItemResult, TypedRequest};

type Slots<T> = Arc<Mutex<Vec<Option<ItemResult<T>>>>>;

/// One-shot executor returning the earliest success in queue order.
pub struct GetFirstBatchRequest<T> {
    batch: BatchRequest,
    slots: Slots<T>,
}

impl<T: Send + 'static> GetFirstBatchRequest<T> {
    /// Wrap an empty executor.
    #[must_use]
    pub fn new(batch: BatchRequest) -> Self {
        Self {
            batch,
            slots: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue one candidate lookup.
    pub fn queue<R>(&mut self, request: R)
    where
        R: TypedRequest<Response = T>,
    {
        let slot = {
            let mut slots = lock(&self.slots);
            slots.push(None);
            slots.len() - 1
        };
        let slots = Arc::clone(&self.slots);
        self.batch.queue(request, move |result: ItemResult<T>| {
            if let Some(entry) = lock(&slots).get_mut(slot) {
                *entry = Some(result);
            }
        });
    }

    /// Number of queued lookups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    /// Return whether nothing has been queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Run every lookup and reduce the outcomes to one answer.
    ///
    /// ```rust,ignore
    /// let mut lookup = factory.create_get_first::<Value>();
    /// for zone in ["us-east1-b", "us-east1-c"] {
    ///     lookup.queue(JsonRequest::get(format!("/zones/{zone}/instanceGroupManagers/igm")));
    /// }
    /// let igm = lookup.execute("RegionalServerGroupCaching.igm").await?;
    /// # Ok::<(), BatchQueryError>(())
    /// ```
    ///
    /// # Errors
    /// Returns [`BatchQueryError::Transport`] when a batch call fails, and
    /// [`BatchQueryError::Item`] with the first non-404 failure when no
    /// lookup succeeded. `Ok(None)` means every lookup answered 404.
    pub async fn execute(self, context: &str) -> Result<Option<T>, BatchQueryError> {
        let Self { batch, slots } = self;
        batch.execute(context).await?;

        let outcomes = std::mem::take(&mut *lock(&slots));
        let mut first_failure = None;
        for outcome in outcomes.into_iter().flatten() {
            match outcome.into_result() {
                Ok(response) => return Ok(Some(response)),
                Err(error) if error.is_not_found() => {}
                Err(error) => {
                    first_failure.get_or_insert(error);
                }
            }
        }
        first_failure.map_or(Ok(None), |error| Err(BatchQueryError::Item(error)))
    }
}

fn lock<T>(slots: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}
