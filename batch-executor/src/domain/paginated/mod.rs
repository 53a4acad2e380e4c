//! Batch query that follows list page tokens across batch rounds.
//!
//! Each round batches the next page of every list that still has one, using
//! a fresh [`BatchRequest`] so chunking, metrics and fail-fast apply per
//! round. Items come back grouped by list in queue order, pages in order.

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::ErrorDetails;
use super::batch_request::{BatchQueryError, BatchRequest, BatchRequestFactory};
use super::ports::SubRequest;
use super::typed_request::{ItemResult, TypedRequest, decode_json};

/// One page of a list response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items carried by this page.
    pub items: Vec<T>,
    /// Token selecting the following page, if any.
    pub next_page_token: Option<String>,
}

/// A list operation that can be fetched page by page.
pub trait PaginatedRequest: Send + Sync + 'static {
    /// Item type carried by each page.
    type Item: Send + 'static;

    /// Build the sub-request for the page selected by `page_token`; `None`
    /// selects the first page.
    fn page(&self, page_token: Option<&str>) -> SubRequest;

    /// Decode a 2xx page body.
    ///
    /// # Errors
    /// Returns details carrying `status` when the body does not decode.
    fn decode_page(&self, status: u16, body: &[u8]) -> Result<Page<Self::Item>, ErrorDetails>;
}

/// Paginated list whose pages are Google-style JSON:
/// `{"items": [...], "nextPageToken": "..."}`.
///
/// # Examples
/// ```
/// use batch_executor::domain::{JsonListRequest, PaginatedRequest};
/// use serde_json::Value;
///
/// let list = JsonListRequest::<Value>::get("/compute/v1/projects/demo/zones/a/instances?maxResults=500");
/// assert_eq!(
///     list.page(Some("t2")).path,
///     "/compute/v1/projects/demo/zones/a/instances?maxResults=500&pageToken=t2"
/// );
/// let page = list
///     .decode_page(200, br#"{"items": [1, 2], "nextPageToken": "t3"}"#)
///     .expect("page decodes");
/// assert_eq!(page.items.len(), 2);
/// assert_eq!(page.next_page_token.as_deref(), Some("t3"));
/// ```
pub struct JsonListRequest<T> {
    request: SubRequest,
    item: PhantomData<fn() -> T>,
}

impl<T> JsonListRequest<T> {
    /// Wrap the sub-request fetching the first page.
    #[must_use]
    pub const fn new(request: SubRequest) -> Self {
        Self {
            request,
            item: PhantomData,
        }
    }

    /// Build a `GET` list request for `path`.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(SubRequest::get(path))
    }
}

impl<T> Clone for JsonListRequest<T> {
    fn clone(&self) -> Self {
        Self::new(self.request.clone())
    }
}

impl<T> fmt::Debug for JsonListRequest<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonListRequest")
            .field("request", &self.request)
            .finish()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPageDto<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(default)]
    next_page_token: Option<String>,
}

impl<T> PaginatedRequest for JsonListRequest<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Item = T;

    fn page(&self, page_token: Option<&str>) -> SubRequest {
        let mut request = self.request.clone();
        if let Some(token) = page_token {
            let separator = if request.path.contains('?') { '&' } else { '?' };
            request.path = format!(
                "{}{separator}pageToken={}",
                request.path,
                url::form_urlencoded::byte_serialize(token.as_bytes()).collect::<String>()
            );
        }
        request
    }

    fn decode_page(&self, status: u16, body: &[u8]) -> Result<Page<T>, ErrorDetails> {
        let dto: Option<ListPageDto<T>> = decode_json(status, body)?;
        Ok(dto.map_or_else(
            || Page {
                items: Vec::new(),
                next_page_token: None,
            },
            |page| Page {
                items: page.items,
                next_page_token: page.next_page_token.filter(|token| !token.is_empty()),
            },
        ))
    }
}

/// Typed request for one page of one list.
struct PageRequest<T> {
    list: Arc<dyn PaginatedRequest<Item = T>>,
    page_token: Option<String>,
}

impl<T: Send + 'static> TypedRequest for PageRequest<T> {
    type Response = Page<T>;

    fn to_sub_request(&self) -> SubRequest {
        self.list.page(self.page_token.as_deref())
    }

    fn decode_response(&self, status: u16, body: &[u8]) -> Result<Page<T>, ErrorDetails> {
        self.list.decode_page(status, body)
    }
}

struct ListState<T> {
    list: Arc<dyn PaginatedRequest<Item = T>>,
    items: Vec<T>,
    cursor: Cursor,
}

enum Cursor {
    First,
    Next(String),
    Done,
}

impl<T> ListState<T> {
    fn page_token(&self) -> Option<Option<String>> {
        match &self.cursor {
            Cursor::First => Some(None),
            Cursor::Next(token) => Some(Some(token.clone())),
            Cursor::Done => None,
        }
    }

    fn advance(&mut self, page: Page<T>) -> Result<(), BatchQueryError> {
        self.items.extend(page.items);
        match (page.next_page_token, &self.cursor) {
            (Some(next), Cursor::Next(current)) if next == *current => {
                self.cursor = Cursor::Done;
                Err(BatchQueryError::RepeatedPageToken { token: next })
            }
            (next, _) => {
                self.cursor = next.map_or(Cursor::Done, Cursor::Next);
                Ok(())
            }
        }
    }
}

type PageSlots<T> = Arc<Mutex<Vec<Option<ItemResult<Page<T>>>>>>;

/// One-shot executor collecting every item of every queued list.
pub struct PaginatedBatchRequest<T> {
    factory: BatchRequestFactory,
    lists: Vec<Arc<dyn PaginatedRequest<Item = T>>>,
}

impl<T: Send + 'static> PaginatedBatchRequest<T> {
    /// Build an empty paginated executor; each round uses an executor from
    /// `factory`.
    #[must_use]
    pub const fn new(factory: BatchRequestFactory) -> Self {
        Self {
            factory,
            lists: Vec::new(),
        }
    }

    /// Queue one list to be fetched in full.
    pub fn queue<P>(&mut self, list: P)
    where
        P: PaginatedRequest<Item = T>,
    {
        self.lists.push(Arc::new(list));
    }

    /// Number of queued lists.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    /// Return whether nothing has been queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// Fetch every page of every queued list.
    ///
    /// ```rust,ignore
    /// let mut lists = factory.create_paginated::<Value>();
    /// lists.queue(JsonListRequest::get("/compute/v1/projects/demo/zones/a/instances"));
    /// let instances = lists.execute("ZonalServerGroupCaching.instances").await?;
    /// # Ok::<(), BatchQueryError>(())
    /// ```
    ///
    /// # Errors
    /// Returns [`BatchQueryError::Transport`] as soon as a batch call fails.
    /// Returns [`BatchQueryError::Item`] with the first failed page of a
    /// round once that round's batch has completed, and
    /// [`BatchQueryError::RepeatedPageToken`] when a list answers with the
    /// token it was just asked for.
    pub async fn execute(self, context: &str) -> Result<Vec<T>, BatchQueryError> {
        let Self { factory, lists } = self;
        let mut states: Vec<ListState<T>> = lists
            .into_iter()
            .map(|list| ListState {
                list,
                items: Vec::new(),
                cursor: Cursor::First,
            })
            .collect();

        let mut round = 0_usize;
        loop {
            let open: Vec<(usize, Option<String>)> = states
                .iter()
                .enumerate()
                .filter_map(|(index, state)| state.page_token().map(|token| (index, token)))
                .collect();
            if open.is_empty() {
                break;
            }
            round += 1;
            tracing::debug!(context, round, lists = open.len(), "fetching list pages");

            let mut batch = factory.create();
            let slots = queue_pages(&mut batch, &states, &open);
            batch.execute(context).await?;

            let pages = std::mem::take(&mut *slots.lock().unwrap_or_else(PoisonError::into_inner));
            let mut first_failure = None;
            for ((index, _), page) in open.into_iter().zip(pages) {
                let Some(state) = states.get_mut(index) else {
                    continue;
                };
                match page.map(ItemResult::into_result) {
                    Some(Ok(fetched)) => {
                        if let Err(error) = state.advance(fetched) {
                            first_failure.get_or_insert(error);
                        }
                    }
                    Some(Err(error)) => {
                        state.cursor = Cursor::Done;
                        first_failure.get_or_insert(BatchQueryError::Item(error));
                    }
                    None => state.cursor = Cursor::Done,
                }
            }
            if let Some(error) = first_failure {
                return Err(error);
            }
        }

        Ok(states.into_iter().flat_map(|state| state.items).collect())
    }
}

fn queue_pages<T: Send + 'static>(
    batch: &mut BatchRequest,
    states: &[ListState<T>],
    open: &[(usize, Option<String>)],
) -> PageSlots<T> {
    let slots: PageSlots<T> = Arc::new(Mutex::new(
        std::iter::repeat_with(|| None).take(open.len()).collect(),
    ));
    for (slot, (index, page_token)) in open.iter().enumerate() {
        let Some(state) = states.get(*index) else {
            continue;
        };
        let request = PageRequest {
            list: Arc::clone(&state.list),
            page_token: page_token.clone(),
        };
        let sink = Arc::clone(&slots);
        batch.queue(request, move |result: ItemResult<Page<T>>| {
            if let Some(entry) = sink
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get_mut(slot)
            {
                *entry = Some(result);
            }
        });
    }
    slots
}

#[cfg(test)]
mod tests;
