//! Split an ordered queue into consecutive bounded chunks.

use super::MaxBatchSize;

/// Partition `items` into chunks of `max_batch_size`, the last holding the
/// remainder. An empty input yields no chunks.
pub(super) fn partition<T>(items: Vec<T>, max_batch_size: MaxBatchSize) -> Vec<Vec<T>> {
    let size = max_batch_size.get();
    let mut chunks = Vec::with_capacity(items.len().div_ceil(size));
    let mut remaining = items.into_iter().peekable();
    while remaining.peek().is_some() {
        chunks.push(remaining.by_ref().take(size).collect());
    }
    chunks
}
