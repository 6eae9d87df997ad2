//! Paged reader
//!
//! Serves bounded pages straight from the stream cache. Disk is touched only
//! when a miss hydrates the stream.

use std::sync::Arc;

use async_trait::async_trait;
use eventvault_core::{END, Event, EventStream, EventsReader, ReadDirection, StoreError, StreamId};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::stream_cache::StreamCache;

#[derive(Debug)]
pub struct StreamReader {
    cache: Arc<StreamCache>,
    max_page_size: usize,
}

impl StreamReader {
    pub fn new(cache: Arc<StreamCache>, max_page_size: usize) -> Self {
        Self {
            cache,
            max_page_size: max_page_size.max(1),
        }
    }

    /// Materialize one page of at most `max_page_size` events
    pub async fn read_page(
        &self,
        stream_id: &StreamId,
        start_position: i64,
        direction: ReadDirection,
        max_page_size: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Event>, StoreError> {
        if start_position < 0 {
            return Err(StoreError::bad_request(format!(
                "start position must be non-negative, got {start_position}"
            )));
        }

        let entry = self.cache.get_events(stream_id, cancel).await?;
        let events = entry.read().await;
        let page = page_indices(events.len(), start_position, direction, max_page_size)
            .map(|i| events[i].clone())
            .collect::<Vec<_>>();

        trace!(stream = %stream_id, start_position, ?direction, count = page.len(), "Served page");
        Ok(page)
    }
}

/// Indices of the page, in the order they are served
fn page_indices(
    len: usize,
    start_position: i64,
    direction: ReadDirection,
    max_page_size: usize,
) -> Box<dyn Iterator<Item = usize>> {
    match direction {
        ReadDirection::Forward => {
            let start = usize::try_from(start_position).unwrap_or(usize::MAX);
            if start >= len {
                return Box::new(std::iter::empty());
            }
            let end = start.saturating_add(max_page_size).min(len);
            Box::new(start..end)
        }
        ReadDirection::Backward => {
            let start = if start_position == END {
                match len.checked_sub(1) {
                    Some(last) => last,
                    None => return Box::new(std::iter::empty()),
                }
            } else {
                match usize::try_from(start_position) {
                    Ok(start) if start < len => start,
                    _ => return Box::new(std::iter::empty()),
                }
            };
            let first = (start + 1).saturating_sub(max_page_size);
            Box::new((first..=start).rev())
        }
    }
}

#[async_trait]
impl EventsReader for StreamReader {
    async fn read(
        &self,
        stream_id: &StreamId,
        start_position: i64,
        direction: ReadDirection,
        cancel: &CancellationToken,
    ) -> Result<EventStream, StoreError> {
        let page = self
            .read_page(stream_id, start_position, direction, self.max_page_size, cancel)
            .await?;
        Ok(futures::stream::iter(page)
            .take_until(cancel.clone().cancelled_owned())
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indices(len: usize, start: i64, direction: ReadDirection, page: usize) -> Vec<usize> {
        page_indices(len, start, direction, page).collect()
    }

    #[test]
    fn test_forward_pages() {
        assert_eq!(indices(10, 0, ReadDirection::Forward, 4), vec![0, 1, 2, 3]);
        assert_eq!(indices(10, 8, ReadDirection::Forward, 4), vec![8, 9]);
        assert!(indices(10, 10, ReadDirection::Forward, 4).is_empty());
        assert!(indices(0, 0, ReadDirection::Forward, 4).is_empty());
        assert!(indices(10, END, ReadDirection::Forward, 4).is_empty());
    }

    #[test]
    fn test_backward_pages() {
        assert_eq!(indices(10, END, ReadDirection::Backward, 3), vec![9, 8, 7]);
        assert_eq!(indices(10, 4, ReadDirection::Backward, 3), vec![4, 3, 2]);
        assert_eq!(indices(10, 1, ReadDirection::Backward, 3), vec![1, 0]);
        assert_eq!(indices(10, 0, ReadDirection::Backward, 3), vec![0]);
        assert!(indices(10, 10, ReadDirection::Backward, 3).is_empty());
        assert!(indices(0, END, ReadDirection::Backward, 3).is_empty());
    }
}
