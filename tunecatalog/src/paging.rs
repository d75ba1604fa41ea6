//! Page-by-page collection of catalog listings

use std::future::Future;

use crate::error::Result;

/// Safety net for providers that keep returning full pages forever
pub const MAX_PAGES: usize = 200;

/// Position of the next page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    /// Offset/limit paging (Spotify)
    Offset(usize),
    /// Opaque page token; `None` asks for the first page (YouTube)
    Token(Option<String>),
}

/// One page of raw items
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Cursor of the following page, `None` on the last one
    pub next: Option<Cursor>,
}

/// Fetches pages until one is short or has no successor
///
/// Items are concatenated in the order they were received. A page is
/// the last one when it holds fewer than `page_size` items or carries no
/// next cursor. Any page error aborts the whole listing.
pub async fn collect_pages<T, F, Fut>(page_size: usize, first: Cursor, mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(Cursor) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut items = Vec::new();
    let mut cursor = first;

    for page_index in 0..MAX_PAGES {
        let page = fetch(cursor).await?;
        let short = page.items.len() < page_size;
        tracing::debug!(page = page_index, items = page.items.len(), "Fetched page");
        items.extend(page.items);

        match page.next {
            Some(next) if !short => cursor = next,
            _ => return Ok(items),
        }
    }

    tracing::warn!(
        pages = MAX_PAGES,
        items = items.len(),
        "Stopped paging after reaching the page limit"
    );
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CatalogError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn offset_source(total: usize, limit: usize, calls: &AtomicUsize, cursor: Cursor) -> Result<Page<usize>> {
        calls.fetch_add(1, Ordering::SeqCst);
        let Cursor::Offset(offset) = cursor else {
            panic!("unexpected cursor {cursor:?}");
        };
        let end = (offset + limit).min(total);
        Ok(Page {
            items: (offset..end).collect(),
            next: Some(Cursor::Offset(offset + limit)),
        })
    }

    #[tokio::test]
    async fn test_150_items_take_two_pages() {
        let calls = AtomicUsize::new(0);
        let items = collect_pages(100, Cursor::Offset(0), |c| {
            let page = offset_source(150, 100, &calls, c);
            async move { page }
        })
        .await
        .unwrap();

        assert_eq!(items.len(), 150);
        assert_eq!(items, (0..150).collect::<Vec<_>>());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exact_multiple_needs_an_empty_page() {
        let calls = AtomicUsize::new(0);
        let items = collect_pages(100, Cursor::Offset(0), |c| {
            let page = offset_source(200, 100, &calls, c);
            async move { page }
        })
        .await
        .unwrap();

        assert_eq!(items.len(), 200);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_missing_next_cursor_stops() {
        let calls = AtomicUsize::new(0);
        let items = collect_pages(2, Cursor::Token(None), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Ok(Page {
                    items: vec!["a", "b"],
                    next: None,
                })
            }
        })
        .await
        .unwrap();

        assert_eq!(items, vec!["a", "b"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_page_error_aborts() {
        let result: Result<Vec<u8>> = collect_pages(10, Cursor::Offset(0), |_| async {
            Err(CatalogError::RateLimitExceeded)
        })
        .await;

        assert!(matches!(result, Err(CatalogError::RateLimitExceeded)));
    }
}
