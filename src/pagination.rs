//! Page accumulation for the listing endpoints.

use std::future::Future;

use tracing::debug;

use crate::error::Result;
use crate::models::{ListPage, ShareDetail};

/// Page size used for every listing request.
pub const DEFAULT_PAGE_SIZE: u64 = 50;

/// Position within a paginated listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationCursor {
    /// 1-based page number of the next request.
    pub page: u64,
    pub page_size: u64,
    pub total: u64,
    pub returned_count: u64,
}

impl PaginationCursor {
    pub fn new(page_size: u64) -> Self {
        Self {
            page: 1,
            page_size,
            total: 0,
            returned_count: 0,
        }
    }

    /// Record the result of fetching the current page.
    pub fn record(&mut self, total: u64, server_page_size: u64, returned_count: u64) {
        self.total = total;
        if server_page_size > 0 {
            self.page_size = server_page_size;
        }
        self.returned_count = returned_count;
    }

    /// The listing has no entries at all.
    pub fn is_empty(&self) -> bool {
        self.total < 1
    }

    /// A short page, or a total that fits in one page, ends the listing.
    pub fn is_last_page(&self) -> bool {
        self.is_empty() || self.total <= self.page_size || self.returned_count < self.page_size
    }

    pub fn advance(&mut self) {
        self.page += 1;
    }
}

/// Fetch pages until the cursor reports the last one, keeping server order.
///
/// `fetch` receives the 1-based page number and the requested page size. The
/// ownership flag of the first page is reported for the whole listing.
pub async fn collect_pages<F, Fut>(page_size: u64, mut fetch: F) -> Result<ShareDetail>
where
    F: FnMut(u64, u64) -> Fut,
    Fut: Future<Output = Result<ListPage>>,
{
    let mut cursor = PaginationCursor::new(page_size);
    let mut detail = ShareDetail::default();

    loop {
        let page = fetch(cursor.page, page_size).await?;
        if cursor.page == 1 {
            detail.is_owner = page.is_owner;
        }

        cursor.record(page.meta.total, page.meta.size, page.entries.len() as u64);
        if cursor.is_empty() {
            debug!("Listing is empty");
            return Ok(detail);
        }

        detail.entries.extend(page.entries);
        if cursor.is_last_page() {
            debug!(
                "Listing finished after {} page(s), {} entries",
                cursor.page,
                detail.entries.len()
            );
            return Ok(detail);
        }
        cursor.advance();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PageMetadata, ShareEntry};
    use std::cell::Cell;

    fn entry(n: u64) -> ShareEntry {
        ShareEntry {
            fid: format!("f{}", n),
            file_name: format!("file{}", n),
            file_type: 1,
            is_dir: false,
            parent_fid: "0".to_string(),
            item_count: None,
            share_fid_token: String::new(),
            status: 1,
            size: 0,
        }
    }

    /// Serve pages of the given sizes, reporting `total` on every page.
    async fn run(sizes: &[u64], total: u64, page_size: u64) -> (ShareDetail, u64) {
        let calls = Cell::new(0u64);
        let mut next = 0u64;
        let detail = collect_pages(page_size, |page, _| {
            calls.set(calls.get() + 1);
            let size = sizes.get((page - 1) as usize).copied().unwrap_or(0);
            let entries = (0..size).map(|i| entry(next + i)).collect();
            next += size;
            async move {
                Ok(ListPage {
                    entries,
                    meta: PageMetadata {
                        total,
                        size: page_size,
                        count: size,
                        page,
                    },
                    is_owner: false,
                })
            }
        })
        .await
        .unwrap();
        (detail, calls.get())
    }

    #[test]
    fn test_cursor_last_page_rules() {
        let mut cursor = PaginationCursor::new(50);
        cursor.record(0, 50, 0);
        assert!(cursor.is_last_page());

        cursor.record(30, 50, 30);
        assert!(cursor.is_last_page());

        cursor.record(120, 50, 50);
        assert!(!cursor.is_last_page());

        cursor.record(120, 50, 20);
        assert!(cursor.is_last_page());
    }

    #[tokio::test]
    async fn test_stops_on_short_page() {
        let (detail, calls) = run(&[50, 50, 7, 50], 107, 50).await;
        assert_eq!(calls, 3);
        assert_eq!(detail.entries.len(), 107);
        assert_eq!(detail.entries[0].fid, "f0");
        assert_eq!(detail.entries[106].fid, "f106");
    }

    #[tokio::test]
    async fn test_single_page_total() {
        let (detail, calls) = run(&[10, 50], 10, 50).await;
        assert_eq!(calls, 1);
        assert_eq!(detail.entries.len(), 10);
    }

    #[tokio::test]
    async fn test_exact_multiple_needs_trailing_empty_page() {
        let (detail, calls) = run(&[50, 50, 0], 100, 50).await;
        assert_eq!(calls, 3);
        assert_eq!(detail.entries.len(), 100);
    }

    #[tokio::test]
    async fn test_empty_listing() {
        let (detail, calls) = run(&[0], 0, 50).await;
        assert_eq!(calls, 1);
        assert!(detail.entries.is_empty());
    }
}
