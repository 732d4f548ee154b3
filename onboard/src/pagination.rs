use std::future::Future;

use tracing::debug;

use crate::tracker::TrackerError;
use crate::types::Page;

/// Follow a listing's next-page cursor from page 0 until the server reports
/// no further page, collecting every item in order.
///
/// The first failing page aborts the walk and its error is returned; partial
/// results are dropped. A cursor that does not move forward is reported as
/// [`TrackerError::PaginationStalled`].
pub async fn fetch_all_pages<T, F, Fut>(mut fetch_page: F) -> Result<Vec<T>, TrackerError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Page<T>, TrackerError>>,
{
    let mut items = Vec::new();
    let mut page = 0;

    loop {
        let Page {
            items: batch,
            next_page,
        } = fetch_page(page).await?;
        items.extend(batch);

        if next_page == 0 {
            break;
        }
        if next_page <= page {
            return Err(TrackerError::PaginationStalled(next_page));
        }
        debug!(page, next_page, collected = items.len(), "following next page");
        page = next_page;
    }

    Ok(items)
}
