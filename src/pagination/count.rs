//! Total-item tracking and page clamping.

use crate::store::{ParamKey, ParameterStore};

use super::params;

/// `ceil(total_items / per_page)`, never below 1.
///
/// An unknown total counts as exactly one page.
pub fn total_pages(total_items: Option<u64>, per_page: u64) -> u64 {
    let per_page = per_page.max(1);
    total_items.unwrap_or(per_page).div_ceil(per_page).max(1)
}

/// Store a new total and pull the current page back inside the result set.
/// Returns whether the page moved.
///
/// The clamp is evaluated even when the total is unchanged, so a page moved
/// past the end is corrected on the next refresh.
pub(crate) fn set_total_items(store: &ParameterStore, total: u64) -> bool {
    store.write(ParamKey::TotalItems, total);

    let page = params::page(store);
    let per_page = params::per_page(store);
    if page > 1 && total <= per_page.saturating_mul(page) {
        let last = total_pages(Some(total), per_page);
        if last != page {
            tracing::debug!(from = page, to = last, total, "clamping page to result set");
        }
        return params::set_page(store, last);
    }
    false
}
