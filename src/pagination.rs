//! Page arithmetic for listings.
//!
//! All of the listing operations take a [`Page`] rather than a raw offset
//! so the clamping rules live in exactly one place. Pages are 1-based.

/// A single page of a listing.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Page {
    /// The 1-based page number.
    pub num: u32,
    /// How many items fit on a page.
    pub width: u32,
}

impl Page {
    /// The number of items to skip to reach this page.
    pub fn offset(&self) -> u32 {
        self.num.saturating_sub(1) * self.width
    }
}

/// A fully resolved pagination request.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Plan {
    /// The page to serve, clamped into range.
    pub page: Page,
    /// How many pages the listing has. At least 1, even when empty.
    pub total_pages: u32,
}

/// Resolve a requested page against an item total.
///
/// An empty listing still has one (empty) page, and a request past the
/// end is clamped to the last page rather than rejected. `width` must be
/// nonzero.
pub fn plan(total_items: u32, width: u32, requested: u32) -> Plan {
    let total_pages = last_page(total_items, width);
    let num = requested.clamp(1, total_pages);

    Plan {
        page: Page { num, width },
        total_pages,
    }
}

/// The number of the last page of a listing with `total_items` items. The
/// landing page of the newest item, since listings fill oldest-first.
pub fn last_page(total_items: u32, width: u32) -> u32 {
    std::cmp::max(1, total_items.div_ceil(width))
}
