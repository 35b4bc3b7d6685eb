//! Display pagination over an already materialized child list.
//!
//! Paging never changes what is fetched, only which contiguous slice is shown.

use serde::{Deserialize, Serialize};

use crate::error::ReftreeError;

/// Page sizes offered by the editor.
pub const PAGE_SIZE_OPTIONS: &[usize] = &[3, 10, 20, 40];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pager {
    page_index: usize,
    page_size: usize,
}

impl Pager {
    pub fn new(page_size: usize) -> Result<Pager, ReftreeError> {
        if page_size == 0 {
            return Err(ReftreeError::Validation(
                "page size must be positive".to_string(),
            ));
        }
        Ok(Pager {
            page_index: 0,
            page_size,
        })
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// The slice of `items` on the current page. Empty past the end.
    pub fn page<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let start = self.page_index.saturating_mul(self.page_size).min(items.len());
        let end = start.saturating_add(self.page_size).min(items.len());
        &items[start..end]
    }

    pub fn page_count(&self, total: usize) -> usize {
        total.div_ceil(self.page_size)
    }

    pub fn is_last_page(&self, total: usize) -> bool {
        self.page_index
            .saturating_add(1)
            .saturating_mul(self.page_size)
            >= total
    }

    /// Jump to `page_index`, clamped to the last page of `total` items.
    pub fn go_to(&mut self, page_index: usize, total: usize) {
        let last = self.page_count(total).saturating_sub(1);
        self.page_index = page_index.min(last);
    }

    /// Change the page size, keeping the item that started the previous page roughly in view:
    /// the new index is `(old_size * old_index + 1) / new_size`.
    pub fn set_page_size(&mut self, page_size: usize) -> Result<(), ReftreeError> {
        if page_size == 0 {
            return Err(ReftreeError::Validation(
                "page size must be positive".to_string(),
            ));
        }
        self.page_index = self
            .page_size
            .saturating_mul(self.page_index)
            .saturating_add(1)
            / page_size;
        self.page_size = page_size;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_change_recomputes_index() {
        let mut pager = Pager::new(3).unwrap();
        pager.go_to(2, 30);
        pager.set_page_size(10).unwrap();
        assert_eq!(pager.page_index(), 0);

        let mut pager = Pager::new(10).unwrap();
        pager.go_to(3, 100);
        pager.set_page_size(3).unwrap();
        assert_eq!(pager.page_index(), 10);
        assert!(pager.set_page_size(0).is_err());
    }

    #[test]
    fn test_slices_are_contiguous_pages() {
        let items: Vec<usize> = (0..8).collect();
        let mut pager = Pager::new(3).unwrap();
        assert_eq!(pager.page(&items), &[0, 1, 2]);
        pager.go_to(1, items.len());
        assert_eq!(pager.page(&items), &[3, 4, 5]);
        pager.go_to(9, items.len());
        assert_eq!(pager.page_index(), 2);
        assert_eq!(pager.page(&items), &[6, 7]);
        assert!(pager.is_last_page(items.len()));
        assert_eq!(pager.page_count(items.len()), 3);
    }

    #[test]
    fn test_out_of_range_page_is_empty() {
        let mut pager = Pager::new(4).unwrap();
        pager.set_page_size(1).unwrap();
        let items = [1, 2];
        pager.go_to(0, 0);
        assert!(pager.page(&items[..0]).is_empty());
        assert_eq!(pager.page_count(0), 0);
    }

    #[test]
    fn test_huge_pages_do_not_overflow() {
        let mut pager = Pager::new(1).unwrap();
        pager.go_to(usize::MAX, usize::MAX);
        assert_eq!(pager.page_index(), usize::MAX - 1);
        pager.set_page_size(usize::MAX).unwrap();
        assert_eq!(pager.page_index(), 1);
        assert!(pager.is_last_page(usize::MAX));
        assert!(pager.page(&[1, 2, 3]).is_empty());

        pager.set_page_size(2).unwrap();
        assert_eq!(pager.page_index(), usize::MAX / 2);
        assert!(pager.is_last_page(10));
    }
}
