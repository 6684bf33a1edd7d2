//! Offset pagination primitives.

use serde::Serialize;

use crate::error::DomainError;

/// A validated page request (1-based page number).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PageRequest {
    page: u64,
    per_page: u64,
}

impl PageRequest {
    pub fn new(page: u64, per_page: u64) -> Result<Self, DomainError> {
        if page == 0 {
            return Err(DomainError::validation("page", "page must be at least 1"));
        }
        if per_page == 0 {
            return Err(DomainError::validation("per_page", "per_page must be at least 1"));
        }
        Ok(Self { page, per_page })
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn per_page(&self) -> u64 {
        self.per_page
    }

    fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.per_page)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, per_page: 15 }
    }
}

/// One page of results plus the metadata clients need to walk the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub per_page: u64,
    pub current_page: u64,
    pub last_page: u64,
    /// 1-based index of the first item on this page (`None` when empty).
    pub from: Option<u64>,
    pub to: Option<u64>,
}

impl<T> Page<T> {
    /// Cut a page out of an already filtered and sorted result set.
    pub fn paginate(all: Vec<T>, request: PageRequest) -> Self {
        let total = all.len() as u64;
        let last_page = total.div_ceil(request.per_page).max(1);

        let items: Vec<T> = all
            .into_iter()
            .skip(request.offset() as usize)
            .take(request.per_page as usize)
            .collect();

        let (from, to) = if items.is_empty() {
            (None, None)
        } else {
            let from = request.offset() + 1;
            (Some(from), Some(from + items.len() as u64 - 1))
        };

        Self {
            items,
            total,
            per_page: request.per_page,
            current_page: request.page,
            last_page,
            from,
            to,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            per_page: self.per_page,
            current_page: self.current_page,
            last_page: self.last_page,
            from: self.from,
            to: self.to,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn middle_page_has_bounds() {
        let page = Page::paginate((1..=35).collect::<Vec<_>>(), PageRequest::new(2, 15).unwrap());
        assert_eq!(page.items.first(), Some(&16));
        assert_eq!(page.items.len(), 15);
        assert_eq!(page.last_page, 3);
        assert_eq!(page.from, Some(16));
        assert_eq!(page.to, Some(30));
    }

    #[test]
    fn empty_result_still_has_one_page() {
        let page = Page::paginate(Vec::<u8>::new(), PageRequest::default());
        assert_eq!(page.total, 0);
        assert_eq!(page.last_page, 1);
        assert_eq!(page.from, None);
    }

    #[test]
    fn page_past_the_end_is_empty() {
        let page = Page::paginate(vec![1, 2, 3], PageRequest::new(5, 2).unwrap());
        assert!(page.items.is_empty());
        assert_eq!(page.last_page, 2);
        assert_eq!(page.current_page, 5);
    }

    #[test]
    fn zero_page_is_rejected() {
        assert!(PageRequest::new(0, 10).is_err());
        assert!(PageRequest::new(1, 0).is_err());
    }
}
