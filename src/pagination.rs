use serde::{Deserialize, Serialize};

use crate::engine::EngineError;
use crate::limits::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::model::Equipment;

/// A 0-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    page: usize,
    size: usize,
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            page: 0,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageQuery {
    pub fn new(page: usize, size: usize) -> Result<Self, EngineError> {
        if size == 0 {
            return Err(EngineError::Validation("page size must be positive"));
        }
        if size > MAX_PAGE_SIZE {
            return Err(EngineError::Validation("page size too large"));
        }
        Ok(Self { page, size })
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn offset(&self) -> usize {
        self.page.saturating_mul(self.size)
    }

    pub fn limit(&self) -> usize {
        self.size
    }
}

pub fn total_pages(total_count: usize, size: usize) -> usize {
    total_count.div_ceil(size)
}

pub fn has_more(page: usize, total_count: usize, size: usize) -> bool {
    page.saturating_add(1).saturating_mul(size) < total_count
}

/// A page of equipment plus the pagination metadata exposed upward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentList {
    pub total_count: usize,
    pub total_pages: usize,
    pub page: usize,
    pub size: usize,
    pub has_more: bool,
    pub equipments: Vec<Equipment>,
}

impl EquipmentList {
    pub fn new(query: PageQuery, total_count: usize, equipments: Vec<Equipment>) -> Self {
        Self {
            total_count,
            total_pages: total_pages(total_count, query.size),
            page: query.page,
            size: query.size,
            has_more: has_more(query.page, total_count, query.size),
            equipments,
        }
    }

    pub fn empty(query: PageQuery) -> Self {
        Self::new(query, 0, Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(0, 10), 0);
        assert_eq!(total_pages(1, 10), 1);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
    }

    #[test]
    fn has_more_only_before_last_page() {
        assert!(!has_more(0, 0, 10));
        assert!(!has_more(0, 10, 10));
        assert!(has_more(0, 11, 10));
        assert!(!has_more(1, 11, 10));
        assert!(has_more(1, 21, 10));
    }

    #[test]
    fn offset_and_limit() {
        let q = PageQuery::new(3, 25).unwrap();
        assert_eq!(q.offset(), 75);
        assert_eq!(q.limit(), 25);
    }

    #[test]
    fn zero_size_rejected() {
        assert!(matches!(PageQuery::new(0, 0), Err(EngineError::Validation(_))));
        assert!(matches!(
            PageQuery::new(0, MAX_PAGE_SIZE + 1),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn empty_list_shape() {
        let list = EquipmentList::empty(PageQuery::new(0, 10).unwrap());
        let json = serde_json::to_value(&list).unwrap();
        assert_eq!(json["total_count"], 0);
        assert_eq!(json["total_pages"], 0);
        assert_eq!(json["has_more"], false);
        assert_eq!(json["page"], 0);
        assert_eq!(json["size"], 10);
        assert_eq!(json["equipments"].as_array().unwrap().len(), 0);
    }
}
