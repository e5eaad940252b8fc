use crate::core::utils::PageRequest;
use axum::Json;
use serde::{Deserialize, Serialize};

/// `?page&per_page` query parameters
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PageQuery {
    pub fn request(&self, default_per_page: u32) -> PageRequest {
        PageRequest::new(self.page, self.per_page, default_per_page)
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub pages: u32,
    pub per_page: u32,
    pub total: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    pub fn new(page: PageRequest, total: i64) -> Self {
        let per_page = page.per_page as i64;
        let pages = ((total.max(0) + per_page - 1) / per_page) as u32;
        Self {
            page: page.page,
            pages,
            per_page: page.per_page,
            total,
            has_next: page.page < pages,
            has_prev: page.page > 1,
        }
    }
}

/// A page of items
#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, page: PageRequest, total: i64) -> Self {
        Self {
            items,
            pagination: Pagination::new(page, total),
        }
    }
}

/// Body of a successful mutation
#[derive(Debug, Serialize)]
pub struct MessageResponse<T> {
    pub message: String,
    pub data: T,
}

impl<T: Serialize> MessageResponse<T> {
    pub fn new(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            message: message.into(),
            data,
        })
    }
}
