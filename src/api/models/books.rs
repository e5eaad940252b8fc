use crate::core::error::{LeafError, Result};
use crate::db::models::{Book, BorrowedBook, UserSummary};
use crate::db::repository::lending::BorrowDetails;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

/// Query parameters of the catalog listing
#[derive(Debug, Default, Deserialize)]
pub struct BookQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub available_only: bool,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Request body for creating a book
#[derive(Debug, Deserialize)]
pub struct CreateBookRequest {
    pub title: String,
    pub author: String,
    pub category: String,
    pub isbn: String,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub publication_year: Option<i32>,
    pub pages: Option<i32>,
}

fn check_numbers(publication_year: Option<i32>, pages: Option<i32>, now: DateTime<Utc>) -> Result<()> {
    if let Some(year) = publication_year {
        if year > now.year() {
            return Err(LeafError::ValidationError(
                "Publication year cannot be in the future".to_string(),
            ));
        }
    }
    if let Some(pages) = pages {
        if pages <= 0 {
            return Err(LeafError::ValidationError(
                "Pages must be a positive number".to_string(),
            ));
        }
    }
    Ok(())
}

impl CreateBookRequest {
    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        let required = [&self.title, &self.author, &self.category, &self.isbn];
        if required.iter().any(|v| v.trim().is_empty()) {
            return Err(LeafError::ValidationError(
                "Title, author, category and ISBN are required".to_string(),
            ));
        }
        check_numbers(self.publication_year, self.pages, now)
    }
}

/// Request body for updating a book; absent fields stay unchanged
#[derive(Debug, Default, Deserialize)]
pub struct UpdateBookRequest {
    pub title: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub isbn: Option<String>,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub publication_year: Option<i32>,
    pub pages: Option<i32>,
    pub available: Option<bool>,
}

impl UpdateBookRequest {
    pub fn apply(self, book: &mut Book, now: DateTime<Utc>) -> Result<()> {
        check_numbers(self.publication_year, self.pages, now)?;

        for (value, target) in [
            (self.title, &mut book.title),
            (self.author, &mut book.author),
            (self.category, &mut book.category),
            (self.isbn, &mut book.isbn),
        ] {
            if let Some(value) = value {
                let value = value.trim();
                if value.is_empty() {
                    return Err(LeafError::ValidationError(
                        "Title, author, category and ISBN cannot be empty".to_string(),
                    ));
                }
                *target = value.to_string();
            }
        }

        if self.description.is_some() {
            book.description = crate::auth::models::non_empty(self.description);
        }
        if self.cover_url.is_some() {
            book.cover_url = crate::auth::models::non_empty(self.cover_url);
        }
        if self.publication_year.is_some() {
            book.publication_year = self.publication_year;
        }
        if self.pages.is_some() {
            book.pages = self.pages;
        }
        if let Some(available) = self.available {
            book.available = available;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct BookListResponse {
    pub items: Vec<Book>,
    pub pagination: super::Pagination,
    pub categories: Vec<String>,
}

/// The caller's relation to a book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BorrowState {
    None,
    Pending,
    Borrowed,
}

impl BorrowState {
    pub fn of(record: Option<&BorrowedBook>) -> Self {
        match record {
            None => BorrowState::None,
            Some(r) if r.is_agreed => BorrowState::Borrowed,
            Some(_) => BorrowState::Pending,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BookDetailResponse {
    #[serde(flatten)]
    pub book: Book,
    pub average_rating: Option<f64>,
    pub review_count: i64,
    pub poster: Option<UserSummary>,
    pub borrow_status: BorrowState,
    pub due_date: Option<String>,
    pub is_owner: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct BorrowRequest {
    pub proposed_due_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub borrower_id: String,
    pub agreed_due_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub borrower_id: String,
}

/// A loan with its overdue flag
#[derive(Debug, Serialize)]
pub struct LoanView {
    #[serde(flatten)]
    pub details: BorrowDetails,
    pub effective_due_date: String,
    pub is_overdue: bool,
}

impl LoanView {
    pub fn new(details: BorrowDetails, now: DateTime<Utc>) -> Self {
        Self {
            effective_due_date: details.record.effective_due_date().to_string(),
            is_overdue: details.record.is_overdue(now),
            details,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub borrowed_books: Vec<LoanView>,
    pub posted_books: Vec<Book>,
    pub pending_requests: Vec<BorrowDetails>,
    pub incoming_requests: Vec<BorrowDetails>,
}

/// Request body for a book or user review
#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub rating: i32,
    pub comment: Option<String>,
}

impl ReviewRequest {
    pub fn validate(&self, max_rating: i32) -> Result<()> {
        if !(1..=max_rating).contains(&self.rating) {
            return Err(LeafError::ValidationError(format!(
                "Rating must be between 1 and {}",
                max_rating
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct ReviewListResponse<T> {
    pub items: Vec<T>,
    pub pagination: Option<super::Pagination>,
    pub average_rating: Option<f64>,
    pub total: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn request() -> CreateBookRequest {
        CreateBookRequest {
            title: "Dune".into(),
            author: "Frank Herbert".into(),
            category: "Science Fiction".into(),
            isbn: "978-0441013593".into(),
            description: None,
            cover_url: None,
            publication_year: Some(1965),
            pages: Some(412),
        }
    }

    #[test]
    fn test_create_validation() {
        let now = Utc.with_ymd_and_hms(2030, 6, 1, 0, 0, 0).unwrap();
        assert!(request().validate(now).is_ok());

        let mut missing = request();
        missing.isbn = " ".into();
        assert!(missing.validate(now).is_err());

        let mut future = request();
        future.publication_year = Some(2031);
        assert!(future.validate(now).is_err());

        let mut pages = request();
        pages.pages = Some(0);
        assert!(pages.validate(now).is_err());
    }

    #[test]
    fn test_review_rating_bounds() {
        let review = |rating| ReviewRequest { rating, comment: None };
        assert!(review(0).validate(5).is_err());
        assert!(review(5).validate(5).is_ok());
        assert!(review(6).validate(5).is_err());
        assert!(review(10).validate(10).is_ok());
    }
}
