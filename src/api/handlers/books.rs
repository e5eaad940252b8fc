use super::AppState;
use crate::api::models::{
    BookDetailResponse, BookListResponse, BookQuery, BorrowState, CreateBookRequest,
    MessageResponse, Pagination, UpdateBookRequest,
};
use crate::auth::middleware::AuthUser;
use crate::auth::models::non_empty;
use crate::core::error::{LeafError, Result};
use crate::core::utils::format_timestamp;
use crate::db::models::{Book, User, UserSummary};
use crate::db::repository::{BookFilter, Repository};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

pub(crate) async fn load_book(state: &AppState, id: &str) -> Result<Book> {
    state
        .book_repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| LeafError::NotFound(format!("Book {} not found", id)))
}

/// Posters edit their own books; admins edit any book
fn ensure_can_edit(book: &Book, user: &User) -> Result<()> {
    if user.is_admin() || book.posted_by.as_deref() == Some(user.id.as_str()) {
        Ok(())
    } else {
        Err(LeafError::PermissionDenied(
            "Only the person who posted this book can change it".to_string(),
        ))
    }
}

/// Handler for GET /api/v1/books
pub async fn list_books(
    State(state): State<AppState>,
    Query(query): Query<BookQuery>,
    _user: AuthUser,
) -> Result<impl IntoResponse> {
    let page = crate::core::utils::PageRequest::new(query.page, query.per_page, 12);
    let filter = BookFilter {
        search: query.search,
        category: query.category,
        available_only: query.available_only,
    };

    let (items, total) = state.book_repo.search(filter, page).await?;
    let categories = state.book_repo.categories().await?;

    Ok(Json(BookListResponse {
        items,
        pagination: Pagination::new(page, total),
        categories,
    }))
}

/// Handler for GET /api/v1/books/categories
pub async fn list_categories(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(state.book_repo.categories().await?))
}

/// Handler for GET /api/v1/books/:id
pub async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: AuthUser,
) -> Result<impl IntoResponse> {
    let book = load_book(&state, &id).await?;
    let stats = state.review_repo.stats(&id).await?;

    let poster = match book.posted_by.as_deref() {
        Some(poster_id) => state.user_repo.find_by_id(poster_id).await?.map(|u| UserSummary {
            full_name: u.full_name(),
            id: u.id,
            username: u.username,
        }),
        None => None,
    };

    let record = state.borrow_repo.find_open(&id, &user.id).await?;
    let borrow_status = BorrowState::of(record.as_ref());
    let due_date = record.map(|r| r.effective_due_date().to_string());

    Ok(Json(BookDetailResponse {
        average_rating: stats.average.map(crate::api::models::round_one_decimal),
        review_count: stats.total,
        is_owner: book.posted_by.as_deref() == Some(user.id.as_str()),
        poster,
        borrow_status,
        due_date,
        book,
    }))
}

/// Handler for POST /api/v1/books
pub async fn create_book(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateBookRequest>,
) -> Result<impl IntoResponse> {
    let now = Utc::now();
    req.validate(now)?;

    let book = Book {
        id: Uuid::new_v4().to_string(),
        title: req.title.trim().to_string(),
        author: req.author.trim().to_string(),
        category: req.category.trim().to_string(),
        isbn: req.isbn.trim().to_string(),
        description: non_empty(req.description),
        cover_url: non_empty(req.cover_url),
        publication_year: req.publication_year,
        pages: req.pages,
        available: true,
        posted_by: Some(user.id.clone()),
        created_at: format_timestamp(now),
    };
    state.book_repo.create(&book).await?;
    tracing::info!(book_id = %book.id, user_id = %user.id, title = %book.title, "Book posted");

    let awarded = state.achievements.check_and_award(&user.id).await?;

    Ok((
        StatusCode::CREATED,
        MessageResponse::new("Book added successfully", json!({ "book": book, "awarded": awarded })),
    ))
}

/// Handler for PUT /api/v1/books/:id
pub async fn update_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: AuthUser,
    Json(req): Json<UpdateBookRequest>,
) -> Result<impl IntoResponse> {
    let mut book = load_book(&state, &id).await?;
    ensure_can_edit(&book, &user)?;

    req.apply(&mut book, Utc::now())?;
    state.book_repo.update(&book).await?;
    tracing::info!(book_id = %book.id, user_id = %user.id, "Book updated");

    Ok(MessageResponse::new("Book updated successfully", book))
}

/// Handler for DELETE /api/v1/books/:id
pub async fn delete_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: AuthUser,
) -> Result<impl IntoResponse> {
    let book = load_book(&state, &id).await?;
    ensure_can_edit(&book, &user)?;

    if state.book_repo.has_active_loan(&id).await? {
        return Err(LeafError::Conflict(
            "This book is currently lent out and cannot be deleted".to_string(),
        ));
    }

    state.book_repo.delete(&id).await?;
    tracing::info!(book_id = %id, user_id = %user.id, "Book deleted");

    Ok(StatusCode::NO_CONTENT)
}
