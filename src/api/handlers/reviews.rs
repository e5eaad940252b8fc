use super::books::load_book;
use super::AppState;
use crate::api::models::{
    round_one_decimal, MessageResponse, PageQuery, Pagination,
    ReviewListResponse, ReviewRequest,
};
use crate::auth::middleware::AuthUser;
use crate::auth::models::non_empty;
use crate::core::error::{LeafError, Result};
use crate::core::utils::now_timestamp;
use crate::db::models::BookReview;
use crate::db::repository::Repository;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;

const MAX_BOOK_RATING: i32 = 5;
const MAX_USER_RATING: i32 = 10;

async fn load_own_review(state: &AppState, id: &str, user_id: &str) -> Result<BookReview> {
    let review = state
        .review_repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| LeafError::NotFound(format!("Review {} not found", id)))?;
    if review.user_id != user_id {
        return Err(LeafError::PermissionDenied(
            "You can only change your own reviews".to_string(),
        ));
    }
    Ok(review)
}

/// Handler for POST /api/v1/books/:id/reviews - add or replace the caller's review
pub async fn review_book(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
    user: AuthUser,
    Json(req): Json<ReviewRequest>,
) -> Result<impl IntoResponse> {
    req.validate(MAX_BOOK_RATING)?;
    load_book(&state, &book_id).await?;

    let upserted = state
        .review_repo
        .upsert(
            &book_id,
            &user.id,
            req.rating,
            non_empty(req.comment),
            &now_timestamp(),
        )
        .await?;
    let awarded = state.achievements.check_and_award(&user.id).await?;

    let (status, message) = if upserted.created {
        (StatusCode::CREATED, "Review added successfully")
    } else {
        (StatusCode::OK, "Review updated successfully")
    };
    tracing::info!(book_id = %book_id, user_id = %user.id, created = upserted.created, "Book reviewed");

    Ok((
        status,
        MessageResponse::new(message, json!({ "review": upserted.review, "awarded": awarded })),
    ))
}

/// Handler for GET /api/v1/books/:id/reviews
pub async fn list_book_reviews(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse> {
    load_book(&state, &book_id).await?;
    let page = query.request(10);

    let (items, total) = state.review_repo.list_for_book(&book_id, page).await?;
    let stats = state.review_repo.stats(&book_id).await?;

    Ok(Json(ReviewListResponse {
        items,
        pagination: Some(Pagination::new(page, total)),
        average_rating: stats.average.map(round_one_decimal),
        total,
    }))
}

/// Handler for PUT /api/v1/reviews/:id
pub async fn update_review(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: AuthUser,
    Json(req): Json<ReviewRequest>,
) -> Result<impl IntoResponse> {
    req.validate(MAX_BOOK_RATING)?;
    load_own_review(&state, &id, &user.id).await?;

    state
        .review_repo
        .update(&id, req.rating, non_empty(req.comment), &now_timestamp())
        .await?;
    let review = state
        .review_repo
        .find_by_id(&id)
        .await?
        .ok_or_else(|| LeafError::NotFound(format!("Review {} not found", id)))?;

    Ok(MessageResponse::new("Review updated successfully", review))
}

/// Handler for DELETE /api/v1/reviews/:id
pub async fn delete_review(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: AuthUser,
) -> Result<impl IntoResponse> {
    load_own_review(&state, &id, &user.id).await?;
    state.review_repo.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for POST /api/v1/users/:id/reviews
pub async fn review_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    reviewer: AuthUser,
    Json(req): Json<ReviewRequest>,
) -> Result<impl IntoResponse> {
    if reviewer.id == user_id {
        return Err(LeafError::InvalidRequest("You cannot review yourself".to_string()));
    }
    req.validate(MAX_USER_RATING)?;
    if state.user_repo.find_by_id(&user_id).await?.is_none() {
        return Err(LeafError::NotFound(format!("User {} not found", user_id)));
    }

    let upserted = state
        .user_review_repo
        .upsert(
            &reviewer.id,
            &user_id,
            req.rating,
            non_empty(req.comment),
            &now_timestamp(),
        )
        .await?;

    let (status, message) = if upserted.created {
        (StatusCode::CREATED, "Review added successfully")
    } else {
        (StatusCode::OK, "Review updated successfully")
    };
    Ok((status, MessageResponse::new(message, upserted.review)))
}

/// Handler for GET /api/v1/users/:id/reviews
pub async fn list_user_reviews(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse> {
    if state.user_repo.find_by_id(&user_id).await?.is_none() {
        return Err(LeafError::NotFound(format!("User {} not found", user_id)));
    }

    let items = state.user_review_repo.list_for_user(&user_id).await?;
    let stats = state.user_review_repo.stats(&user_id).await?;

    Ok(Json(ReviewListResponse {
        items,
        pagination: None,
        average_rating: stats.average.map(round_one_decimal),
        total: stats.total,
    }))
}
