use super::AppState;
use crate::api::models::{
    ApproveRequest, BorrowRequest, DashboardResponse, LoanView, MessageResponse, RejectRequest,
};
use crate::auth::middleware::AuthUser;
use crate::core::error::{LeafError, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;

/// Handler for POST /api/v1/books/:id/borrow
pub async fn request_borrow(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
    user: AuthUser,
    body: Option<Json<BorrowRequest>>,
) -> Result<impl IntoResponse> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let record = state
        .lending
        .request_borrow(&book_id, &user, req.proposed_due_date.as_deref())
        .await?;

    Ok((
        StatusCode::CREATED,
        MessageResponse::new("Borrow request sent to the book owner", record),
    ))
}

/// Handler for POST /api/v1/books/:id/borrow/approve
pub async fn approve_borrow(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
    user: AuthUser,
    Json(req): Json<ApproveRequest>,
) -> Result<impl IntoResponse> {
    let approval = state
        .lending
        .approve(&book_id, &user, &req.borrower_id, req.agreed_due_date.as_deref())
        .await?;

    Ok(MessageResponse::new("Borrow request approved", approval))
}

/// Handler for POST /api/v1/books/:id/borrow/reject
pub async fn reject_borrow(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
    user: AuthUser,
    Json(req): Json<RejectRequest>,
) -> Result<impl IntoResponse> {
    state.lending.reject(&book_id, &user, &req.borrower_id).await?;
    Ok(MessageResponse::new("Borrow request declined", ()))
}

/// Handler for POST /api/v1/books/:id/borrow/cancel
pub async fn cancel_borrow(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
    user: AuthUser,
) -> Result<impl IntoResponse> {
    state.lending.cancel(&book_id, &user).await?;
    Ok(MessageResponse::new("Borrow request cancelled", ()))
}

/// Handler for POST /api/v1/books/:id/return
pub async fn return_book(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
    user: AuthUser,
) -> Result<impl IntoResponse> {
    let record = state.lending.return_book(&book_id, &user).await?;
    Ok(MessageResponse::new("Book returned successfully", record))
}

/// Handler for POST /api/v1/notifications/:id/borrow-request/:action
pub async fn respond_to_borrow_request(
    State(state): State<AppState>,
    Path((notification_id, action)): Path<(String, String)>,
    user: AuthUser,
) -> Result<impl IntoResponse> {
    let accept = match action.as_str() {
        "accept" => true,
        "decline" => false,
        other => {
            return Err(LeafError::InvalidRequest(format!(
                "Unknown action '{}', expected accept or decline",
                other
            )))
        }
    };

    let approval = state
        .lending
        .respond_to_notification(&notification_id, &user, accept)
        .await?;

    let message = if accept {
        "Borrow request approved"
    } else {
        "Borrow request declined"
    };
    Ok(MessageResponse::new(message, approval))
}

/// Handler for GET /api/v1/borrowed-books
pub async fn list_borrowed_books(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse> {
    let now = Utc::now();
    let loans: Vec<LoanView> = state
        .borrow_repo
        .active_loans_for_user(&user.id)
        .await?
        .into_iter()
        .map(|details| LoanView::new(details, now))
        .collect();

    Ok(Json(loans))
}

/// Handler for GET /api/v1/dashboard
pub async fn dashboard(State(state): State<AppState>, user: AuthUser) -> Result<impl IntoResponse> {
    let now = Utc::now();
    let borrowed_books = state
        .borrow_repo
        .active_loans_for_user(&user.id)
        .await?
        .into_iter()
        .map(|details| LoanView::new(details, now))
        .collect();

    Ok(Json(DashboardResponse {
        borrowed_books,
        posted_books: state.book_repo.find_by_poster(&user.id).await?,
        pending_requests: state.borrow_repo.outgoing_pending(&user.id).await?,
        incoming_requests: state.borrow_repo.incoming_requests(&user.id).await?,
    }))
}
