use super::AppState;
use crate::api::models::{
    DiscussionQuery, MessageResponse, NotificationQuery, Paginated, PostMessageRequest,
};
use crate::auth::middleware::AuthUser;
use crate::core::error::{LeafError, Result};
use crate::core::utils::PageRequest;
use crate::db::repository::Repository;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;

async fn ensure_user_exists(state: &AppState, user_id: &str) -> Result<()> {
    match state.user_repo.find_by_id(user_id).await? {
        Some(_) => Ok(()),
        None => Err(LeafError::NotFound(format!("User {} not found", user_id))),
    }
}

/// Handler for GET /api/v1/discussions
pub async fn list_discussions(
    State(state): State<AppState>,
    Query(query): Query<DiscussionQuery>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.discussion_repo.recent(query.book_id).await?))
}

/// Handler for POST /api/v1/discussions
pub async fn post_discussion(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<PostMessageRequest>,
) -> Result<impl IntoResponse> {
    let discussion = state
        .social
        .post_discussion(&user, &req.message, req.book_id)
        .await?;
    Ok((StatusCode::CREATED, MessageResponse::new("Message posted", discussion)))
}

/// Handler for POST /api/v1/messages/:user_id
pub async fn send_message(
    State(state): State<AppState>,
    Path(recipient_id): Path<String>,
    user: AuthUser,
    Json(req): Json<PostMessageRequest>,
) -> Result<impl IntoResponse> {
    let sent = state
        .social
        .send_message(&user, &recipient_id, &req.message, req.book_id)
        .await?;
    Ok((StatusCode::CREATED, MessageResponse::new("Message sent", sent)))
}

/// Handler for GET /api/v1/messages/:user_id - the conversation, oldest first
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(partner_id): Path<String>,
    user: AuthUser,
) -> Result<impl IntoResponse> {
    ensure_user_exists(&state, &partner_id).await?;

    let messages = state.message_repo.conversation(&user.id, &partner_id).await?;
    state.message_repo.mark_read(&user.id, &partner_id).await?;

    Ok(Json(messages))
}

/// Handler for GET /api/v1/messages
pub async fn list_conversations(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse> {
    Ok(Json(state.message_repo.conversations(&user.id).await?))
}

/// Handler for GET /api/v1/notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<NotificationQuery>,
    user: AuthUser,
) -> Result<impl IntoResponse> {
    let page = PageRequest::new(query.page, query.per_page, 20);
    let (items, total) = state
        .notification_repo
        .list(&user.id, query.unread_only, page)
        .await?;
    Ok(Json(Paginated::new(items, page, total)))
}

/// Handler for PUT /api/v1/notifications/:id/read
pub async fn mark_notification_read(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: AuthUser,
) -> Result<impl IntoResponse> {
    let notification = state
        .notification_repo
        .find_by_id(&id)
        .await?
        .ok_or_else(|| LeafError::NotFound(format!("Notification {} not found", id)))?;
    if notification.user_id != user.id {
        return Err(LeafError::PermissionDenied(
            "This notification belongs to another user".to_string(),
        ));
    }

    state.notification_repo.mark_read(&id).await?;
    Ok(MessageResponse::new("Notification marked as read", ()))
}

/// Handler for POST /api/v1/notifications/read-all
pub async fn mark_all_notifications_read(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse> {
    let updated = state.notification_repo.mark_all_read(&user.id).await?;
    Ok(MessageResponse::new(
        "All notifications marked as read",
        json!({ "updated": updated }),
    ))
}

/// Handler for GET /api/v1/notifications/count
pub async fn unread_notification_count(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse> {
    let count = state.notification_repo.unread_count(&user.id).await?;
    Ok(Json(json!({ "count": count })))
}

/// Handler for POST /api/v1/users/:id/follow
pub async fn follow_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    user: AuthUser,
) -> Result<impl IntoResponse> {
    let created = state.social.follow(&user, &user_id).await?;
    let message = if created {
        "You are now following this user"
    } else {
        "You already follow this user"
    };
    Ok(MessageResponse::new(message, json!({ "following": true })))
}

/// Handler for DELETE /api/v1/users/:id/follow
pub async fn unfollow_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    user: AuthUser,
) -> Result<impl IntoResponse> {
    if !state.follow_repo.unfollow(&user.id, &user_id).await? {
        return Err(LeafError::NotFound("You do not follow this user".to_string()));
    }
    Ok(MessageResponse::new("Unfollowed", json!({ "following": false })))
}

/// Handler for GET /api/v1/users/:id/followers
pub async fn list_followers(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse> {
    ensure_user_exists(&state, &user_id).await?;
    Ok(Json(state.follow_repo.followers(&user_id).await?))
}

/// Handler for GET /api/v1/users/:id/following
pub async fn list_following(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse> {
    ensure_user_exists(&state, &user_id).await?;
    Ok(Json(state.follow_repo.following(&user_id).await?))
}
