use super::AppState;
use crate::api::models::{Paginated, PublicUser, RatingSummary, UserProfileResponse, UserQuery};
use crate::auth::middleware::AuthUser;
use crate::core::error::{LeafError, Result};
use crate::core::ranks::rank_info;
use crate::core::utils::{format_timestamp, PageRequest};
use crate::db::repository::Repository;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;

/// Handler for GET /api/v1/users
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<impl IntoResponse> {
    let page = PageRequest::new(query.page, query.per_page, 20);
    let (users, total) = state.user_repo.search(query.search, page).await?;

    let now = Utc::now();
    let window = state.config.gamification.online_window_secs;
    let mut items = Vec::with_capacity(users.len());
    for user in &users {
        let points = state.points_repo.total_for(&user.id).await?;
        items.push(PublicUser::new(user, points, now, window));
    }

    Ok(Json(Paginated::new(items, page, total)))
}

/// Handler for GET /api/v1/users/:id - public profile page
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    viewer: AuthUser,
) -> Result<impl IntoResponse> {
    let user = state
        .user_repo
        .find_by_id(&id)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| LeafError::NotFound(format!("User {} not found", id)))?;

    let now = Utc::now();
    let points = state.points_repo.total_for(&id).await?;
    let (followers, following) = state.follow_repo.counts(&id).await?;

    Ok(Json(UserProfileResponse {
        user: PublicUser::new(&user, points, now, state.config.gamification.online_window_secs),
        rank_info: rank_info(points),
        books_posted: state.book_repo.count_by_poster(&id).await?,
        reviews_written: state.review_repo.count_by_user(&id).await?,
        user_rating: RatingSummary::from(state.user_review_repo.stats(&id).await?),
        followers,
        following,
        is_following: state.follow_repo.is_following(&viewer.id, &id).await?,
        profile: state.profile_repo.get(&id, &format_timestamp(now)).await?,
    }))
}
