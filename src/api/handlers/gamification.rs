use super::AppState;
use crate::api::models::{
    AchievementsResponse, ActivateRequest, LeaderboardEntry, MessageResponse, PageQuery,
    Paginated, PurchaseRequest, RanksResponse, UserAchievementsResponse,
};
use crate::auth::middleware::AuthUser;
use crate::core::error::{LeafError, Result};
use crate::core::profiles::ProfileUpdate;
use crate::core::ranks::{rank_for, rank_info, RANKS};
use crate::core::utils::now_timestamp;
use crate::db::repository::Repository;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;

/// Handler for GET /api/v1/achievements
pub async fn list_achievements(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse> {
    let achievements = state.achievements.progress_for(&user.id).await?;
    let unlocked = achievements.iter().filter(|a| a.unlocked).count();

    Ok(Json(AchievementsResponse {
        total: achievements.len(),
        unlocked,
        achievements,
    }))
}

/// Handler for GET /api/v1/achievements/:id
pub async fn get_achievement(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: AuthUser,
) -> Result<impl IntoResponse> {
    state
        .achievements
        .progress_for(&user.id)
        .await?
        .into_iter()
        .find(|a| a.achievement.id == id)
        .map(Json)
        .ok_or_else(|| LeafError::NotFound(format!("Achievement {} not found", id)))
}

/// Handler for GET /api/v1/users/:id/achievements
pub async fn list_user_achievements(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse> {
    if state.user_repo.find_by_id(&user_id).await?.is_none() {
        return Err(LeafError::NotFound(format!("User {} not found", user_id)));
    }

    Ok(Json(UserAchievementsResponse {
        achievements: state.achievement_repo.unlocked_for_user(&user_id).await?,
        total_points: state.points_repo.total_for(&user_id).await?,
        user_id,
    }))
}

/// Handler for POST /api/v1/achievements/check
pub async fn check_achievements(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse> {
    let awarded = state.achievements.check_and_award(&user.id).await?;
    let message = match awarded.len() {
        0 => "No new achievements".to_string(),
        n => format!("Unlocked {} new achievement(s)", n),
    };
    Ok(MessageResponse::new(message, awarded))
}

/// Handler for POST /api/v1/achievements/seen
pub async fn mark_achievements_seen(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse> {
    let updated = state.achievement_repo.mark_seen(&user.id).await?;
    Ok(MessageResponse::new("Achievements marked as seen", json!({ "updated": updated })))
}

/// Handler for GET /api/v1/ranks
pub async fn list_ranks(State(state): State<AppState>, user: AuthUser) -> Result<impl IntoResponse> {
    let points = state.points_repo.total_for(&user.id).await?;
    Ok(Json(RanksResponse {
        ranks: RANKS.to_vec(),
        current: rank_info(points),
    }))
}

/// Handler for GET /api/v1/leaderboard
pub async fn leaderboard(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let entries: Vec<LeaderboardEntry> = state
        .points_repo
        .leaderboard(state.config.gamification.leaderboard_size)
        .await?
        .into_iter()
        .enumerate()
        .map(|(i, user)| LeaderboardEntry {
            position: i + 1,
            rank: rank_for(user.total_points),
            user,
        })
        .collect();
    Ok(Json(entries))
}

/// Handler for GET /api/v1/points/history
pub async fn points_history(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
    user: AuthUser,
) -> Result<impl IntoResponse> {
    let page = query.request(20);
    let (items, total) = state.points_repo.history(&user.id, page).await?;
    Ok(Json(Paginated::new(items, page, total)))
}

/// Handler for GET /api/v1/store
pub async fn store_overview(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse> {
    Ok(Json(state.store.overview(&user.id).await?))
}

/// Handler for POST /api/v1/store/purchase
pub async fn purchase_power_up(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<PurchaseRequest>,
) -> Result<impl IntoResponse> {
    let receipt = state.store.purchase(&user.id, &req.power_up_id).await?;
    let message = format!("Purchased {}", receipt.power_up.name);
    Ok((StatusCode::CREATED, MessageResponse::new(message, receipt)))
}

/// Handler for POST /api/v1/store/activate
pub async fn activate_power_up(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ActivateRequest>,
) -> Result<impl IntoResponse> {
    let activation = state.store.activate(&user.id, &req.user_power_up_id).await?;
    let message = activation.message.clone();
    Ok(MessageResponse::new(message, activation))
}

/// Handler for GET /api/v1/profile
pub async fn get_profile(State(state): State<AppState>, user: AuthUser) -> Result<impl IntoResponse> {
    let profile = state.profile_repo.get(&user.id, &now_timestamp()).await?;
    let points = state.points_repo.total_for(&user.id).await?;
    let costs = &state.config.gamification;

    Ok(Json(json!({
        "profile": profile,
        "points": points,
        "costs": {
            "banner_style": costs.banner_cost,
            "custom_title": costs.title_cost,
            "title_color": costs.title_color_cost,
            "background_style": costs.background_cost,
        },
    })))
}

/// Handler for PUT /api/v1/profile
pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(update): Json<ProfileUpdate>,
) -> Result<impl IntoResponse> {
    let receipt = state.profiles.update(&user.id, update).await?;
    let message = match receipt.spent {
        0 => "Profile updated".to_string(),
        spent => format!("Profile updated for {} points", spent),
    };
    Ok(MessageResponse::new(message, receipt))
}
