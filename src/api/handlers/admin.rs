use super::AppState;
use crate::api::models::{MessageResponse, SeedResult};
use crate::auth::middleware::AdminUser;
use crate::core::error::Result;
use crate::core::seed;
use axum::{extract::State, response::IntoResponse};

/// Handler for POST /api/v1/admin/seed/books
pub async fn seed_books(State(state): State<AppState>, admin: AdminUser) -> Result<impl IntoResponse> {
    let inserted = seed::seed_sample_books(&state.db).await?;
    tracing::info!(user_id = %admin.0.id, inserted, "Sample books seeded");
    Ok(MessageResponse::new(
        format!("Seeded {} sample book(s)", inserted),
        SeedResult { inserted },
    ))
}

/// Handler for POST /api/v1/admin/seed/achievements
pub async fn seed_achievements(
    State(state): State<AppState>,
    admin: AdminUser,
) -> Result<impl IntoResponse> {
    let inserted = seed::seed_achievements(&state.db).await?;
    tracing::info!(user_id = %admin.0.id, inserted, "Achievements seeded");
    Ok(MessageResponse::new(
        format!("Seeded {} achievement(s)", inserted),
        SeedResult { inserted },
    ))
}

/// Handler for POST /api/v1/admin/seed/powerups
pub async fn seed_power_ups(
    State(state): State<AppState>,
    admin: AdminUser,
) -> Result<impl IntoResponse> {
    let inserted = seed::seed_power_ups(&state.db).await?;
    tracing::info!(user_id = %admin.0.id, inserted, "Power-ups seeded");
    Ok(MessageResponse::new(
        format!("Seeded {} power-up(s)", inserted),
        SeedResult { inserted },
    ))
}

/// Handler for POST /api/v1/admin/leeches/process
pub async fn process_leeches(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<impl IntoResponse> {
    let report = state.leeches.process_active_leeches().await?;
    Ok(MessageResponse::new("Leech pass finished", report))
}
