//! Authentication API handlers

use crate::api::handlers::AppState;
use crate::api::models::MessageResponse;
use crate::auth::jwt::generate_token;
use crate::auth::middleware::AuthUser;
use crate::auth::models::{
    non_empty, validate_email, AuthResponse, LoginRequest, RegisterRequest, UpdateUserRequest,
    UserInfo,
};
use crate::auth::password::{hash_password, validate_password, verify_password};
use crate::core::error::{LeafError, Result};
use crate::core::utils::now_timestamp;
use crate::db::models::User;
use crate::db::repository::Repository;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use uuid::Uuid;

fn issue(state: &AppState, user: &User) -> Result<AuthResponse> {
    let token = generate_token(
        &user.id,
        &state.jwt_secret,
        state.config.security.token_ttl_hours,
    )?;
    Ok(AuthResponse {
        token,
        user: UserInfo::from(user),
    })
}

/// Handler for POST /api/v1/auth/register - User registration
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse> {
    tracing::info!(username = %req.username, "User registration attempt");
    req.validate()?;

    // The first account administers the instance
    let user_count = state.user_repo.count().await?;
    let role = if user_count == 0 { "admin" } else { "user" };

    let user = User {
        id: Uuid::new_v4().to_string(),
        username: req.username.trim().to_string(),
        email: req.email.trim().to_lowercase(),
        password_hash: hash_password(&req.password)?,
        first_name: non_empty(req.first_name),
        last_name: non_empty(req.last_name),
        description: None,
        role: role.to_string(),
        is_active: true,
        created_at: now_timestamp(),
        last_activity: None,
    };

    state.user_repo.create(&user).await?;
    tracing::info!(
        user_id = %user.id,
        username = %user.username,
        role = %role,
        "User registered successfully"
    );

    Ok((
        StatusCode::CREATED,
        MessageResponse::new("Registration successful", issue(&state, &user)?),
    ))
}

/// Handler for POST /api/v1/auth/login - login by username or email
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    tracing::info!(login = %req.login, "Login attempt");

    let user = state
        .user_repo
        .find_by_login(req.login.trim())
        .await?
        .ok_or_else(|| LeafError::AuthenticationError("Invalid credentials".to_string()))?;

    if !verify_password(&req.password, &user.password_hash)? {
        tracing::warn!(login = %req.login, "Invalid password");
        return Err(LeafError::AuthenticationError("Invalid credentials".to_string()));
    }
    if !user.is_active {
        return Err(LeafError::AuthenticationError("Account is disabled".to_string()));
    }

    tracing::info!(user_id = %user.id, username = %user.username, "Login successful");
    Ok(Json(issue(&state, &user)?))
}

/// Handler for GET /api/v1/me - Get current user info
pub async fn get_me(user: AuthUser) -> Json<UserInfo> {
    Json(UserInfo::from(&*user))
}

/// Handler for PUT /api/v1/me - Update current user info
pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(mut user): AuthUser,
    Json(req): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse> {
    tracing::info!(user_id = %user.id, "Updating current user info");

    if req.first_name.is_some() {
        user.first_name = non_empty(req.first_name);
    }
    if req.last_name.is_some() {
        user.last_name = non_empty(req.last_name);
    }
    if req.description.is_some() {
        user.description = non_empty(req.description);
    }
    if let Some(email) = non_empty(req.email) {
        validate_email(&email)?;
        user.email = email.to_lowercase();
    }
    if let Some(password) = req.password.filter(|p| !p.is_empty()) {
        validate_password(&password)?;
        user.password_hash = hash_password(&password)?;
    }

    state.user_repo.update(&user).await?;
    tracing::info!(user_id = %user.id, "User info updated successfully");

    Ok(MessageResponse::new("Profile updated", UserInfo::from(&user)))
}
