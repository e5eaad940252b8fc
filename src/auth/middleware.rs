//! Authentication middleware

use crate::api::handlers::AppState;
use crate::auth::jwt::validate_token;
use crate::core::error::{LeafError, Result};
use crate::core::utils::now_timestamp;
use crate::db::models::User;
use crate::db::repository::Repository;
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::ops::Deref;

/// The authenticated account, stored in request extensions
#[derive(Clone, Debug)]
pub struct AuthUser(pub User);

impl Deref for AuthUser {
    type Target = User;

    fn deref(&self) -> &User {
        &self.0
    }
}

/// An authenticated account with the admin role
#[derive(Clone, Debug)]
pub struct AdminUser(pub User);

/// Bearer header first, then the `token` query parameter
fn extract_token(request: &Request) -> Option<String> {
    let from_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string());

    from_header.or_else(|| {
        request.uri().query().and_then(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .find(|(k, _)| k == "token")
                .map(|(_, v)| v.to_string())
        })
    })
}

async fn resolve_user(state: &AppState, token: Option<String>) -> Result<User> {
    let token = token
        .ok_or_else(|| LeafError::AuthenticationError("Missing authentication token".to_string()))?;
    let claims = validate_token(&token, &state.jwt_secret)?;

    let mut user = state
        .user_repo
        .find_by_id(&claims.user_id)
        .await?
        .ok_or_else(|| LeafError::AuthenticationError("User not found".to_string()))?;
    if !user.is_active {
        return Err(LeafError::AuthenticationError("Account is disabled".to_string()));
    }

    let now = now_timestamp();
    state.user_repo.touch_activity(&user.id, &now).await?;
    user.last_activity = Some(now);
    Ok(user)
}

/// Authentication middleware: validates the token, loads the active account and
/// refreshes its last activity
pub async fn authenticate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let token = extract_token(&request);
    match resolve_user(&state, token).await {
        Ok(user) => {
            request.extensions_mut().insert(AuthUser(user));
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = LeafError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| LeafError::AuthenticationError("User not authenticated".to_string()))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = LeafError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(LeafError::PermissionDenied("Admin access required".to_string()));
        }
        Ok(AdminUser(user))
    }
}
