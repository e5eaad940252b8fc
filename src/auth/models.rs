//! Authentication request/response models

use crate::core::error::{LeafError, Result};
use crate::db::models::User;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref EMAIL: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

pub fn validate_email(email: &str) -> Result<()> {
    if !EMAIL.is_match(email) {
        return Err(LeafError::ValidationError("Please enter a valid email address".to_string()));
    }
    Ok(())
}

/// Register request
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty()
            || self.email.trim().is_empty()
            || self.password.is_empty()
        {
            return Err(LeafError::ValidationError(
                "Username, email and password are required".to_string(),
            ));
        }
        validate_email(self.email.trim())?;
        crate::auth::password::validate_password(&self.password)
    }
}

/// Login request; `login` is a username or an email
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "username", alias = "email")]
    pub login: String,
    pub password: String,
}

/// Token plus the account it belongs to
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserInfo,
}

/// The caller's own account, without the password hash
#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub full_name: String,
    pub description: Option<String>,
    pub role: String,
    pub created_at: String,
    pub last_activity: Option<String>,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            full_name: user.full_name(),
            description: user.description.clone(),
            role: user.role.clone(),
            created_at: user.created_at.clone(),
            last_activity: user.last_activity.clone(),
        }
    }
}

/// Update user request; absent fields stay unchanged
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub description: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Empty strings clear optional text fields
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(username: &str, email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            first_name: None,
            last_name: None,
        }
    }

    #[test]
    fn test_register_validation() {
        assert!(request("alice", "alice@example.com", "secret1").validate().is_ok());
        assert!(request("", "alice@example.com", "secret1").validate().is_err());
        assert!(request("alice", "not-an-email", "secret1").validate().is_err());
        assert!(request("alice", "alice@example.com", "short").validate().is_err());
    }

    #[test]
    fn test_login_accepts_username_alias() {
        let req: LoginRequest =
            serde_json::from_str(r#"{"username":"alice","password":"x"}"#).unwrap();
        assert_eq!(req.login, "alice");
    }
}
