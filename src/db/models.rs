//! Database models
//!
//! Data structures representing database tables

use crate::core::utils::{is_recent, parse_timestamp};
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declares a string-backed enum stored as TEXT
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {}: {}", stringify!($name), other)),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    };
}

text_enum!(
    /// What an achievement rule measures
    AchievementRule {
        BooksPosted => "books_posted",
        ReviewsWritten => "reviews_written",
        MessagesSent => "messages_sent",
        BooksLent => "books_lent",
        EarlyAdopter => "early_adopter",
        DaysActive => "days_active",
    }
);

text_enum!(
    /// Achievement grouping shown in the catalog
    AchievementCategory {
        Books => "books",
        Reviews => "reviews",
        Social => "social",
        Special => "special",
        Time => "time",
    }
);

text_enum!(
    /// Power-up behaviour
    PowerUpKind {
        Leech => "leech",
        DoublePoints => "double_points",
    }
);

text_enum!(
    /// Source of a points ledger entry
    PointKind {
        Achievement => "achievement",
        Purchase => "purchase",
        Leech => "leech",
        Profile => "profile",
    }
);

/// Notification `type` values
pub mod notification_types {
    pub const BORROW_REQUEST: &str = "borrow_request";
    pub const BORROW_APPROVED: &str = "borrow_approved";
    pub const BORROW_DECLINED: &str = "borrow_declined";
    pub const BOOK_RETURNED: &str = "book_returned";
    pub const PRIVATE_MESSAGE: &str = "private_message";
    pub const NEW_FOLLOWER: &str = "new_follower";
    pub const ACHIEVEMENT_UNLOCKED: &str = "achievement_unlocked";
}

/// User record in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub description: Option<String>,
    pub role: String,
    pub is_active: bool,
    pub created_at: String,
    pub last_activity: Option<String>,
}

impl User {
    /// "First Last", or the username when no name is set
    pub fn full_name(&self) -> String {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            self.username.clone()
        } else {
            parts.join(" ")
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }

    pub fn is_online(&self, now: DateTime<Utc>, window_secs: i64) -> bool {
        is_recent(self.last_activity.as_deref(), now, window_secs)
    }
}

/// Book record in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: String,
    pub category: String,
    pub isbn: String,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub publication_year: Option<i32>,
    pub pages: Option<i32>,
    pub available: bool,
    pub posted_by: Option<String>,
    pub created_at: String,
}

/// Where a borrow record is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BorrowStatus {
    Requested,
    Agreed,
    Returned,
}

/// Borrow request / loan record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BorrowedBook {
    pub id: String,
    pub book_id: String,
    pub user_id: String,
    pub borrowed_date: String,
    pub due_date: String,
    pub agreed_due_date: Option<String>,
    pub returned_date: Option<String>,
    pub is_returned: bool,
    pub is_agreed: bool,
}

impl BorrowedBook {
    /// Agreed due date when negotiated, otherwise the proposed one
    pub fn effective_due_date(&self) -> &str {
        self.agreed_due_date.as_deref().unwrap_or(&self.due_date)
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        if self.is_returned {
            return false;
        }
        parse_timestamp(self.effective_due_date())
            .map(|due| now > due)
            .unwrap_or(false)
    }

    pub fn status(&self) -> BorrowStatus {
        if self.is_returned {
            BorrowStatus::Returned
        } else if self.is_agreed {
            BorrowStatus::Agreed
        } else {
            BorrowStatus::Requested
        }
    }
}

/// Book review with the author's username
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookReview {
    pub id: String,
    pub book_id: String,
    pub user_id: String,
    pub username: String,
    pub rating: i32,
    pub comment: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Peer rating of one user by another
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserReview {
    pub id: String,
    pub reviewer_id: String,
    pub reviewer_username: String,
    pub reviewed_user_id: String,
    pub rating: i32,
    pub comment: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Public discussion message, general or attached to a book
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discussion {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub message: String,
    pub book_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateMessage {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub message: String,
    pub book_id: Option<String>,
    pub created_at: String,
    pub is_read: bool,
}

/// Summary row of a private conversation
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub partner_id: String,
    pub partner_username: String,
    pub last_message: String,
    pub last_message_at: String,
    pub unread_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub book_id: Option<String>,
    pub related_user_id: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}

/// Lightweight user reference used in follower lists and leaderboards
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub full_name: String,
}

/// Profile customization bought with points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub banner_style: String,
    pub custom_title: Option<String>,
    pub title_color: String,
    pub background_style: String,
    pub background_overlay: bool,
    pub updated_at: String,
}

impl UserProfile {
    pub fn default_for(user_id: &str, now: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            banner_style: "default".to_string(),
            custom_title: None,
            title_color: "#ffffff".to_string(),
            background_style: "default".to_string(),
            background_overlay: true,
            updated_at: now.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Achievement {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: AchievementCategory,
    pub points: i64,
    pub rule: AchievementRule,
    pub requirement_value: i64,
    pub icon: String,
    pub color: String,
    pub is_active: bool,
    pub created_at: String,
}

/// An unlocked achievement for a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAchievement {
    pub id: String,
    pub user_id: String,
    pub achievement_id: String,
    pub points_awarded: i64,
    pub unlocked_at: String,
    pub is_seen: bool,
}

/// Points ledger entry; a user's total is the sum of their entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointTransaction {
    pub id: String,
    pub user_id: String,
    pub amount: i64,
    pub kind: PointKind,
    pub description: String,
    pub reference_id: Option<String>,
    pub created_at: String,
}

/// A user with their point total, as ranked on the leaderboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPoints {
    pub user_id: String,
    pub username: String,
    pub full_name: String,
    pub total_points: i64,
    pub last_activity: Option<String>,
}

/// Store catalog entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerUp {
    pub id: String,
    pub name: String,
    pub description: String,
    pub cost: i64,
    pub kind: PowerUpKind,
    pub duration_hours: i64,
    pub effect_value: f64,
    pub icon: String,
    pub color: String,
    pub is_active: bool,
    pub created_at: String,
}

/// A power-up owned by a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPowerUp {
    pub id: String,
    pub user_id: String,
    pub power_up_id: String,
    pub purchased_at: String,
    pub activated_at: Option<String>,
    pub expires_at: Option<String>,
    pub is_active: bool,
    pub is_consumed: bool,
    pub target_user_id: Option<String>,
    pub leeched_points: i64,
}

impl UserPowerUp {
    /// Expired once `expires_at` has passed; never-activated power-ups do not expire
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at.as_deref().map(parse_timestamp) {
            Some(Ok(expires)) => now >= expires,
            Some(Err(_)) => true,
            None => false,
        }
    }

    /// Active and not yet expired
    pub fn is_running(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::utils::format_timestamp;
    use chrono::Duration;

    fn user(first: Option<&str>, last: Option<&str>) -> User {
        User {
            id: "u1".into(),
            username: "reader42".into(),
            email: "r@x.io".into(),
            password_hash: "h".into(),
            first_name: first.map(Into::into),
            last_name: last.map(Into::into),
            description: None,
            role: "user".into(),
            is_active: true,
            created_at: "2024-01-01T00:00:00Z".into(),
            last_activity: None,
        }
    }

    #[test]
    fn test_full_name_falls_back_to_username() {
        assert_eq!(user(Some("Ada"), Some("Lovelace")).full_name(), "Ada Lovelace");
        assert_eq!(user(Some("Ada"), None).full_name(), "Ada");
        assert_eq!(user(Some("  "), None).full_name(), "reader42");
        assert_eq!(user(None, None).full_name(), "reader42");
    }

    #[test]
    fn test_borrow_overdue_uses_agreed_date() {
        let now = Utc::now();
        let mut record = BorrowedBook {
            id: "r".into(),
            book_id: "b".into(),
            user_id: "u".into(),
            borrowed_date: format_timestamp(now - Duration::days(20)),
            due_date: format_timestamp(now - Duration::days(1)),
            agreed_due_date: None,
            returned_date: None,
            is_returned: false,
            is_agreed: true,
        };
        assert!(record.is_overdue(now));

        record.agreed_due_date = Some(format_timestamp(now + Duration::days(3)));
        assert!(!record.is_overdue(now));

        record.agreed_due_date = None;
        record.is_returned = true;
        assert!(!record.is_overdue(now));
        assert_eq!(record.status(), BorrowStatus::Returned);
    }

    #[test]
    fn test_power_up_expiry() {
        let now = Utc::now();
        let mut owned = UserPowerUp {
            id: "p".into(),
            user_id: "u".into(),
            power_up_id: "x".into(),
            purchased_at: format_timestamp(now),
            activated_at: None,
            expires_at: None,
            is_active: false,
            is_consumed: false,
            target_user_id: None,
            leeched_points: 0,
        };
        assert!(!owned.is_expired(now));
        assert!(!owned.is_running(now));

        owned.is_active = true;
        owned.expires_at = Some(format_timestamp(now + Duration::hours(1)));
        assert!(owned.is_running(now));
        assert!(!owned.is_running(now + Duration::hours(2)));
    }

    #[test]
    fn test_text_enum_parsing() {
        assert_eq!("leech".parse::<PowerUpKind>(), Ok(PowerUpKind::Leech));
        assert_eq!(AchievementRule::DaysActive.as_str(), "days_active");
        assert!("gold".parse::<PointKind>().is_err());
    }
}
