use crate::core::ranks::{rank_for, Rank, RankInfo};
use crate::db::models::{User, UserProfile};
use crate::db::repository::reviews::ReviewStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// What other readers may see of an account
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub description: Option<String>,
    pub role: String,
    pub created_at: String,
    pub is_online: bool,
    pub total_points: i64,
    pub rank: Rank,
}

impl PublicUser {
    pub fn new(user: &User, total_points: i64, now: DateTime<Utc>, online_window_secs: i64) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            full_name: user.full_name(),
            description: user.description.clone(),
            role: user.role.clone(),
            created_at: user.created_at.clone(),
            is_online: user.is_online(now, online_window_secs),
            total_points,
            rank: rank_for(total_points),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RatingSummary {
    pub average: Option<f64>,
    pub total: i64,
}

impl From<ReviewStats> for RatingSummary {
    fn from(stats: ReviewStats) -> Self {
        Self {
            average: stats.average.map(round_one_decimal),
            total: stats.total,
        }
    }
}

pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Public profile page
#[derive(Debug, Serialize)]
pub struct UserProfileResponse {
    #[serde(flatten)]
    pub user: PublicUser,
    pub rank_info: RankInfo,
    pub books_posted: i64,
    pub reviews_written: i64,
    pub user_rating: RatingSummary,
    pub followers: i64,
    pub following: i64,
    pub is_following: bool,
    pub profile: UserProfile,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support::user_fixture;

    #[test]
    fn test_public_user_hides_private_fields() {
        let mut user = user_fixture("u1", "alice");
        user.first_name = Some("Alice".into());
        let public = PublicUser::new(&user, 160, Utc::now(), 300);

        let json = serde_json::to_value(&public).unwrap();
        assert!(json.get("email").is_none());
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["full_name"], "Alice");
        assert_eq!(json["rank"]["name"], "Bookworm");
        assert_eq!(json["is_online"], false);
    }

    #[test]
    fn test_rating_summary_rounds() {
        let summary = RatingSummary::from(ReviewStats {
            average: Some(7.666),
            total: 3,
        });
        assert_eq!(summary.average, Some(7.7));
    }
}
