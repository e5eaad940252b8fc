use crate::core::achievements::AchievementProgress;
use crate::core::ranks::{Rank, RankInfo};
use crate::db::models::UserPoints;
use crate::db::repository::achievements::UnlockedAchievement;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct AchievementsResponse {
    pub achievements: Vec<AchievementProgress>,
    pub unlocked: usize,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct UserAchievementsResponse {
    pub user_id: String,
    pub achievements: Vec<UnlockedAchievement>,
    pub total_points: i64,
}

#[derive(Debug, Serialize)]
pub struct RanksResponse {
    pub ranks: Vec<Rank>,
    pub current: RankInfo,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardEntry {
    pub position: usize,
    #[serde(flatten)]
    pub user: UserPoints,
    pub rank: Rank,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub power_up_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    pub user_power_up_id: String,
}

#[derive(Debug, Serialize)]
pub struct SeedResult {
    pub inserted: usize,
}
