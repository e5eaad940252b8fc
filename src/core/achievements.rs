//! Achievement engine
//!
//! Evaluates every active achievement rule against a user's activity, records new
//! unlocks in the points ledger and tells the user about them. Awarding is idempotent:
//! an achievement already held is never evaluated again.

use crate::core::error::{LeafError, Result};
use crate::core::utils::{format_timestamp, parse_timestamp};
use crate::db::manager::DatabaseManager;
use crate::db::models::{notification_types, Achievement, AchievementRule, PointKind, User};
use crate::db::repository::{achievements, books, lending, points, reviews, social, store, users};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// An achievement unlocked by the current check
#[derive(Debug, Clone, Serialize)]
pub struct AwardedAchievement {
    #[serde(flatten)]
    pub achievement: Achievement,
    pub points_awarded: i64,
}

/// Catalog entry seen from one user's perspective
#[derive(Debug, Clone, Serialize)]
pub struct AchievementProgress {
    #[serde(flatten)]
    pub achievement: Achievement,
    pub unlocked: bool,
    pub progress: i64,
    pub progress_percent: f64,
}

/// Whether `current` satisfies the rule
pub fn is_met(rule: AchievementRule, current: i64, requirement: i64) -> bool {
    match rule {
        // `current` counts the users who signed up earlier
        AchievementRule::EarlyAdopter => current < requirement,
        _ => current >= requirement,
    }
}

/// Progress towards the requirement, capped at the requirement
pub fn progress(rule: AchievementRule, current: i64, requirement: i64) -> i64 {
    match rule {
        AchievementRule::EarlyAdopter => {
            if is_met(rule, current, requirement) {
                requirement
            } else {
                0
            }
        }
        _ => current.clamp(0, requirement),
    }
}

/// Per-user rule metrics, each computed at most once
struct Metrics<'a> {
    conn: &'a Connection,
    user: &'a User,
    now: DateTime<Utc>,
    cache: HashMap<AchievementRule, i64>,
}

impl<'a> Metrics<'a> {
    fn new(conn: &'a Connection, user: &'a User, now: DateTime<Utc>) -> Self {
        Self {
            conn,
            user,
            now,
            cache: HashMap::new(),
        }
    }

    fn get(&mut self, rule: AchievementRule) -> Result<i64> {
        if let Some(value) = self.cache.get(&rule) {
            return Ok(*value);
        }

        let user_id = self.user.id.as_str();
        let value = match rule {
            AchievementRule::BooksPosted => books::count_posted_by(self.conn, user_id)?,
            AchievementRule::ReviewsWritten => reviews::count_by_user(self.conn, user_id)?,
            AchievementRule::MessagesSent => social::count_sent(self.conn, user_id)?,
            AchievementRule::BooksLent => lending::count_lent_by_owner(self.conn, user_id)?,
            AchievementRule::EarlyAdopter => {
                users::count_created_before(self.conn, &self.user.created_at)?
            }
            AchievementRule::DaysActive => {
                let joined = parse_timestamp(&self.user.created_at)?;
                (self.now - joined).num_days().max(0)
            }
        };

        self.cache.insert(rule, value);
        Ok(value)
    }
}

/// Award every achievement the user now qualifies for.
///
/// Runs on the caller's connection so it can share a transaction with the action
/// that triggered it.
pub fn award_pending(
    conn: &Connection,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<Vec<AwardedAchievement>> {
    let user = users::find_user(conn, user_id)?
        .ok_or_else(|| LeafError::NotFound(format!("User {} not found", user_id)))?;

    let held = achievements::unlocked_ids(conn, user_id)?;
    let now_str = format_timestamp(now);
    let multiplier = store::points_multiplier(conn, user_id, &now_str)?;
    let mut metrics = Metrics::new(conn, &user, now);
    let mut awarded = Vec::new();

    for achievement in achievements::active_catalog(conn)? {
        if held.contains(&achievement.id) {
            continue;
        }

        let current = metrics.get(achievement.rule)?;
        if !is_met(achievement.rule, current, achievement.requirement_value) {
            continue;
        }

        let points_awarded = (achievement.points as f64 * multiplier).round() as i64;
        if !achievements::insert_unlock(conn, user_id, &achievement.id, points_awarded, &now_str)? {
            continue;
        }

        points::insert_transaction(
            conn,
            user_id,
            points_awarded,
            PointKind::Achievement,
            &format!("Unlocked {}", achievement.name),
            Some(&achievement.id),
            &now_str,
        )?;

        social::insert_notification(
            conn,
            social::NewNotification {
                user_id,
                kind: notification_types::ACHIEVEMENT_UNLOCKED,
                title: "Achievement Unlocked!",
                message: &format!(
                    "You earned \"{}\" (+{} points)",
                    achievement.name, points_awarded
                ),
                book_id: None,
                related_user_id: None,
            },
            &now_str,
        )?;

        awarded.push(AwardedAchievement {
            achievement,
            points_awarded,
        });
    }

    Ok(awarded)
}

/// Achievement checks and progress reporting
pub struct AchievementService {
    db: Arc<DatabaseManager>,
}

impl AchievementService {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    /// Evaluate and award pending achievements in a transaction of their own
    pub async fn check_and_award(&self, user_id: &str) -> Result<Vec<AwardedAchievement>> {
        let uid = user_id.to_string();
        let awarded = self
            .db
            .transaction(move |tx| award_pending(tx, &uid, Utc::now()))
            .await?;

        if !awarded.is_empty() {
            let total: i64 = awarded.iter().map(|a| a.points_awarded).sum();
            info!(
                user_id = %user_id,
                count = awarded.len(),
                points = total,
                "Awarded new achievements"
            );
        }

        Ok(awarded)
    }

    /// Active catalog with the user's unlocked flag and progress
    pub async fn progress_for(&self, user_id: &str) -> Result<Vec<AchievementProgress>> {
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                let user = users::find_user(conn, &user_id)?
                    .ok_or_else(|| LeafError::NotFound(format!("User {} not found", user_id)))?;
                let held = achievements::unlocked_ids(conn, &user_id)?;
                let mut metrics = Metrics::new(conn, &user, Utc::now());

                let mut entries = Vec::new();
                for achievement in achievements::active_catalog(conn)? {
                    let unlocked = held.contains(&achievement.id);
                    let requirement = achievement.requirement_value.max(1);
                    let current = if unlocked {
                        requirement
                    } else {
                        progress(
                            achievement.rule,
                            metrics.get(achievement.rule)?,
                            achievement.requirement_value,
                        )
                    };
                    let percent = (current as f64 / requirement as f64 * 100.0).min(100.0);

                    entries.push(AchievementProgress {
                        achievement,
                        unlocked,
                        progress: current,
                        progress_percent: (percent * 10.0).round() / 10.0,
                    });
                }
                Ok(entries)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::seed;
    use crate::db::models::BorrowedBook;
    use crate::db::repository::test_support::{db, insert_book, insert_user};
    use crate::db::repository::{NotificationRepository, PointsRepository};
    use crate::core::utils::PageRequest;

    async fn seeded() -> Arc<DatabaseManager> {
        let db = db();
        seed::seed_achievements(&db).await.unwrap();
        db
    }

    #[test]
    fn test_rule_evaluation() {
        assert!(is_met(AchievementRule::BooksPosted, 5, 5));
        assert!(!is_met(AchievementRule::BooksPosted, 4, 5));
        assert!(is_met(AchievementRule::EarlyAdopter, 99, 100));
        assert!(!is_met(AchievementRule::EarlyAdopter, 100, 100));

        assert_eq!(progress(AchievementRule::ReviewsWritten, 20, 15), 15);
        assert_eq!(progress(AchievementRule::EarlyAdopter, 3, 100), 100);
        assert_eq!(progress(AchievementRule::EarlyAdopter, 300, 100), 0);
    }

    #[tokio::test]
    async fn test_first_book_awarded_once() {
        let db = seeded().await;
        let service = AchievementService::new(db.clone());
        insert_user(&db, "u1", "alice").await;
        insert_book(&db, "b1", "Dune", Some("u1")).await;

        let awarded = service.check_and_award("u1").await.unwrap();
        let names: Vec<_> = awarded.iter().map(|a| a.achievement.name.as_str()).collect();
        assert!(names.contains(&"First Book"));
        assert!(names.contains(&"Early Adopter"));
        assert!(!names.contains(&"Book Collector"));

        // Early Adopter 15 + First Book 10
        let points = PointsRepository::new(db.clone());
        assert_eq!(points.total_for("u1").await.unwrap(), 25);

        assert!(service.check_and_award("u1").await.unwrap().is_empty());
        assert_eq!(points.total_for("u1").await.unwrap(), 25);

        let (notes, _) = NotificationRepository::new(db.clone())
            .list("u1", false, PageRequest::new(None, None, 20))
            .await
            .unwrap();
        assert_eq!(notes.len(), 2);
        assert!(notes
            .iter()
            .all(|n| n.kind == notification_types::ACHIEVEMENT_UNLOCKED));
    }

    #[tokio::test]
    async fn test_double_points_doubles_awards() {
        let db = seeded().await;
        seed::seed_power_ups(&db).await.unwrap();
        insert_user(&db, "u1", "alice").await;

        db.execute(|conn| {
            let dp: String = conn.query_row(
                "SELECT id FROM power_ups WHERE kind = 'double_points'",
                [],
                |row| row.get(0),
            )?;
            let now = Utc::now();
            store::insert_user_power_up(
                conn,
                &crate::db::models::UserPowerUp {
                    id: "o1".into(),
                    user_id: "u1".into(),
                    power_up_id: dp,
                    purchased_at: format_timestamp(now),
                    activated_at: None,
                    expires_at: None,
                    is_active: false,
                    is_consumed: false,
                    target_user_id: None,
                    leeched_points: 0,
                },
            )?;
            store::activate(
                conn,
                "o1",
                &format_timestamp(now),
                &format_timestamp(now + chrono::Duration::hours(5)),
                None,
            )
        })
        .await
        .unwrap();

        let awarded = AchievementService::new(db.clone())
            .check_and_award("u1")
            .await
            .unwrap();
        // Only Early Adopter qualifies: 15 doubled
        assert_eq!(awarded.len(), 1);
        assert_eq!(awarded[0].points_awarded, 30);
    }

    #[tokio::test]
    async fn test_books_lent_counts_agreed_loans() {
        let db = seeded().await;
        insert_user(&db, "owner", "owner").await;
        insert_user(&db, "reader", "reader").await;
        for i in 0..5 {
            let id = format!("b{}", i);
            insert_book(&db, &id, "Book", Some("owner")).await;
            db.execute(move |conn| {
                lending::insert_borrow(
                    conn,
                    &BorrowedBook {
                        id: format!("r{}", id),
                        book_id: id.clone(),
                        user_id: "reader".into(),
                        borrowed_date: "2030-01-01T00:00:00Z".into(),
                        due_date: "2030-01-15T00:00:00Z".into(),
                        agreed_due_date: None,
                        returned_date: None,
                        is_returned: false,
                        is_agreed: true,
                    },
                )
            })
            .await
            .unwrap();
        }

        let progress = AchievementService::new(db.clone())
            .progress_for("owner")
            .await
            .unwrap();
        let helper = progress
            .iter()
            .find(|p| p.achievement.name == "Community Helper")
            .unwrap();
        assert_eq!(helper.progress, 5);
        assert!(!helper.unlocked);

        let awarded = AchievementService::new(db.clone())
            .check_and_award("owner")
            .await
            .unwrap();
        assert!(awarded
            .iter()
            .any(|a| a.achievement.name == "Community Helper"));
    }
}
