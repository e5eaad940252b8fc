use crate::core::error::{LeafError, Result};
use crate::db::manager::DatabaseManager;
use crate::db::models::Achievement;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

const ACHIEVEMENT_COLUMNS: &str = "id, name, description, category, points, rule, \
     requirement_value, icon, color, is_active, created_at";

fn map_achievement_at(row: &Row, o: usize) -> rusqlite::Result<Achievement> {
    Ok(Achievement {
        id: row.get(o)?,
        name: row.get(o + 1)?,
        description: row.get(o + 2)?,
        category: row.get(o + 3)?,
        points: row.get(o + 4)?,
        rule: row.get(o + 5)?,
        requirement_value: row.get(o + 6)?,
        icon: row.get(o + 7)?,
        color: row.get(o + 8)?,
        is_active: row.get(o + 9)?,
        created_at: row.get(o + 10)?,
    })
}

fn map_achievement(row: &Row) -> rusqlite::Result<Achievement> {
    map_achievement_at(row, 0)
}

/// An achievement a user has unlocked
#[derive(Debug, Clone, Serialize)]
pub struct UnlockedAchievement {
    #[serde(flatten)]
    pub achievement: Achievement,
    pub points_awarded: i64,
    pub unlocked_at: String,
    pub is_seen: bool,
}

/// Active achievements in display order
pub fn active_catalog(conn: &Connection) -> Result<Vec<Achievement>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM achievements WHERE is_active = 1 \
             ORDER BY category, requirement_value, name",
            ACHIEVEMENT_COLUMNS
        ))
        .map_err(LeafError::DatabaseError)?;
    let achievements = stmt
        .query_map([], map_achievement)
        .map_err(LeafError::DatabaseError)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(LeafError::DatabaseError)?;
    Ok(achievements)
}

pub fn unlocked_ids(conn: &Connection, user_id: &str) -> Result<HashSet<String>> {
    let mut stmt = conn
        .prepare("SELECT achievement_id FROM user_achievements WHERE user_id = ?")
        .map_err(LeafError::DatabaseError)?;
    let ids = stmt
        .query_map([user_id], |row| row.get(0))
        .map_err(LeafError::DatabaseError)?
        .collect::<std::result::Result<HashSet<String>, _>>()
        .map_err(LeafError::DatabaseError)?;
    Ok(ids)
}

/// Record an unlock; returns false if the user already had it
pub fn insert_unlock(
    conn: &Connection,
    user_id: &str,
    achievement_id: &str,
    points_awarded: i64,
    now: &str,
) -> Result<bool> {
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO user_achievements \
             (id, user_id, achievement_id, points_awarded, unlocked_at, is_seen) \
             VALUES (?, ?, ?, ?, ?, 0)",
            rusqlite::params![
                Uuid::new_v4().to_string(),
                user_id,
                achievement_id,
                points_awarded,
                now
            ],
        )
        .map_err(LeafError::DatabaseError)?;
    Ok(inserted > 0)
}

/// Achievement catalog and unlock records
pub struct AchievementRepository {
    db: Arc<DatabaseManager>,
}

impl AchievementRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    pub async fn find_all_active(&self) -> Result<Vec<Achievement>> {
        self.db.execute(active_catalog).await
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Achievement>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                conn.query_row(
                    &format!("SELECT {} FROM achievements WHERE id = ?", ACHIEVEMENT_COLUMNS),
                    [&id],
                    map_achievement,
                )
                .optional()
                .map_err(LeafError::DatabaseError)
            })
            .await
    }

    /// Insert unless an achievement with the same name exists; returns whether it was added
    pub async fn create(&self, achievement: &Achievement) -> Result<bool> {
        let a = achievement.clone();
        self.db
            .execute(move |conn| {
                let inserted = conn
                    .execute(
                        &format!(
                            "INSERT OR IGNORE INTO achievements ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                            ACHIEVEMENT_COLUMNS
                        ),
                        rusqlite::params![
                            &a.id,
                            &a.name,
                            &a.description,
                            a.category,
                            a.points,
                            a.rule,
                            a.requirement_value,
                            &a.icon,
                            &a.color,
                            a.is_active,
                            &a.created_at,
                        ],
                    )
                    .map_err(LeafError::DatabaseError)?;
                Ok(inserted > 0)
            })
            .await
    }

    pub async fn count(&self) -> Result<i64> {
        self.db
            .execute(|conn| {
                conn.query_row("SELECT COUNT(*) FROM achievements", [], |row| row.get(0))
                    .map_err(LeafError::DatabaseError)
            })
            .await
    }

    /// Unlocks of a user, most recent first
    pub async fn unlocked_for_user(&self, user_id: &str) -> Result<Vec<UnlockedAchievement>> {
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                let columns = ACHIEVEMENT_COLUMNS
                    .split(", ")
                    .map(|c| format!("a.{}", c))
                    .collect::<Vec<_>>()
                    .join(", ");
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {}, ua.points_awarded, ua.unlocked_at, ua.is_seen \
                         FROM user_achievements ua JOIN achievements a ON a.id = ua.achievement_id \
                         WHERE ua.user_id = ? ORDER BY ua.unlocked_at DESC, a.name",
                        columns
                    ))
                    .map_err(LeafError::DatabaseError)?;
                let unlocked = stmt
                    .query_map([&user_id], |row| {
                        Ok(UnlockedAchievement {
                            achievement: map_achievement_at(row, 0)?,
                            points_awarded: row.get(11)?,
                            unlocked_at: row.get(12)?,
                            is_seen: row.get(13)?,
                        })
                    })
                    .map_err(LeafError::DatabaseError)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(LeafError::DatabaseError)?;
                Ok(unlocked)
            })
            .await
    }

    pub async fn unlocked_ids(&self, user_id: &str) -> Result<HashSet<String>> {
        let user_id = user_id.to_string();
        self.db.execute(move |conn| unlocked_ids(conn, &user_id)).await
    }

    /// Mark every unseen unlock of the user as seen
    pub async fn mark_seen(&self, user_id: &str) -> Result<usize> {
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "UPDATE user_achievements SET is_seen = 1 WHERE user_id = ? AND is_seen = 0",
                    [&user_id],
                )
                .map_err(LeafError::DatabaseError)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{AchievementCategory, AchievementRule};
    use crate::db::repository::test_support::{db, insert_user};

    fn achievement(id: &str, name: &str) -> Achievement {
        Achievement {
            id: id.into(),
            name: name.into(),
            description: "d".into(),
            category: AchievementCategory::Books,
            points: 10,
            rule: AchievementRule::BooksPosted,
            requirement_value: 1,
            icon: "fa-book".into(),
            color: "#ffd700".into(),
            is_active: true,
            created_at: "2030-01-01T00:00:00Z".into(),
        }
    }

    #[tokio::test]
    async fn test_create_is_unique_by_name() {
        let db = db();
        let repo = AchievementRepository::new(db.clone());
        assert!(repo.create(&achievement("a1", "First Book")).await.unwrap());
        assert!(!repo.create(&achievement("a2", "First Book")).await.unwrap());
        assert_eq!(repo.count().await.unwrap(), 1);

        let found = repo.find_by_id("a1").await.unwrap().unwrap();
        assert_eq!(found.rule, AchievementRule::BooksPosted);
    }

    #[tokio::test]
    async fn test_unlock_once_and_mark_seen() {
        let db = db();
        let repo = AchievementRepository::new(db.clone());
        insert_user(&db, "u1", "alice").await;
        repo.create(&achievement("a1", "First Book")).await.unwrap();

        let now = "2030-01-01T00:00:00Z";
        assert!(db.execute(move |conn| insert_unlock(conn, "u1", "a1", 10, now)).await.unwrap());
        assert!(!db.execute(move |conn| insert_unlock(conn, "u1", "a1", 10, now)).await.unwrap());

        let unlocked = repo.unlocked_for_user("u1").await.unwrap();
        assert_eq!(unlocked.len(), 1);
        assert!(!unlocked[0].is_seen);
        assert!(repo.unlocked_ids("u1").await.unwrap().contains("a1"));

        assert_eq!(repo.mark_seen("u1").await.unwrap(), 1);
        assert!(repo.unlocked_for_user("u1").await.unwrap()[0].is_seen);
    }
}
