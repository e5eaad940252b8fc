use crate::core::error::{LeafError, Result};
use crate::db::manager::DatabaseManager;
use crate::db::models::UserProfile;
use rusqlite::{Connection, OptionalExtension};
use std::sync::Arc;

pub fn find_profile(conn: &Connection, user_id: &str) -> Result<Option<UserProfile>> {
    conn.query_row(
        "SELECT user_id, banner_style, custom_title, title_color, background_style, \
         background_overlay, updated_at FROM user_profiles WHERE user_id = ?",
        [user_id],
        |row| {
            Ok(UserProfile {
                user_id: row.get(0)?,
                banner_style: row.get(1)?,
                custom_title: row.get(2)?,
                title_color: row.get(3)?,
                background_style: row.get(4)?,
                background_overlay: row.get(5)?,
                updated_at: row.get(6)?,
            })
        },
    )
    .optional()
    .map_err(LeafError::DatabaseError)
}

pub fn upsert_profile(conn: &Connection, profile: &UserProfile) -> Result<()> {
    conn.execute(
        "INSERT INTO user_profiles (user_id, banner_style, custom_title, title_color, \
         background_style, background_overlay, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(user_id) DO UPDATE SET banner_style = excluded.banner_style, \
         custom_title = excluded.custom_title, title_color = excluded.title_color, \
         background_style = excluded.background_style, \
         background_overlay = excluded.background_overlay, updated_at = excluded.updated_at",
        rusqlite::params![
            &profile.user_id,
            &profile.banner_style,
            &profile.custom_title,
            &profile.title_color,
            &profile.background_style,
            profile.background_overlay,
            &profile.updated_at,
        ],
    )
    .map_err(LeafError::DatabaseError)?;
    Ok(())
}

/// Profile customizations
pub struct ProfileRepository {
    db: Arc<DatabaseManager>,
}

impl ProfileRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    /// The stored profile, or the defaults when the user never customized it
    pub async fn get(&self, user_id: &str, now: &str) -> Result<UserProfile> {
        let user_id = user_id.to_string();
        let now = now.to_string();
        self.db
            .execute(move |conn| {
                Ok(find_profile(conn, &user_id)?
                    .unwrap_or_else(|| UserProfile::default_for(&user_id, &now)))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support::{db, insert_user};

    #[tokio::test]
    async fn test_defaults_then_upsert() {
        let db = db();
        let repo = ProfileRepository::new(db.clone());
        insert_user(&db, "u1", "alice").await;

        let now = "2030-01-01T00:00:00Z";
        let mut profile = repo.get("u1", now).await.unwrap();
        assert_eq!(profile, UserProfile::default_for("u1", now));

        profile.custom_title = Some("Night Reader".into());
        profile.title_color = "#ff0000".into();
        let saved = profile.clone();
        db.execute(move |conn| upsert_profile(conn, &saved)).await.unwrap();
        assert_eq!(repo.get("u1", now).await.unwrap(), profile);

        profile.background_overlay = false;
        let saved = profile.clone();
        db.execute(move |conn| upsert_profile(conn, &saved)).await.unwrap();
        assert!(!repo.get("u1", now).await.unwrap().background_overlay);
    }
}
