use super::{like_pattern, Repository};
use crate::core::error::{LeafError, Result};
use crate::core::utils::PageRequest;
use crate::db::manager::DatabaseManager;
use crate::db::models::{User, UserSummary};
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, Row};
use std::sync::Arc;

const USER_COLUMNS: &str = "id, username, email, password_hash, first_name, last_name, \
     description, role, is_active, created_at, last_activity";

pub(crate) fn map_user(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        first_name: row.get(4)?,
        last_name: row.get(5)?,
        description: row.get(6)?,
        role: row.get(7)?,
        is_active: row.get(8)?,
        created_at: row.get(9)?,
        last_activity: row.get(10)?,
    })
}

/// Build a summary from `id, username, first_name, last_name` columns at `offset`
pub(crate) fn map_summary_at(row: &Row, offset: usize) -> rusqlite::Result<UserSummary> {
    let id: String = row.get(offset)?;
    let username: String = row.get(offset + 1)?;
    let first: Option<String> = row.get(offset + 2)?;
    let last: Option<String> = row.get(offset + 3)?;
    Ok(UserSummary {
        full_name: full_name_of(&username, first.as_deref(), last.as_deref()),
        id,
        username,
    })
}

pub(crate) fn full_name_of(username: &str, first: Option<&str>, last: Option<&str>) -> String {
    let name = [first, last]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if name.is_empty() {
        username.to_string()
    } else {
        name
    }
}

/// Load a user inside an open connection or transaction
pub fn find_user(conn: &Connection, id: &str) -> Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS),
        [id],
        map_user,
    )
    .optional()
    .map_err(LeafError::DatabaseError)
}

pub fn count_created_before(conn: &Connection, created_at: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM users WHERE created_at < ?",
        [created_at],
        |row| row.get(0),
    )
    .map_err(LeafError::DatabaseError)
}

/// Ids of active admin accounts, oldest first
pub fn admin_ids(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM users WHERE role = 'admin' AND is_active = 1 ORDER BY created_at",
    )?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(ids)
}

/// Repository for User entities
pub struct UserRepository {
    db: Arc<DatabaseManager>,
}

impl UserRepository {
    /// Create a new UserRepository
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    /// Find a user by username
    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let username = username.to_string();
        self.db
            .execute(move |conn| {
                conn.query_row(
                    &format!("SELECT {} FROM users WHERE username = ?", USER_COLUMNS),
                    [&username],
                    map_user,
                )
                .optional()
                .map_err(LeafError::DatabaseError)
            })
            .await
    }

    /// Find a user by email (case-insensitive)
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = email.to_string();
        self.db
            .execute(move |conn| {
                conn.query_row(
                    &format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS),
                    [&email],
                    map_user,
                )
                .optional()
                .map_err(LeafError::DatabaseError)
            })
            .await
    }

    /// Find a user by username or email, as typed into the login form
    pub async fn find_by_login(&self, login: &str) -> Result<Option<User>> {
        let login = login.trim().to_string();
        self.db
            .execute(move |conn| {
                conn.query_row(
                    &format!(
                        "SELECT {} FROM users WHERE username = ?1 OR email = ?1 \
                         ORDER BY username = ?1 DESC LIMIT 1",
                        USER_COLUMNS
                    ),
                    [&login],
                    map_user,
                )
                .optional()
                .map_err(LeafError::DatabaseError)
            })
            .await
    }

    /// Count total users
    pub async fn count(&self) -> Result<i64> {
        self.db
            .execute(|conn| {
                conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
                    .map_err(LeafError::DatabaseError)
            })
            .await
    }

    /// Record that the user was just seen
    pub async fn touch_activity(&self, user_id: &str, at: &str) -> Result<()> {
        let user_id = user_id.to_string();
        let at = at.to_string();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "UPDATE users SET last_activity = ? WHERE id = ?",
                    rusqlite::params![&at, &user_id],
                )
                .map_err(LeafError::DatabaseError)?;
                Ok(())
            })
            .await
    }

    /// Paginated listing with an optional username/name search
    pub async fn search(
        &self,
        search: Option<String>,
        page: PageRequest,
    ) -> Result<(Vec<User>, i64)> {
        self.db
            .execute(move |conn| {
                let (condition, params): (&str, Vec<String>) = match search {
                    Some(term) if !term.trim().is_empty() => {
                        let pattern = like_pattern(term.trim());
                        (
                            "WHERE is_active = 1 AND (username LIKE ?1 ESCAPE '\\' \
                             OR first_name LIKE ?1 ESCAPE '\\' OR last_name LIKE ?1 ESCAPE '\\')",
                            vec![pattern],
                        )
                    }
                    _ => ("WHERE is_active = 1", Vec::new()),
                };

                let total: i64 = conn
                    .query_row(
                        &format!("SELECT COUNT(*) FROM users {}", condition),
                        rusqlite::params_from_iter(params.iter()),
                        |row| row.get(0),
                    )
                    .map_err(LeafError::DatabaseError)?;

                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {} FROM users {} ORDER BY username LIMIT {} OFFSET {}",
                        USER_COLUMNS,
                        condition,
                        page.limit(),
                        page.offset()
                    ))
                    .map_err(LeafError::DatabaseError)?;
                let users = stmt
                    .query_map(rusqlite::params_from_iter(params.iter()), map_user)
                    .map_err(LeafError::DatabaseError)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(LeafError::DatabaseError)?;

                Ok((users, total))
            })
            .await
    }

    /// Number of users who signed up strictly before `created_at`
    pub async fn count_created_before(&self, created_at: &str) -> Result<i64> {
        let created_at = created_at.to_string();
        self.db
            .execute(move |conn| count_created_before(conn, &created_at))
            .await
    }
}

#[async_trait]
impl Repository<User> for UserRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        let id = id.to_string();
        self.db.execute(move |conn| find_user(conn, &id)).await
    }

    async fn find_all(&self) -> Result<Vec<User>> {
        self.db
            .execute(|conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {} FROM users ORDER BY created_at DESC",
                        USER_COLUMNS
                    ))
                    .map_err(LeafError::DatabaseError)?;

                let users = stmt
                    .query_map([], map_user)
                    .map_err(LeafError::DatabaseError)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(LeafError::DatabaseError)?;

                Ok(users)
            })
            .await
    }

    async fn create(&self, user: &User) -> Result<()> {
        let user = user.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO users (id, username, email, password_hash, first_name, last_name, \
                     description, role, is_active, created_at, last_activity) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    rusqlite::params![
                        &user.id,
                        &user.username,
                        &user.email,
                        &user.password_hash,
                        &user.first_name,
                        &user.last_name,
                        &user.description,
                        &user.role,
                        user.is_active,
                        &user.created_at,
                        &user.last_activity,
                    ],
                )
                .map_err(|e| LeafError::on_unique_violation(e, "Username or email already exists"))?;
                Ok(())
            })
            .await
    }

    async fn update(&self, user: &User) -> Result<()> {
        let user = user.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "UPDATE users SET username = ?, email = ?, password_hash = ?, first_name = ?, \
                     last_name = ?, description = ?, role = ?, is_active = ? WHERE id = ?",
                    rusqlite::params![
                        &user.username,
                        &user.email,
                        &user.password_hash,
                        &user.first_name,
                        &user.last_name,
                        &user.description,
                        &user.role,
                        user.is_active,
                        &user.id,
                    ],
                )
                .map_err(|e| LeafError::on_unique_violation(e, "Username or email already exists"))?;
                Ok(())
            })
            .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                conn.execute("DELETE FROM users WHERE id = ?", [&id])
                    .map_err(LeafError::DatabaseError)?;
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support::{db, insert_user, user_fixture};

    #[tokio::test]
    async fn test_login_by_username_or_email() {
        let db = db();
        let repo = UserRepository::new(db.clone());
        insert_user(&db, "u1", "alice").await;

        let by_name = repo.find_by_login("alice").await.unwrap().unwrap();
        assert_eq!(by_name.id, "u1");

        let by_email = repo.find_by_login("ALICE@leaf.test").await.unwrap().unwrap();
        assert_eq!(by_email.id, "u1");

        assert!(repo.find_by_login("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_is_conflict() {
        let db = db();
        let repo = UserRepository::new(db.clone());
        insert_user(&db, "u1", "alice").await;

        let mut clash = user_fixture("u2", "alice2");
        clash.email = "alice@leaf.test".to_string();
        let err = repo.create(&clash).await.unwrap_err();
        assert!(matches!(err, LeafError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_search_paginates() {
        let db = db();
        let repo = UserRepository::new(db.clone());
        for i in 0..5 {
            insert_user(&db, &format!("u{}", i), &format!("reader{}", i)).await;
        }
        insert_user(&db, "x", "writer").await;

        let (page, total) = repo
            .search(Some("reader".into()), PageRequest::new(Some(2), Some(2), 20))
            .await
            .unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].username, "reader2");
    }

    #[test]
    fn test_full_name_of() {
        assert_eq!(full_name_of("bob", Some("Bob"), Some("Ross")), "Bob Ross");
        assert_eq!(full_name_of("bob", None, None), "bob");
    }
}
