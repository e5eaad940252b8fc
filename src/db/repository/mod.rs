//! Repository pattern implementation for data access layer
//!
//! Each entity family has a repository struct with async methods that run on the
//! blocking pool. Multi-table workflows compose the synchronous `&Connection`
//! helpers exported next to them inside a single `DatabaseManager::transaction`.

use crate::core::error::Result;
use async_trait::async_trait;

pub mod achievements;
pub mod books;
pub mod lending;
pub mod points;
pub mod profiles;
pub mod reviews;
pub mod social;
pub mod store;
pub mod users;

pub use achievements::AchievementRepository;
pub use books::{BookFilter, BookRepository};
pub use lending::BorrowRepository;
pub use points::PointsRepository;
pub use profiles::ProfileRepository;
pub use reviews::{ReviewRepository, UserReviewRepository};
pub use social::{DiscussionRepository, FollowRepository, MessageRepository, NotificationRepository};
pub use store::PowerUpRepository;
pub use users::UserRepository;

/// Generic repository trait for CRUD operations
#[async_trait]
pub trait Repository<T>: Send + Sync {
    /// Find an entity by its ID
    async fn find_by_id(&self, id: &str) -> Result<Option<T>>;

    /// Find all entities
    async fn find_all(&self) -> Result<Vec<T>>;

    /// Create a new entity
    async fn create(&self, entity: &T) -> Result<()>;

    /// Update an existing entity
    async fn update(&self, entity: &T) -> Result<()>;

    /// Delete an entity by its ID
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern
pub(crate) fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Fixtures shared by repository and service tests

    use crate::core::utils::now_timestamp;
    use crate::db::manager::DatabaseManager;
    use crate::db::models::{Book, User};
    use crate::db::repository::{BookRepository, Repository, UserRepository};
    use std::sync::Arc;

    pub fn db() -> Arc<DatabaseManager> {
        Arc::new(DatabaseManager::new_in_memory().unwrap())
    }

    pub fn user_fixture(id: &str, username: &str) -> User {
        User {
            id: id.to_string(),
            username: username.to_string(),
            email: format!("{}@leaf.test", username),
            password_hash: "hash".to_string(),
            first_name: None,
            last_name: None,
            description: None,
            role: "user".to_string(),
            is_active: true,
            created_at: now_timestamp(),
            last_activity: None,
        }
    }

    pub fn book_fixture(id: &str, title: &str, posted_by: Option<&str>) -> Book {
        Book {
            id: id.to_string(),
            title: title.to_string(),
            author: "Some Author".to_string(),
            category: "Fiction".to_string(),
            isbn: format!("isbn-{}", id),
            description: Some(format!("About {}", title)),
            cover_url: None,
            publication_year: Some(2001),
            pages: Some(200),
            available: true,
            posted_by: posted_by.map(str::to_string),
            created_at: now_timestamp(),
        }
    }

    pub async fn insert_user(db: &Arc<DatabaseManager>, id: &str, username: &str) -> User {
        let user = user_fixture(id, username);
        UserRepository::new(db.clone()).create(&user).await.unwrap();
        user
    }

    pub async fn insert_book(
        db: &Arc<DatabaseManager>,
        id: &str,
        title: &str,
        posted_by: Option<&str>,
    ) -> Book {
        let book = book_fixture(id, title, posted_by);
        BookRepository::new(db.clone()).create(&book).await.unwrap();
        book
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(super::like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
