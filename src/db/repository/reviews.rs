use crate::core::error::{LeafError, Result};
use crate::core::utils::PageRequest;
use crate::db::manager::DatabaseManager;
use crate::db::models::{BookReview, UserReview};
use rusqlite::{Connection, OptionalExtension, Row};
use std::sync::Arc;

const BOOK_REVIEW_SELECT: &str = "SELECT r.id, r.book_id, r.user_id, u.username, r.rating, \
     r.comment, r.created_at, r.updated_at FROM book_reviews r JOIN users u ON u.id = r.user_id";

const USER_REVIEW_SELECT: &str = "SELECT r.id, r.reviewer_id, u.username, r.reviewed_user_id, \
     r.rating, r.comment, r.created_at, r.updated_at FROM user_reviews r \
     JOIN users u ON u.id = r.reviewer_id";

fn map_book_review(row: &Row) -> rusqlite::Result<BookReview> {
    Ok(BookReview {
        id: row.get(0)?,
        book_id: row.get(1)?,
        user_id: row.get(2)?,
        username: row.get(3)?,
        rating: row.get(4)?,
        comment: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn map_user_review(row: &Row) -> rusqlite::Result<UserReview> {
    Ok(UserReview {
        id: row.get(0)?,
        reviewer_id: row.get(1)?,
        reviewer_username: row.get(2)?,
        reviewed_user_id: row.get(3)?,
        rating: row.get(4)?,
        comment: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn find_book_review(conn: &Connection, condition: &str, params: &[&str]) -> Result<Option<BookReview>> {
    conn.query_row(
        &format!("{} WHERE {}", BOOK_REVIEW_SELECT, condition),
        rusqlite::params_from_iter(params.iter()),
        map_book_review,
    )
    .optional()
    .map_err(LeafError::DatabaseError)
}

pub fn count_by_user(conn: &Connection, user_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM book_reviews WHERE user_id = ?",
        [user_id],
        |row| row.get(0),
    )
    .map_err(LeafError::DatabaseError)
}

/// Average and count over a set of ratings
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReviewStats {
    pub average: Option<f64>,
    pub total: i64,
}

/// Outcome of an upsert
#[derive(Debug, Clone)]
pub struct Upserted<T> {
    pub review: T,
    pub created: bool,
}

/// Repository for book reviews
pub struct ReviewRepository {
    db: Arc<DatabaseManager>,
}

impl ReviewRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    /// Insert the caller's review of a book, or update the one they already wrote
    pub async fn upsert(
        &self,
        book_id: &str,
        user_id: &str,
        rating: i32,
        comment: Option<String>,
        now: &str,
    ) -> Result<Upserted<BookReview>> {
        let book_id = book_id.to_string();
        let user_id = user_id.to_string();
        let now = now.to_string();
        self.db
            .transaction(move |tx| {
                let existing = find_book_review(
                    tx,
                    "r.book_id = ? AND r.user_id = ?",
                    &[book_id.as_str(), user_id.as_str()],
                )?;

                let (id, created) = match existing {
                    Some(review) => {
                        tx.execute(
                            "UPDATE book_reviews SET rating = ?, comment = ?, updated_at = ? WHERE id = ?",
                            rusqlite::params![rating, &comment, &now, &review.id],
                        )?;
                        (review.id, false)
                    }
                    None => {
                        let id = uuid::Uuid::new_v4().to_string();
                        tx.execute(
                            "INSERT INTO book_reviews (id, book_id, user_id, rating, comment, created_at, updated_at) \
                             VALUES (?, ?, ?, ?, ?, ?, ?)",
                            rusqlite::params![&id, &book_id, &user_id, rating, &comment, &now, &now],
                        )?;
                        (id, true)
                    }
                };

                let review = find_book_review(tx, "r.id = ?", &[id.as_str()])?
                    .ok_or_else(|| LeafError::NotFound(format!("Review {} not found", id)))?;
                Ok(Upserted { review, created })
            })
            .await
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<BookReview>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| find_book_review(conn, "r.id = ?", &[id.as_str()]))
            .await
    }

    /// Newest first, with the total count
    pub async fn list_for_book(
        &self,
        book_id: &str,
        page: PageRequest,
    ) -> Result<(Vec<BookReview>, i64)> {
        let book_id = book_id.to_string();
        self.db
            .execute(move |conn| {
                let total: i64 = conn
                    .query_row(
                        "SELECT COUNT(*) FROM book_reviews WHERE book_id = ?",
                        [&book_id],
                        |row| row.get(0),
                    )
                    .map_err(LeafError::DatabaseError)?;

                let mut stmt = conn
                    .prepare(&format!(
                        "{} WHERE r.book_id = ? ORDER BY r.created_at DESC, r.id LIMIT {} OFFSET {}",
                        BOOK_REVIEW_SELECT,
                        page.limit(),
                        page.offset()
                    ))
                    .map_err(LeafError::DatabaseError)?;
                let reviews = stmt
                    .query_map([&book_id], map_book_review)
                    .map_err(LeafError::DatabaseError)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(LeafError::DatabaseError)?;

                Ok((reviews, total))
            })
            .await
    }

    pub async fn update(&self, id: &str, rating: i32, comment: Option<String>, now: &str) -> Result<()> {
        let id = id.to_string();
        let now = now.to_string();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "UPDATE book_reviews SET rating = ?, comment = ?, updated_at = ? WHERE id = ?",
                    rusqlite::params![rating, &comment, &now, &id],
                )
                .map_err(LeafError::DatabaseError)?;
                Ok(())
            })
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                conn.execute("DELETE FROM book_reviews WHERE id = ?", [&id])
                    .map_err(LeafError::DatabaseError)?;
                Ok(())
            })
            .await
    }

    pub async fn stats(&self, book_id: &str) -> Result<ReviewStats> {
        let book_id = book_id.to_string();
        self.db
            .execute(move |conn| {
                conn.query_row(
                    "SELECT AVG(rating), COUNT(*) FROM book_reviews WHERE book_id = ?",
                    [&book_id],
                    |row| {
                        Ok(ReviewStats {
                            average: row.get(0)?,
                            total: row.get(1)?,
                        })
                    },
                )
                .map_err(LeafError::DatabaseError)
            })
            .await
    }

    pub async fn count_by_user(&self, user_id: &str) -> Result<i64> {
        let user_id = user_id.to_string();
        self.db.execute(move |conn| count_by_user(conn, &user_id)).await
    }
}

/// Repository for peer ratings between users
pub struct UserReviewRepository {
    db: Arc<DatabaseManager>,
}

impl UserReviewRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    pub async fn upsert(
        &self,
        reviewer_id: &str,
        reviewed_user_id: &str,
        rating: i32,
        comment: Option<String>,
        now: &str,
    ) -> Result<Upserted<UserReview>> {
        let reviewer_id = reviewer_id.to_string();
        let reviewed_user_id = reviewed_user_id.to_string();
        let now = now.to_string();
        self.db
            .transaction(move |tx| {
                let existing: Option<String> = tx
                    .query_row(
                        "SELECT id FROM user_reviews WHERE reviewer_id = ? AND reviewed_user_id = ?",
                        [&reviewer_id, &reviewed_user_id],
                        |row| row.get(0),
                    )
                    .optional()?;

                let (id, created) = match existing {
                    Some(id) => {
                        tx.execute(
                            "UPDATE user_reviews SET rating = ?, comment = ?, updated_at = ? WHERE id = ?",
                            rusqlite::params![rating, &comment, &now, &id],
                        )?;
                        (id, false)
                    }
                    None => {
                        let id = uuid::Uuid::new_v4().to_string();
                        tx.execute(
                            "INSERT INTO user_reviews (id, reviewer_id, reviewed_user_id, rating, comment, created_at, updated_at) \
                             VALUES (?, ?, ?, ?, ?, ?, ?)",
                            rusqlite::params![&id, &reviewer_id, &reviewed_user_id, rating, &comment, &now, &now],
                        )?;
                        (id, true)
                    }
                };

                let review = tx.query_row(
                    &format!("{} WHERE r.id = ?", USER_REVIEW_SELECT),
                    [&id],
                    map_user_review,
                )?;
                Ok(Upserted { review, created })
            })
            .await
    }

    /// Reviews received by a user, newest first
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<UserReview>> {
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "{} WHERE r.reviewed_user_id = ? ORDER BY r.created_at DESC, r.id",
                        USER_REVIEW_SELECT
                    ))
                    .map_err(LeafError::DatabaseError)?;
                let reviews = stmt
                    .query_map([&user_id], map_user_review)
                    .map_err(LeafError::DatabaseError)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(LeafError::DatabaseError)?;
                Ok(reviews)
            })
            .await
    }

    /// Average received rating, rounded to one decimal
    pub async fn stats(&self, user_id: &str) -> Result<ReviewStats> {
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                conn.query_row(
                    "SELECT AVG(rating), COUNT(*) FROM user_reviews WHERE reviewed_user_id = ?",
                    [&user_id],
                    |row| {
                        let average: Option<f64> = row.get(0)?;
                        Ok(ReviewStats {
                            average: average.map(|a| (a * 10.0).round() / 10.0),
                            total: row.get(1)?,
                        })
                    },
                )
                .map_err(LeafError::DatabaseError)
            })
            .await
    }
}
