//! Discussions, private messages, notifications and follows

use super::users::map_summary_at;
use crate::core::error::{LeafError, Result};
use crate::core::utils::PageRequest;
use crate::db::manager::DatabaseManager;
use crate::db::models::{ConversationSummary, Discussion, Notification, PrivateMessage, UserSummary};
use rusqlite::{Connection, OptionalExtension, Row};
use std::sync::Arc;
use uuid::Uuid;

/// Messages returned by a discussion board read
pub const DISCUSSION_WINDOW: i64 = 50;

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, type, title, message, book_id, related_user_id, is_read, created_at";

const MESSAGE_COLUMNS: &str = "id, sender_id, recipient_id, message, book_id, created_at, is_read";

fn map_discussion(row: &Row) -> rusqlite::Result<Discussion> {
    Ok(Discussion {
        id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        message: row.get(3)?,
        book_id: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn map_message(row: &Row) -> rusqlite::Result<PrivateMessage> {
    Ok(PrivateMessage {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        recipient_id: row.get(2)?,
        message: row.get(3)?,
        book_id: row.get(4)?,
        created_at: row.get(5)?,
        is_read: row.get(6)?,
    })
}

fn map_notification(row: &Row) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: row.get(2)?,
        title: row.get(3)?,
        message: row.get(4)?,
        book_id: row.get(5)?,
        related_user_id: row.get(6)?,
        is_read: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// Fields of a notification about to be written
#[derive(Debug, Clone, Copy)]
pub struct NewNotification<'a> {
    pub user_id: &'a str,
    pub kind: &'a str,
    pub title: &'a str,
    pub message: &'a str,
    pub book_id: Option<&'a str>,
    pub related_user_id: Option<&'a str>,
}

/// Write a notification inside an open connection or transaction
pub fn insert_notification(
    conn: &Connection,
    new: NewNotification<'_>,
    now: &str,
) -> Result<Notification> {
    let notification = Notification {
        id: Uuid::new_v4().to_string(),
        user_id: new.user_id.to_string(),
        kind: new.kind.to_string(),
        title: new.title.to_string(),
        message: new.message.to_string(),
        book_id: new.book_id.map(str::to_string),
        related_user_id: new.related_user_id.map(str::to_string),
        is_read: false,
        created_at: now.to_string(),
    };

    conn.execute(
        &format!(
            "INSERT INTO notifications ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            NOTIFICATION_COLUMNS
        ),
        rusqlite::params![
            &notification.id,
            &notification.user_id,
            &notification.kind,
            &notification.title,
            &notification.message,
            &notification.book_id,
            &notification.related_user_id,
            notification.is_read,
            &notification.created_at,
        ],
    )
    .map_err(LeafError::DatabaseError)?;

    Ok(notification)
}

pub fn insert_message(conn: &Connection, message: &PrivateMessage) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO private_messages ({}) VALUES (?, ?, ?, ?, ?, ?, ?)",
            MESSAGE_COLUMNS
        ),
        rusqlite::params![
            &message.id,
            &message.sender_id,
            &message.recipient_id,
            &message.message,
            &message.book_id,
            &message.created_at,
            message.is_read,
        ],
    )
    .map_err(LeafError::DatabaseError)?;
    Ok(())
}

pub fn count_sent(conn: &Connection, user_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM private_messages WHERE sender_id = ?",
        [user_id],
        |row| row.get(0),
    )
    .map_err(LeafError::DatabaseError)
}

/// Returns false when nothing was inserted (existing follow or self follow)
pub fn insert_follow(conn: &Connection, follower_id: &str, followed_id: &str, now: &str) -> Result<bool> {
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO follows (follower_id, followed_id, created_at) VALUES (?, ?, ?)",
            [follower_id, followed_id, now],
        )
        .map_err(LeafError::DatabaseError)?;
    Ok(inserted > 0)
}

/// Public discussion board
pub struct DiscussionRepository {
    db: Arc<DatabaseManager>,
}

impl DiscussionRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    pub async fn create(&self, discussion: &Discussion) -> Result<()> {
        let d = discussion.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO discussions (id, user_id, username, message, book_id, created_at) \
                     VALUES (?, ?, ?, ?, ?, ?)",
                    rusqlite::params![&d.id, &d.user_id, &d.username, &d.message, &d.book_id, &d.created_at],
                )
                .map_err(LeafError::DatabaseError)?;
                Ok(())
            })
            .await
    }

    /// The latest messages of the general board (`None`) or of one book, oldest first
    pub async fn recent(&self, book_id: Option<String>) -> Result<Vec<Discussion>> {
        self.db
            .execute(move |conn| {
                let condition = if book_id.is_some() {
                    "book_id = ?"
                } else {
                    "book_id IS NULL"
                };
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT id, user_id, username, message, book_id, created_at FROM discussions \
                         WHERE {} ORDER BY created_at DESC, rowid DESC LIMIT {}",
                        condition, DISCUSSION_WINDOW
                    ))
                    .map_err(LeafError::DatabaseError)?;
                let mut messages = stmt
                    .query_map(rusqlite::params_from_iter(book_id.iter()), map_discussion)
                    .map_err(LeafError::DatabaseError)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(LeafError::DatabaseError)?;
                messages.reverse();
                Ok(messages)
            })
            .await
    }
}

/// Private one-to-one messages
pub struct MessageRepository {
    db: Arc<DatabaseManager>,
}

impl MessageRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    /// Messages between two users in send order
    pub async fn conversation(&self, user_id: &str, partner_id: &str) -> Result<Vec<PrivateMessage>> {
        let user_id = user_id.to_string();
        let partner_id = partner_id.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {} FROM private_messages \
                         WHERE (sender_id = ?1 AND recipient_id = ?2) OR (sender_id = ?2 AND recipient_id = ?1) \
                         ORDER BY created_at, rowid",
                        MESSAGE_COLUMNS
                    ))
                    .map_err(LeafError::DatabaseError)?;
                let messages = stmt
                    .query_map([&user_id, &partner_id], map_message)
                    .map_err(LeafError::DatabaseError)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(LeafError::DatabaseError)?;
                Ok(messages)
            })
            .await
    }

    /// Mark everything `sender_id` sent to `recipient_id` as read
    pub async fn mark_read(&self, recipient_id: &str, sender_id: &str) -> Result<usize> {
        let recipient_id = recipient_id.to_string();
        let sender_id = sender_id.to_string();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "UPDATE private_messages SET is_read = 1 \
                     WHERE recipient_id = ? AND sender_id = ? AND is_read = 0",
                    [&recipient_id, &sender_id],
                )
                .map_err(LeafError::DatabaseError)
            })
            .await
    }

    /// One row per conversation partner, most recent conversation first
    pub async fn conversations(&self, user_id: &str) -> Result<Vec<ConversationSummary>> {
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn
                    .prepare(
                        "WITH pairs AS ( \
                             SELECT rowid AS seq, \
                                    CASE WHEN sender_id = ?1 THEN recipient_id ELSE sender_id END AS partner_id, \
                                    sender_id, message, created_at, is_read \
                             FROM private_messages WHERE sender_id = ?1 OR recipient_id = ?1 \
                         ), latest AS ( \
                             SELECT partner_id, MAX(created_at) AS last_at FROM pairs GROUP BY partner_id \
                         ) \
                         SELECT l.partner_id, u.username, \
                                (SELECT p.message FROM pairs p WHERE p.partner_id = l.partner_id \
                                 ORDER BY p.created_at DESC, p.seq DESC LIMIT 1), \
                                l.last_at, \
                                (SELECT COUNT(*) FROM pairs p WHERE p.partner_id = l.partner_id \
                                 AND p.sender_id <> ?1 AND p.is_read = 0) \
                         FROM latest l JOIN users u ON u.id = l.partner_id \
                         ORDER BY l.last_at DESC",
                    )
                    .map_err(LeafError::DatabaseError)?;
                let rows = stmt
                    .query_map([&user_id], |row| {
                        Ok(ConversationSummary {
                            partner_id: row.get(0)?,
                            partner_username: row.get(1)?,
                            last_message: row.get(2)?,
                            last_message_at: row.get(3)?,
                            unread_count: row.get(4)?,
                        })
                    })
                    .map_err(LeafError::DatabaseError)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(LeafError::DatabaseError)?;
                Ok(rows)
            })
            .await
    }

    pub async fn count_sent(&self, user_id: &str) -> Result<i64> {
        let user_id = user_id.to_string();
        self.db.execute(move |conn| count_sent(conn, &user_id)).await
    }
}

/// In-app notifications
pub struct NotificationRepository {
    db: Arc<DatabaseManager>,
}

impl NotificationRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    /// Newest first, optionally only unread ones
    pub async fn list(
        &self,
        user_id: &str,
        unread_only: bool,
        page: PageRequest,
    ) -> Result<(Vec<Notification>, i64)> {
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                let condition = if unread_only {
                    "user_id = ? AND is_read = 0"
                } else {
                    "user_id = ?"
                };

                let total: i64 = conn
                    .query_row(
                        &format!("SELECT COUNT(*) FROM notifications WHERE {}", condition),
                        [&user_id],
                        |row| row.get(0),
                    )
                    .map_err(LeafError::DatabaseError)?;

                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {} FROM notifications WHERE {} \
                         ORDER BY created_at DESC, rowid DESC LIMIT {} OFFSET {}",
                        NOTIFICATION_COLUMNS,
                        condition,
                        page.limit(),
                        page.offset()
                    ))
                    .map_err(LeafError::DatabaseError)?;
                let items = stmt
                    .query_map([&user_id], map_notification)
                    .map_err(LeafError::DatabaseError)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(LeafError::DatabaseError)?;

                Ok((items, total))
            })
            .await
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Notification>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                conn.query_row(
                    &format!("SELECT {} FROM notifications WHERE id = ?", NOTIFICATION_COLUMNS),
                    [&id],
                    map_notification,
                )
                .optional()
                .map_err(LeafError::DatabaseError)
            })
            .await
    }

    pub async fn mark_read(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                conn.execute("UPDATE notifications SET is_read = 1 WHERE id = ?", [&id])
                    .map_err(LeafError::DatabaseError)?;
                Ok(())
            })
            .await
    }

    pub async fn mark_all_read(&self, user_id: &str) -> Result<usize> {
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "UPDATE notifications SET is_read = 1 WHERE user_id = ? AND is_read = 0",
                    [&user_id],
                )
                .map_err(LeafError::DatabaseError)
            })
            .await
    }

    pub async fn unread_count(&self, user_id: &str) -> Result<i64> {
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = 0",
                    [&user_id],
                    |row| row.get(0),
                )
                .map_err(LeafError::DatabaseError)
            })
            .await
    }
}

/// Follower graph
pub struct FollowRepository {
    db: Arc<DatabaseManager>,
}

impl FollowRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    /// Returns false when there was nothing to remove
    pub async fn unfollow(&self, follower_id: &str, followed_id: &str) -> Result<bool> {
        let follower_id = follower_id.to_string();
        let followed_id = followed_id.to_string();
        self.db
            .execute(move |conn| {
                let removed = conn
                    .execute(
                        "DELETE FROM follows WHERE follower_id = ? AND followed_id = ?",
                        [&follower_id, &followed_id],
                    )
                    .map_err(LeafError::DatabaseError)?;
                Ok(removed > 0)
            })
            .await
    }

    pub async fn is_following(&self, follower_id: &str, followed_id: &str) -> Result<bool> {
        let follower_id = follower_id.to_string();
        let followed_id = followed_id.to_string();
        self.db
            .execute(move |conn| {
                conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM follows WHERE follower_id = ? AND followed_id = ?)",
                    [&follower_id, &followed_id],
                    |row| row.get(0),
                )
                .map_err(LeafError::DatabaseError)
            })
            .await
    }

    pub async fn followers(&self, user_id: &str) -> Result<Vec<UserSummary>> {
        self.list(
            user_id,
            "JOIN users u ON u.id = f.follower_id WHERE f.followed_id = ?",
        )
        .await
    }

    pub async fn following(&self, user_id: &str) -> Result<Vec<UserSummary>> {
        self.list(
            user_id,
            "JOIN users u ON u.id = f.followed_id WHERE f.follower_id = ?",
        )
        .await
    }

    /// (followers, following)
    pub async fn counts(&self, user_id: &str) -> Result<(i64, i64)> {
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                conn.query_row(
                    "SELECT (SELECT COUNT(*) FROM follows WHERE followed_id = ?1), \
                            (SELECT COUNT(*) FROM follows WHERE follower_id = ?1)",
                    [&user_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .map_err(LeafError::DatabaseError)
            })
            .await
    }

    async fn list(&self, user_id: &str, join: &'static str) -> Result<Vec<UserSummary>> {
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT u.id, u.username, u.first_name, u.last_name FROM follows f {} \
                         ORDER BY f.created_at DESC, u.username",
                        join
                    ))
                    .map_err(LeafError::DatabaseError)?;
                let users = stmt
                    .query_map([&user_id], |row| map_summary_at(row, 0))
                    .map_err(LeafError::DatabaseError)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(LeafError::DatabaseError)?;
                Ok(users)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support::{db, insert_book, insert_user};

    fn message(id: &str, from: &str, to: &str, text: &str, at: &str) -> PrivateMessage {
        PrivateMessage {
            id: id.into(),
            sender_id: from.into(),
            recipient_id: to.into(),
            message: text.into(),
            book_id: None,
            created_at: at.into(),
            is_read: false,
        }
    }

    #[tokio::test]
    async fn test_discussion_window_is_chronological() {
        let db = db();
        let repo = DiscussionRepository::new(db.clone());
        insert_user(&db, "u1", "alice").await;
        insert_book(&db, "b1", "Dune", None).await;

        for i in 0..55 {
            repo.create(&Discussion {
                id: format!("d{}", i),
                user_id: "u1".into(),
                username: "alice".into(),
                message: format!("msg {}", i),
                book_id: None,
                created_at: format!("2030-01-01T00:{:02}:00Z", i),
            })
            .await
            .unwrap();
        }
        repo.create(&Discussion {
            id: "book".into(),
            user_id: "u1".into(),
            username: "alice".into(),
            message: "about dune".into(),
            book_id: Some("b1".into()),
            created_at: "2030-01-02T00:00:00Z".into(),
        })
        .await
        .unwrap();

        let general = repo.recent(None).await.unwrap();
        assert_eq!(general.len(), 50);
        assert_eq!(general[0].message, "msg 5");
        assert_eq!(general[49].message, "msg 54");

        let book = repo.recent(Some("b1".into())).await.unwrap();
        assert_eq!(book.len(), 1);
    }

    #[tokio::test]
    async fn test_conversations_summary_and_read_marking() {
        let db = db();
        let repo = MessageRepository::new(db.clone());
        insert_user(&db, "a", "anna").await;
        insert_user(&db, "b", "ben").await;
        insert_user(&db, "c", "cleo").await;

        db.execute(|conn| {
            insert_message(conn, &message("m1", "b", "a", "hi", "2030-01-01T10:00:00Z"))?;
            insert_message(conn, &message("m2", "a", "b", "hello", "2030-01-01T10:01:00Z"))?;
            insert_message(conn, &message("m3", "b", "a", "book?", "2030-01-01T10:02:00Z"))?;
            insert_message(conn, &message("m4", "c", "a", "yo", "2030-01-01T09:00:00Z"))
        })
        .await
        .unwrap();

        let convos = repo.conversations("a").await.unwrap();
        assert_eq!(convos.len(), 2);
        assert_eq!(convos[0].partner_username, "ben");
        assert_eq!(convos[0].last_message, "book?");
        assert_eq!(convos[0].unread_count, 2);
        assert_eq!(convos[1].partner_id, "c");

        let thread = repo.conversation("a", "b").await.unwrap();
        let ids: Vec<_> = thread.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);

        assert_eq!(repo.mark_read("a", "b").await.unwrap(), 2);
        assert_eq!(repo.conversations("a").await.unwrap()[0].unread_count, 0);
        assert_eq!(repo.count_sent("b").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_notifications_unread_filter() {
        let db = db();
        let repo = NotificationRepository::new(db.clone());
        insert_user(&db, "u1", "alice").await;

        let first = db
            .execute(|conn| {
                let new = NewNotification {
                    user_id: "u1",
                    kind: "new_follower",
                    title: "New Follower",
                    message: "bob started following you",
                    book_id: None,
                    related_user_id: None,
                };
                let first = insert_notification(conn, new, "2030-01-01T00:00:00Z")?;
                insert_notification(conn, new, "2030-01-02T00:00:00Z")?;
                Ok(first)
            })
            .await
            .unwrap();

        repo.mark_read(&first.id).await.unwrap();
        assert_eq!(repo.unread_count("u1").await.unwrap(), 1);

        let page = PageRequest::new(None, None, 20);
        let (all, total) = repo.list("u1", false, page).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(all[0].created_at, "2030-01-02T00:00:00Z");
        let (unread, _) = repo.list("u1", true, page).await.unwrap();
        assert_eq!(unread.len(), 1);

        assert_eq!(repo.mark_all_read("u1").await.unwrap(), 1);
        assert_eq!(repo.unread_count("u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_follow_graph() {
        let db = db();
        let repo = FollowRepository::new(db.clone());
        insert_user(&db, "a", "anna").await;
        insert_user(&db, "b", "ben").await;

        let now = "2030-01-01T00:00:00Z";
        assert!(db.execute(move |conn| insert_follow(conn, "a", "b", now)).await.unwrap());
        assert!(!db.execute(move |conn| insert_follow(conn, "a", "b", now)).await.unwrap());
        assert!(!db.execute(move |conn| insert_follow(conn, "a", "a", now)).await.unwrap());

        assert!(repo.is_following("a", "b").await.unwrap());
        assert_eq!(repo.followers("b").await.unwrap()[0].username, "anna");
        assert_eq!(repo.following("a").await.unwrap().len(), 1);
        assert_eq!(repo.counts("b").await.unwrap(), (1, 0));

        assert!(repo.unfollow("a", "b").await.unwrap());
        assert!(!repo.unfollow("a", "b").await.unwrap());
    }
}
