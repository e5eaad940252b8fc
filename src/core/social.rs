//! Discussions, private messages and follows

use crate::core::achievements::{award_pending, AwardedAchievement};
use crate::core::error::{LeafError, Result};
use crate::core::utils::format_timestamp;
use crate::db::manager::DatabaseManager;
use crate::db::models::{notification_types, Discussion, PrivateMessage, User};
use crate::db::repository::social::{insert_follow, insert_message, insert_notification, NewNotification};
use crate::db::repository::{books, users, DiscussionRepository};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub const MAX_MESSAGE_CHARS: usize = 1000;

/// Trim and bound a message body
pub fn validate_message(message: &str) -> Result<String> {
    let message = message.trim();
    if message.is_empty() {
        return Err(LeafError::ValidationError("Message cannot be empty".to_string()));
    }
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(LeafError::ValidationError(format!(
            "Message cannot exceed {} characters",
            MAX_MESSAGE_CHARS
        )));
    }
    Ok(message.to_string())
}

#[derive(Debug, Clone, Serialize)]
pub struct SentMessage {
    pub message: PrivateMessage,
    pub awarded: Vec<AwardedAchievement>,
}

pub struct SocialService {
    db: Arc<DatabaseManager>,
    discussions: DiscussionRepository,
}

impl SocialService {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self {
            discussions: DiscussionRepository::new(db.clone()),
            db,
        }
    }

    /// Post to the general board, or to a book's board when `book_id` is given
    pub async fn post_discussion(
        &self,
        author: &User,
        message: &str,
        book_id: Option<String>,
    ) -> Result<Discussion> {
        let discussion = Discussion {
            id: Uuid::new_v4().to_string(),
            user_id: author.id.clone(),
            username: author.username.clone(),
            message: validate_message(message)?,
            book_id,
            created_at: format_timestamp(Utc::now()),
        };

        if let Some(book_id) = discussion.book_id.clone() {
            let exists = self
                .db
                .execute(move |conn| Ok(books::find_book(conn, &book_id)?.is_some()))
                .await?;
            if !exists {
                return Err(LeafError::NotFound("Book not found".to_string()));
            }
        }

        self.discussions.create(&discussion).await?;
        Ok(discussion)
    }

    /// Send a private message, notify the recipient and check the sender's achievements
    pub async fn send_message(
        &self,
        sender: &User,
        recipient_id: &str,
        message: &str,
        book_id: Option<String>,
    ) -> Result<SentMessage> {
        if sender.id == recipient_id {
            return Err(LeafError::InvalidRequest(
                "You cannot send a message to yourself".to_string(),
            ));
        }
        let body = validate_message(message)?;

        let sender = sender.clone();
        let recipient_id = recipient_id.to_string();
        let sent = self
            .db
            .transaction(move |tx| {
                let now = Utc::now();
                let now_str = format_timestamp(now);
                if users::find_user(tx, &recipient_id)?.is_none() {
                    return Err(LeafError::NotFound("Recipient not found".to_string()));
                }
                let book = match &book_id {
                    Some(id) => Some(
                        books::find_book(tx, id)?
                            .ok_or_else(|| LeafError::NotFound(format!("Book {} not found", id)))?,
                    ),
                    None => None,
                };

                let message = PrivateMessage {
                    id: Uuid::new_v4().to_string(),
                    sender_id: sender.id.clone(),
                    recipient_id: recipient_id.clone(),
                    message: body,
                    book_id,
                    created_at: now_str.clone(),
                    is_read: false,
                };
                insert_message(tx, &message)?;

                let name = sender.full_name();
                let (title, text) = match &book {
                    Some(book) => (
                        "New Message About Your Book",
                        format!("{} wants to talk with you about \"{}\"", name, book.title),
                    ),
                    None => (
                        "New Private Message",
                        format!("{} sent you a private message", name),
                    ),
                };
                insert_notification(
                    tx,
                    NewNotification {
                        user_id: &recipient_id,
                        kind: notification_types::PRIVATE_MESSAGE,
                        title,
                        message: &text,
                        book_id: message.book_id.as_deref(),
                        related_user_id: Some(&sender.id),
                    },
                    &now_str,
                )?;

                let awarded = award_pending(tx, &sender.id, now)?;
                Ok(SentMessage { message, awarded })
            })
            .await?;

        info!(
            sender_id = %sent.message.sender_id,
            recipient_id = %sent.message.recipient_id,
            "Private message sent"
        );
        Ok(sent)
    }

    /// Follow another user; returns false when already following
    pub async fn follow(&self, follower: &User, followed_id: &str) -> Result<bool> {
        if follower.id == followed_id {
            return Err(LeafError::InvalidRequest("You cannot follow yourself".to_string()));
        }

        let follower = follower.clone();
        let followed_id = followed_id.to_string();
        self.db
            .transaction(move |tx| {
                if users::find_user(tx, &followed_id)?.is_none() {
                    return Err(LeafError::NotFound(format!("User {} not found", followed_id)));
                }
                let now = format_timestamp(Utc::now());
                if !insert_follow(tx, &follower.id, &followed_id, &now)? {
                    return Ok(false);
                }

                insert_notification(
                    tx,
                    NewNotification {
                        user_id: &followed_id,
                        kind: notification_types::NEW_FOLLOWER,
                        title: "New Follower",
                        message: &format!("{} started following you", follower.full_name()),
                        book_id: None,
                        related_user_id: Some(&follower.id),
                    },
                    &now,
                )?;
                Ok(true)
            })
            .await
    }
}
