//! Borrow request workflow
//!
//! requested (is_agreed = 0) -> agreed (is_agreed = 1) -> returned.
//! Rejected and cancelled requests are deleted. Every transition runs in one
//! transaction together with the notifications it produces.

use crate::core::achievements::{award_pending, AwardedAchievement};
use crate::core::config::LendingConfig;
use crate::core::error::{LeafError, Result};
use crate::core::utils::{display_date, format_timestamp, parse_due_date};
use crate::db::manager::DatabaseManager;
use crate::db::models::{notification_types, Book, BorrowedBook, User};
use crate::db::repository::social::{insert_notification, NewNotification};
use crate::db::repository::{books, lending, users};
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Result of approving a request
#[derive(Debug, Clone, Serialize)]
pub struct Approval {
    pub record: BorrowedBook,
    /// Other pending requests for the same book that were declined
    pub declined: usize,
    pub awarded: Vec<AwardedAchievement>,
}

/// Lending workflow over books, borrow records and notifications
pub struct LendingService {
    db: Arc<DatabaseManager>,
    config: LendingConfig,
}

/// Whether `user` may manage requests for `book`.
/// Books without a poster (seeded ones) are managed by admins.
fn can_manage(book: &Book, user: &User) -> bool {
    match book.posted_by.as_deref() {
        Some(owner) => owner == user.id,
        None => user.is_admin(),
    }
}

/// Who hears about a new request: the poster, or every other active admin for seeded books
fn request_recipients(conn: &Connection, book: &Book, borrower: &User) -> Result<Vec<String>> {
    match book.posted_by.as_deref() {
        Some(owner) => Ok(vec![owner.to_string()]),
        None => Ok(users::admin_ids(conn)?
            .into_iter()
            .filter(|id| *id != borrower.id)
            .collect()),
    }
}

fn load_book(conn: &Connection, book_id: &str) -> Result<Book> {
    books::find_book(conn, book_id)?
        .ok_or_else(|| LeafError::NotFound(format!("Book {} not found", book_id)))
}

fn decline(conn: &Connection, book: &Book, record: &BorrowedBook, by: &str, message: &str, now: &str) -> Result<()> {
    lending::delete_record(conn, &record.id)?;
    insert_notification(
        conn,
        NewNotification {
            user_id: &record.user_id,
            kind: notification_types::BORROW_DECLINED,
            title: "Book Request Declined",
            message,
            book_id: Some(&book.id),
            related_user_id: Some(by),
        },
        now,
    )?;
    Ok(())
}

impl LendingService {
    pub fn new(db: Arc<DatabaseManager>, config: LendingConfig) -> Self {
        Self { db, config }
    }

    /// Resolve an optional `YYYY-MM-DD` into a due timestamp within the allowed window
    pub fn resolve_due_date(&self, requested: Option<&str>, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let Some(raw) = requested.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(now + Duration::days(self.config.default_loan_days));
        };

        let due = parse_due_date(raw)?;
        let today = now.date_naive();
        if due.date_naive() < today {
            return Err(LeafError::ValidationError(
                "Due date cannot be in the past".to_string(),
            ));
        }
        if due.date_naive() > today + Duration::days(self.config.max_loan_days) {
            return Err(LeafError::ValidationError(format!(
                "Due date cannot be more than {} days from today",
                self.config.max_loan_days
            )));
        }
        Ok(due)
    }

    /// Ask the book's owner to lend it
    pub async fn request_borrow(
        &self,
        book_id: &str,
        borrower: &User,
        proposed_due_date: Option<&str>,
    ) -> Result<BorrowedBook> {
        let now = Utc::now();
        let due = self.resolve_due_date(proposed_due_date, now)?;

        let book_id = book_id.to_string();
        let borrower = borrower.clone();
        let record = self
            .db
            .transaction(move |tx| {
                let book = load_book(tx, &book_id)?;
                if book.posted_by.as_deref() == Some(borrower.id.as_str()) {
                    return Err(LeafError::PermissionDenied(
                        "You cannot borrow your own book".to_string(),
                    ));
                }
                if !book.available {
                    return Err(LeafError::Conflict(format!(
                        "\"{}\" is currently not available",
                        book.title
                    )));
                }
                if lending::find_open(tx, &book.id, &borrower.id)?.is_some() {
                    return Err(LeafError::Conflict(
                        "You already have an open request for this book".to_string(),
                    ));
                }

                let now_str = format_timestamp(now);
                let record = BorrowedBook {
                    id: Uuid::new_v4().to_string(),
                    book_id: book.id.clone(),
                    user_id: borrower.id.clone(),
                    borrowed_date: now_str.clone(),
                    due_date: format_timestamp(due),
                    agreed_due_date: None,
                    returned_date: None,
                    is_returned: false,
                    is_agreed: false,
                };
                lending::insert_borrow(tx, &record)?;

                let message = format!(
                    "{} wants to borrow \"{}\" (due: {})",
                    borrower.full_name(),
                    book.title,
                    display_date(&record.due_date)
                );
                for manager_id in request_recipients(tx, &book, &borrower)? {
                    insert_notification(
                        tx,
                        NewNotification {
                            user_id: &manager_id,
                            kind: notification_types::BORROW_REQUEST,
                            title: "New Borrow Request",
                            message: &message,
                            book_id: Some(&book.id),
                            related_user_id: Some(&borrower.id),
                        },
                        &now_str,
                    )?;
                }

                Ok(record)
            })
            .await?;

        info!(
            borrow_id = %record.id,
            book_id = %record.book_id,
            user_id = %record.user_id,
            "Borrow request created"
        );
        Ok(record)
    }

    /// Owner accepts a pending request.
    ///
    /// The agreed due date defaults to the proposed one. Competing requests for the
    /// same book are declined, and the owner's lending achievements are checked.
    pub async fn approve(
        &self,
        book_id: &str,
        owner: &User,
        borrower_id: &str,
        agreed_due_date: Option<&str>,
    ) -> Result<Approval> {
        let now = Utc::now();
        let agreed = match agreed_due_date.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => Some(format_timestamp(self.resolve_due_date(Some(raw), now)?)),
            None => None,
        };

        let book_id = book_id.to_string();
        let owner = owner.clone();
        let borrower_id = borrower_id.to_string();
        let approval = self
            .db
            .transaction(move |tx| {
                let book = load_book(tx, &book_id)?;
                if !can_manage(&book, &owner) {
                    return Err(LeafError::PermissionDenied(
                        "Only the book's owner can approve requests".to_string(),
                    ));
                }
                approve_in(tx, &book, &owner, &borrower_id, agreed, now)
            })
            .await?;

        info!(
            borrow_id = %approval.record.id,
            book_id = %approval.record.book_id,
            borrower_id = %approval.record.user_id,
            declined = approval.declined,
            "Borrow request approved"
        );
        Ok(approval)
    }

    /// Owner declines a pending request; the record is deleted
    pub async fn reject(&self, book_id: &str, owner: &User, borrower_id: &str) -> Result<()> {
        let bid = book_id.to_string();
        let owner = owner.clone();
        let uid = borrower_id.to_string();
        self.db
            .transaction(move |tx| {
                let book = load_book(tx, &bid)?;
                if !can_manage(&book, &owner) {
                    return Err(LeafError::PermissionDenied(
                        "Only the book's owner can reject requests".to_string(),
                    ));
                }
                reject_in(tx, &book, &owner, &uid, Utc::now())
            })
            .await?;

        info!(book_id = %book_id, borrower_id = %borrower_id, "Borrow request rejected");
        Ok(())
    }

    /// Borrower withdraws their own pending request
    pub async fn cancel(&self, book_id: &str, borrower: &User) -> Result<()> {
        let book_id = book_id.to_string();
        let borrower_id = borrower.id.clone();
        let record = self
            .db
            .transaction(move |tx| {
                let record = lending::find_open(tx, &book_id, &borrower_id)?
                    .ok_or_else(|| LeafError::NotFound("No pending request for this book".to_string()))?;
                if record.is_agreed {
                    return Err(LeafError::InvalidRequest(
                        "The request was already approved; return the book instead".to_string(),
                    ));
                }
                lending::delete_record(tx, &record.id)?;
                Ok(record)
            })
            .await?;

        info!(borrow_id = %record.id, book_id = %record.book_id, "Borrow request cancelled");
        Ok(())
    }

    /// Borrower hands an agreed loan back
    pub async fn return_book(&self, book_id: &str, borrower: &User) -> Result<BorrowedBook> {
        let book_id = book_id.to_string();
        let borrower = borrower.clone();
        let record = self
            .db
            .transaction(move |tx| {
                let book = load_book(tx, &book_id)?;
                let mut record = lending::find_open(tx, &book.id, &borrower.id)?
                    .ok_or_else(|| LeafError::NotFound("Book not found in borrowed list".to_string()))?;
                if !record.is_agreed {
                    return Err(LeafError::InvalidRequest(
                        "The request is still pending; cancel it instead".to_string(),
                    ));
                }

                let now_str = format_timestamp(Utc::now());
                lending::mark_returned(tx, &record.id, &now_str)?;
                books::set_available(tx, &book.id, true)?;
                record.is_returned = true;
                record.returned_date = Some(now_str.clone());

                if let Some(owner_id) = book.posted_by.as_deref() {
                    insert_notification(
                        tx,
                        NewNotification {
                            user_id: owner_id,
                            kind: notification_types::BOOK_RETURNED,
                            title: "Book Returned",
                            message: &format!("{} returned \"{}\"", borrower.full_name(), book.title),
                            book_id: Some(&book.id),
                            related_user_id: Some(&borrower.id),
                        },
                        &now_str,
                    )?;
                }

                Ok(record)
            })
            .await?;

        info!(borrow_id = %record.id, book_id = %record.book_id, "Book returned");
        Ok(record)
    }

    /// Accept or decline the request behind a `borrow_request` notification.
    /// Accepting agrees to the proposed due date. The notification is marked read.
    pub async fn respond_to_notification(
        &self,
        notification_id: &str,
        owner: &User,
        accept: bool,
    ) -> Result<Option<Approval>> {
        let nid = notification_id.to_string();
        let owner = owner.clone();
        let now = Utc::now();
        let approval = self
            .db
            .transaction(move |tx| {
                let (kind, book_id, borrower_id): (String, Option<String>, Option<String>) = tx
                    .query_row(
                        "SELECT type, book_id, related_user_id FROM notifications WHERE id = ? AND user_id = ?",
                        [&nid, &owner.id],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                    )
                    .map_err(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => {
                            LeafError::NotFound("Notification not found".to_string())
                        }
                        other => LeafError::DatabaseError(other),
                    })?;

                let (Some(book_id), Some(borrower_id)) = (book_id, borrower_id) else {
                    return Err(LeafError::InvalidRequest(
                        "Notification is not attached to a borrow request".to_string(),
                    ));
                };
                if kind != notification_types::BORROW_REQUEST {
                    return Err(LeafError::InvalidRequest(
                        "Notification is not a borrow request".to_string(),
                    ));
                }

                let book = load_book(tx, &book_id)?;
                let outcome = if accept {
                    Some(approve_in(tx, &book, &owner, &borrower_id, None, now)?)
                } else {
                    reject_in(tx, &book, &owner, &borrower_id, now)?;
                    None
                };

                tx.execute(
                    "UPDATE notifications SET is_read = 1 WHERE id = ?",
                    [&nid],
                )?;
                Ok(outcome)
            })
            .await?;

        info!(notification_id = %notification_id, accepted = accept, "Borrow request notification handled");
        Ok(approval)
    }
}

fn pending_request(conn: &Connection, book: &Book, borrower_id: &str) -> Result<BorrowedBook> {
    match lending::find_open(conn, &book.id, borrower_id)? {
        Some(record) if !record.is_agreed => Ok(record),
        _ => Err(LeafError::NotFound("Borrow request not found".to_string())),
    }
}

fn approve_in(
    conn: &Connection,
    book: &Book,
    owner: &User,
    borrower_id: &str,
    agreed_due_date: Option<String>,
    now: DateTime<Utc>,
) -> Result<Approval> {
    let mut record = pending_request(conn, book, borrower_id)?;
    if !book.available {
        return Err(LeafError::Conflict(format!(
            "\"{}\" is already lent out",
            book.title
        )));
    }

    let now_str = format_timestamp(now);
    let agreed = agreed_due_date.unwrap_or_else(|| record.due_date.clone());
    lending::approve(conn, &record.id, &agreed)?;
    books::set_available(conn, &book.id, false)?;
    record.is_agreed = true;
    record.agreed_due_date = Some(agreed);

    insert_notification(
        conn,
        NewNotification {
            user_id: &record.user_id,
            kind: notification_types::BORROW_APPROVED,
            title: "Book Request Approved",
            message: &format!(
                "Your request to borrow \"{}\" has been approved! Please return it by {}.",
                book.title,
                display_date(record.effective_due_date())
            ),
            book_id: Some(&book.id),
            related_user_id: Some(&owner.id),
        },
        &now_str,
    )?;

    let mut declined = 0;
    for other in lending::pending_for_book(conn, &book.id)? {
        decline(
            conn,
            book,
            &other,
            &owner.id,
            &format!("\"{}\" was lent to another reader.", book.title),
            &now_str,
        )?;
        declined += 1;
    }

    let lender_id = book.posted_by.as_deref().unwrap_or(&owner.id);
    let awarded = match award_pending(conn, lender_id, now) {
        Ok(awarded) => awarded,
        Err(LeafError::NotFound(_)) => Vec::new(),
        Err(e) => return Err(e),
    };

    Ok(Approval {
        record,
        declined,
        awarded,
    })
}

fn reject_in(
    conn: &Connection,
    book: &Book,
    owner: &User,
    borrower_id: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let record = pending_request(conn, book, borrower_id)?;
    decline(
        conn,
        book,
        &record,
        &owner.id,
        &format!("Your request to borrow \"{}\" has been declined.", book.title),
        &format_timestamp(now),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::core::utils::PageRequest;
    use crate::db::repository::test_support::{db, insert_book, insert_user, user_fixture};
    use crate::db::repository::{
        BookRepository, BorrowRepository, NotificationRepository, Repository, UserRepository,
    };

    fn service(db: &Arc<DatabaseManager>) -> LendingService {
        LendingService::new(db.clone(), Config::defaults().unwrap().lending)
    }

    async fn notifications(db: &Arc<DatabaseManager>, user_id: &str) -> Vec<crate::db::models::Notification> {
        NotificationRepository::new(db.clone())
            .list(user_id, false, PageRequest::new(None, None, 50))
            .await
            .unwrap()
            .0
    }

    async fn is_available(db: &Arc<DatabaseManager>, book_id: &str) -> bool {
        BookRepository::new(db.clone())
            .find_by_id(book_id)
            .await
            .unwrap()
            .unwrap()
            .available
    }

    #[test]
    fn test_due_date_window() {
        let lending = LendingService::new(db(), Config::defaults().unwrap().lending);
        let now = Utc::now();

        let default = lending.resolve_due_date(None, now).unwrap();
        assert_eq!((default - now).num_days(), 14);

        let yesterday = (now - Duration::days(1)).format("%Y-%m-%d").to_string();
        assert!(matches!(
            lending.resolve_due_date(Some(&yesterday), now),
            Err(LeafError::ValidationError(_))
        ));

        let far = (now + Duration::days(120)).format("%Y-%m-%d").to_string();
        assert!(lending.resolve_due_date(Some(&far), now).is_err());

        let soon = (now + Duration::days(7)).format("%Y-%m-%d").to_string();
        assert!(lending.resolve_due_date(Some(&soon), now).is_ok());
        assert!(lending.resolve_due_date(Some("next week"), now).is_err());
    }

    #[tokio::test]
    async fn test_request_notifies_owner() {
        let db = db();
        insert_user(&db, "owner", "owner").await;
        let reader = insert_user(&db, "reader", "reader").await;
        insert_book(&db, "b1", "Dune", Some("owner")).await;

        let record = service(&db).request_borrow("b1", &reader, None).await.unwrap();
        assert!(!record.is_agreed);
        assert!(is_available(&db, "b1").await);

        let notes = notifications(&db, "owner").await;
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, notification_types::BORROW_REQUEST);
        assert!(notes[0].message.starts_with("reader wants to borrow \"Dune\""));
        assert_eq!(notes[0].related_user_id.as_deref(), Some("reader"));
    }

    #[tokio::test]
    async fn test_request_guards() {
        let db = db();
        let owner = insert_user(&db, "owner", "owner").await;
        let reader = insert_user(&db, "reader", "reader").await;
        insert_book(&db, "b1", "Dune", Some("owner")).await;
        let lending = service(&db);

        assert!(matches!(
            lending.request_borrow("missing", &reader, None).await,
            Err(LeafError::NotFound(_))
        ));
        assert!(matches!(
            lending.request_borrow("b1", &owner, None).await,
            Err(LeafError::PermissionDenied(_))
        ));

        lending.request_borrow("b1", &reader, None).await.unwrap();
        assert!(matches!(
            lending.request_borrow("b1", &reader, None).await,
            Err(LeafError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_approve_declines_competing_requests() {
        let db = db();
        let owner = insert_user(&db, "owner", "owner").await;
        let alice = insert_user(&db, "alice", "alice").await;
        let bob = insert_user(&db, "bob", "bob").await;
        insert_book(&db, "b1", "Dune", Some("owner")).await;
        let lending = service(&db);

        lending.request_borrow("b1", &alice, None).await.unwrap();
        lending.request_borrow("b1", &bob, None).await.unwrap();

        assert!(matches!(
            lending.approve("b1", &bob, "alice", None).await,
            Err(LeafError::PermissionDenied(_))
        ));

        let approval = lending.approve("b1", &owner, "alice", None).await.unwrap();
        assert!(approval.record.is_agreed);
        assert_eq!(approval.declined, 1);
        assert_eq!(
            approval.record.agreed_due_date.as_deref(),
            Some(approval.record.due_date.as_str())
        );
        assert!(!is_available(&db, "b1").await);

        let alice_notes = notifications(&db, "alice").await;
        assert_eq!(alice_notes[0].kind, notification_types::BORROW_APPROVED);
        let bob_notes = notifications(&db, "bob").await;
        assert_eq!(bob_notes[0].kind, notification_types::BORROW_DECLINED);

        let borrows = BorrowRepository::new(db.clone());
        assert!(borrows.find_open("b1", "bob").await.unwrap().is_none());
        assert!(matches!(
            lending.request_borrow("b1", &bob, None).await,
            Err(LeafError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_return_makes_book_available() {
        let db = db();
        let owner = insert_user(&db, "owner", "owner").await;
        let reader = insert_user(&db, "reader", "reader").await;
        insert_book(&db, "b1", "Dune", Some("owner")).await;
        let lending = service(&db);

        lending.request_borrow("b1", &reader, None).await.unwrap();
        assert!(matches!(
            lending.return_book("b1", &reader).await,
            Err(LeafError::InvalidRequest(_))
        ));

        lending.approve("b1", &owner, "reader", None).await.unwrap();
        assert!(matches!(
            lending.cancel("b1", &reader).await,
            Err(LeafError::InvalidRequest(_))
        ));

        let record = lending.return_book("b1", &reader).await.unwrap();
        assert!(record.is_returned);
        assert!(record.returned_date.is_some());
        assert!(is_available(&db, "b1").await);

        let notes = notifications(&db, "owner").await;
        assert!(notes.iter().any(|n| n.kind == notification_types::BOOK_RETURNED));

        // The same reader can ask again once the loan is closed
        lending.request_borrow("b1", &reader, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_reject_and_cancel_delete_the_request() {
        let db = db();
        let owner = insert_user(&db, "owner", "owner").await;
        let reader = insert_user(&db, "reader", "reader").await;
        insert_book(&db, "b1", "Dune", Some("owner")).await;
        let lending = service(&db);
        let borrows = BorrowRepository::new(db.clone());

        lending.request_borrow("b1", &reader, None).await.unwrap();
        lending.reject("b1", &owner, "reader").await.unwrap();
        assert!(borrows.find_open("b1", "reader").await.unwrap().is_none());
        assert_eq!(
            notifications(&db, "reader").await[0].kind,
            notification_types::BORROW_DECLINED
        );

        lending.request_borrow("b1", &reader, None).await.unwrap();
        lending.cancel("b1", &reader).await.unwrap();
        assert!(borrows.find_open("b1", "reader").await.unwrap().is_none());
        assert!(matches!(
            lending.cancel("b1", &reader).await,
            Err(LeafError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_respond_to_notification() {
        let db = db();
        let owner = insert_user(&db, "owner", "owner").await;
        let reader = insert_user(&db, "reader", "reader").await;
        insert_book(&db, "b1", "Dune", Some("owner")).await;
        let lending = service(&db);

        lending.request_borrow("b1", &reader, None).await.unwrap();
        let note = notifications(&db, "owner").await.remove(0);

        assert!(matches!(
            lending.respond_to_notification(&note.id, &reader, true).await,
            Err(LeafError::NotFound(_))
        ));

        let approval = lending
            .respond_to_notification(&note.id, &owner, true)
            .await
            .unwrap()
            .unwrap();
        assert!(approval.record.is_agreed);

        let note = NotificationRepository::new(db.clone())
            .find_by_id(&note.id)
            .await
            .unwrap()
            .unwrap();
        assert!(note.is_read);

        // Already handled
        assert!(lending
            .respond_to_notification(&note.id, &owner, false)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_admin_manages_ownerless_books() {
        let db = db();
        let mut admin = insert_user(&db, "admin", "admin").await;
        admin.role = "admin".to_string();
        let reader = insert_user(&db, "reader", "reader").await;
        insert_book(&db, "b1", "Sapiens", None).await;
        let lending = service(&db);

        lending.request_borrow("b1", &reader, None).await.unwrap();
        assert!(matches!(
            lending.approve("b1", &reader, "reader", None).await,
            Err(LeafError::PermissionDenied(_))
        ));
        lending.approve("b1", &admin, "reader", None).await.unwrap();
        assert!(!is_available(&db, "b1").await);
    }

    #[tokio::test]
    async fn test_ownerless_request_notifies_admins() {
        let db = db();
        let mut admin = user_fixture("admin", "admin");
        admin.role = "admin".to_string();
        UserRepository::new(db.clone()).create(&admin).await.unwrap();
        let reader = insert_user(&db, "reader", "reader").await;
        insert_book(&db, "b1", "Sapiens", None).await;
        insert_book(&db, "b2", "Dune", None).await;
        let lending = service(&db);

        lending.request_borrow("b1", &reader, None).await.unwrap();
        let notes = notifications(&db, "admin").await;
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, notification_types::BORROW_REQUEST);
        assert_eq!(notes[0].related_user_id.as_deref(), Some("reader"));

        let approval = lending
            .respond_to_notification(&notes[0].id, &admin, true)
            .await
            .unwrap()
            .unwrap();
        assert!(approval.record.is_agreed);

        // An admin borrowing a seeded book is not told about their own request
        lending.request_borrow("b2", &admin, None).await.unwrap();
        assert_eq!(notifications(&db, "admin").await.len(), 1);
    }
}
