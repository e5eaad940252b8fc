use super::books::{book_columns, map_book_at};
use super::users::map_summary_at;
use crate::core::error::{LeafError, Result};
use crate::db::manager::DatabaseManager;
use crate::db::models::{Book, BorrowedBook, UserSummary};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use std::sync::Arc;

const BORROW_COLUMNS: &str = "r.id, r.book_id, r.user_id, r.borrowed_date, r.due_date, \
     r.agreed_due_date, r.returned_date, r.is_returned, r.is_agreed";

/// Number of columns in `BORROW_COLUMNS`
const BORROW_WIDTH: usize = 9;
/// Number of columns produced by `book_columns`
const BOOK_WIDTH: usize = 12;

fn map_borrow(row: &Row) -> rusqlite::Result<BorrowedBook> {
    Ok(BorrowedBook {
        id: row.get(0)?,
        book_id: row.get(1)?,
        user_id: row.get(2)?,
        borrowed_date: row.get(3)?,
        due_date: row.get(4)?,
        agreed_due_date: row.get(5)?,
        returned_date: row.get(6)?,
        is_returned: row.get(7)?,
        is_agreed: row.get(8)?,
    })
}

/// A borrow record joined with its book and the borrowing user
#[derive(Debug, Clone, Serialize)]
pub struct BorrowDetails {
    pub record: BorrowedBook,
    pub book: Book,
    pub borrower: UserSummary,
}

fn map_details(row: &Row) -> rusqlite::Result<BorrowDetails> {
    Ok(BorrowDetails {
        record: map_borrow(row)?,
        book: map_book_at(row, BORROW_WIDTH)?,
        borrower: map_summary_at(row, BORROW_WIDTH + BOOK_WIDTH)?,
    })
}

fn details_query(condition: &str, order: &str) -> String {
    format!(
        "SELECT {}, {}, u.id, u.username, u.first_name, u.last_name \
         FROM borrowed_books r \
         JOIN books b ON b.id = r.book_id \
         JOIN users u ON u.id = r.user_id \
         WHERE {} ORDER BY {}",
        BORROW_COLUMNS,
        book_columns("b"),
        condition,
        order
    )
}

fn query_details(conn: &Connection, sql: &str, user_id: &str) -> Result<Vec<BorrowDetails>> {
    let mut stmt = conn.prepare(sql).map_err(LeafError::DatabaseError)?;
    let rows = stmt
        .query_map([user_id], map_details)
        .map_err(LeafError::DatabaseError)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(LeafError::DatabaseError)?;
    Ok(rows)
}

pub fn insert_borrow(conn: &Connection, record: &BorrowedBook) -> Result<()> {
    conn.execute(
        "INSERT INTO borrowed_books (id, book_id, user_id, borrowed_date, due_date, \
         agreed_due_date, returned_date, is_returned, is_agreed) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            &record.id,
            &record.book_id,
            &record.user_id,
            &record.borrowed_date,
            &record.due_date,
            &record.agreed_due_date,
            &record.returned_date,
            record.is_returned,
            record.is_agreed,
        ],
    )
    .map_err(|e| {
        LeafError::on_unique_violation(e, "You already have an open request for this book")
    })?;
    Ok(())
}

/// The unreturned record of `user_id` for `book_id`, requested or agreed
pub fn find_open(conn: &Connection, book_id: &str, user_id: &str) -> Result<Option<BorrowedBook>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM borrowed_books r WHERE r.book_id = ? AND r.user_id = ? AND r.is_returned = 0",
            BORROW_COLUMNS
        ),
        [book_id, user_id],
        map_borrow,
    )
    .optional()
    .map_err(LeafError::DatabaseError)
}

/// Pending (not yet agreed) requests for a book, oldest first
pub fn pending_for_book(conn: &Connection, book_id: &str) -> Result<Vec<BorrowedBook>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM borrowed_books r \
             WHERE r.book_id = ? AND r.is_agreed = 0 AND r.is_returned = 0 \
             ORDER BY r.borrowed_date",
            BORROW_COLUMNS
        ))
        .map_err(LeafError::DatabaseError)?;
    let rows = stmt
        .query_map([book_id], map_borrow)
        .map_err(LeafError::DatabaseError)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(LeafError::DatabaseError)?;
    Ok(rows)
}

pub fn approve(conn: &Connection, record_id: &str, agreed_due_date: &str) -> Result<()> {
    conn.execute(
        "UPDATE borrowed_books SET is_agreed = 1, agreed_due_date = ? WHERE id = ?",
        [agreed_due_date, record_id],
    )
    .map_err(LeafError::DatabaseError)?;
    Ok(())
}

pub fn mark_returned(conn: &Connection, record_id: &str, returned_at: &str) -> Result<()> {
    conn.execute(
        "UPDATE borrowed_books SET is_returned = 1, returned_date = ? WHERE id = ?",
        [returned_at, record_id],
    )
    .map_err(LeafError::DatabaseError)?;
    Ok(())
}

pub fn delete_record(conn: &Connection, record_id: &str) -> Result<()> {
    conn.execute("DELETE FROM borrowed_books WHERE id = ?", [record_id])
        .map_err(LeafError::DatabaseError)?;
    Ok(())
}

/// Agreed loans of books posted by `owner_id`, returned ones included
pub fn count_lent_by_owner(conn: &Connection, owner_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM borrowed_books r JOIN books b ON b.id = r.book_id \
         WHERE b.posted_by = ? AND r.is_agreed = 1",
        [owner_id],
        |row| row.get(0),
    )
    .map_err(LeafError::DatabaseError)
}

/// Read side of the lending workflow
pub struct BorrowRepository {
    db: Arc<DatabaseManager>,
}

impl BorrowRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<BorrowedBook>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                conn.query_row(
                    &format!("SELECT {} FROM borrowed_books r WHERE r.id = ?", BORROW_COLUMNS),
                    [&id],
                    map_borrow,
                )
                .optional()
                .map_err(LeafError::DatabaseError)
            })
            .await
    }

    pub async fn find_open(&self, book_id: &str, user_id: &str) -> Result<Option<BorrowedBook>> {
        let book_id = book_id.to_string();
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| find_open(conn, &book_id, &user_id))
            .await
    }

    pub async fn find_pending_for_book(&self, book_id: &str) -> Result<Vec<BorrowedBook>> {
        let book_id = book_id.to_string();
        self.db
            .execute(move |conn| pending_for_book(conn, &book_id))
            .await
    }

    /// Agreed, unreturned loans held by the user, soonest due first
    pub async fn active_loans_for_user(&self, user_id: &str) -> Result<Vec<BorrowDetails>> {
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                let sql = details_query(
                    "r.user_id = ? AND r.is_agreed = 1 AND r.is_returned = 0",
                    "COALESCE(r.agreed_due_date, r.due_date)",
                );
                query_details(conn, &sql, &user_id)
            })
            .await
    }

    /// Requests the user sent that the owner has not answered yet
    pub async fn outgoing_pending(&self, user_id: &str) -> Result<Vec<BorrowDetails>> {
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                let sql = details_query(
                    "r.user_id = ? AND r.is_agreed = 0 AND r.is_returned = 0",
                    "r.borrowed_date DESC",
                );
                query_details(conn, &sql, &user_id)
            })
            .await
    }

    /// Pending requests for books posted by `owner_id`
    pub async fn incoming_requests(&self, owner_id: &str) -> Result<Vec<BorrowDetails>> {
        let owner_id = owner_id.to_string();
        self.db
            .execute(move |conn| {
                let sql = details_query(
                    "b.posted_by = ? AND r.is_agreed = 0 AND r.is_returned = 0",
                    "r.borrowed_date DESC",
                );
                query_details(conn, &sql, &owner_id)
            })
            .await
    }

    pub async fn count_lent_by_owner(&self, owner_id: &str) -> Result<i64> {
        let owner_id = owner_id.to_string();
        self.db
            .execute(move |conn| count_lent_by_owner(conn, &owner_id))
            .await
    }
}
