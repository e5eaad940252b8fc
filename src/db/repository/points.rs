//! Points ledger
//!
//! A user's balance is never stored; it is always the sum of their ledger rows.

use super::users::full_name_of;
use crate::core::error::{LeafError, Result};
use crate::core::utils::PageRequest;
use crate::db::manager::DatabaseManager;
use crate::db::models::{PointKind, PointTransaction, UserPoints};
use rusqlite::{Connection, Row};
use std::sync::Arc;
use uuid::Uuid;

fn map_transaction(row: &Row) -> rusqlite::Result<PointTransaction> {
    Ok(PointTransaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        amount: row.get(2)?,
        kind: row.get(3)?,
        description: row.get(4)?,
        reference_id: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Append a ledger row
pub fn insert_transaction(
    conn: &Connection,
    user_id: &str,
    amount: i64,
    kind: PointKind,
    description: &str,
    reference_id: Option<&str>,
    now: &str,
) -> Result<PointTransaction> {
    let transaction = PointTransaction {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        amount,
        kind,
        description: description.to_string(),
        reference_id: reference_id.map(str::to_string),
        created_at: now.to_string(),
    };

    conn.execute(
        "INSERT INTO point_transactions (id, user_id, amount, kind, description, reference_id, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            &transaction.id,
            &transaction.user_id,
            transaction.amount,
            transaction.kind,
            &transaction.description,
            &transaction.reference_id,
            &transaction.created_at,
        ],
    )
    .map_err(LeafError::DatabaseError)?;

    Ok(transaction)
}

pub fn total_points(conn: &Connection, user_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM point_transactions WHERE user_id = ?",
        [user_id],
        |row| row.get(0),
    )
    .map_err(LeafError::DatabaseError)
}

/// Active users ordered by point total, highest first
pub fn top_users(conn: &Connection, limit: usize) -> Result<Vec<UserPoints>> {
    let mut stmt = conn
        .prepare(
            "SELECT u.id, u.username, u.first_name, u.last_name, \
                    COALESCE(SUM(t.amount), 0) AS total, u.last_activity \
             FROM users u LEFT JOIN point_transactions t ON t.user_id = u.id \
             WHERE u.is_active = 1 \
             GROUP BY u.id ORDER BY total DESC, u.username LIMIT ?",
        )
        .map_err(LeafError::DatabaseError)?;
    let users = stmt
        .query_map([limit as i64], |row| {
            let username: String = row.get(1)?;
            let first: Option<String> = row.get(2)?;
            let last: Option<String> = row.get(3)?;
            Ok(UserPoints {
                user_id: row.get(0)?,
                full_name: full_name_of(&username, first.as_deref(), last.as_deref()),
                username,
                total_points: row.get(4)?,
                last_activity: row.get(5)?,
            })
        })
        .map_err(LeafError::DatabaseError)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(LeafError::DatabaseError)?;
    Ok(users)
}

/// Read access to the ledger
pub struct PointsRepository {
    db: Arc<DatabaseManager>,
}

impl PointsRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    pub async fn total_for(&self, user_id: &str) -> Result<i64> {
        let user_id = user_id.to_string();
        self.db.execute(move |conn| total_points(conn, &user_id)).await
    }

    /// Ledger rows of a user, newest first
    pub async fn history(
        &self,
        user_id: &str,
        page: PageRequest,
    ) -> Result<(Vec<PointTransaction>, i64)> {
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| {
                let total: i64 = conn
                    .query_row(
                        "SELECT COUNT(*) FROM point_transactions WHERE user_id = ?",
                        [&user_id],
                        |row| row.get(0),
                    )
                    .map_err(LeafError::DatabaseError)?;

                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT id, user_id, amount, kind, description, reference_id, created_at \
                         FROM point_transactions WHERE user_id = ? \
                         ORDER BY created_at DESC, rowid DESC LIMIT {} OFFSET {}",
                        page.limit(),
                        page.offset()
                    ))
                    .map_err(LeafError::DatabaseError)?;
                let rows = stmt
                    .query_map([&user_id], map_transaction)
                    .map_err(LeafError::DatabaseError)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(LeafError::DatabaseError)?;

                Ok((rows, total))
            })
            .await
    }

    pub async fn leaderboard(&self, limit: usize) -> Result<Vec<UserPoints>> {
        self.db.execute(move |conn| top_users(conn, limit)).await
    }
}
