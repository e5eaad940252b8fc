//! Power-up catalog and owned power-ups

use crate::core::error::{LeafError, Result};
use crate::db::manager::DatabaseManager;
use crate::db::models::{PowerUp, PowerUpKind, UserPowerUp};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use std::sync::Arc;

const POWER_UP_COLUMNS: &str = "id, name, description, cost, kind, duration_hours, effect_value, \
     icon, color, is_active, created_at";

const OWNED_COLUMNS: &str = "up.id, up.user_id, up.power_up_id, up.purchased_at, up.activated_at, \
     up.expires_at, up.is_active, up.is_consumed, up.target_user_id, up.leeched_points";

fn map_power_up_at(row: &Row, o: usize) -> rusqlite::Result<PowerUp> {
    Ok(PowerUp {
        id: row.get(o)?,
        name: row.get(o + 1)?,
        description: row.get(o + 2)?,
        cost: row.get(o + 3)?,
        kind: row.get(o + 4)?,
        duration_hours: row.get(o + 5)?,
        effect_value: row.get(o + 6)?,
        icon: row.get(o + 7)?,
        color: row.get(o + 8)?,
        is_active: row.get(o + 9)?,
        created_at: row.get(o + 10)?,
    })
}

fn map_owned(row: &Row) -> rusqlite::Result<UserPowerUp> {
    Ok(UserPowerUp {
        id: row.get(0)?,
        user_id: row.get(1)?,
        power_up_id: row.get(2)?,
        purchased_at: row.get(3)?,
        activated_at: row.get(4)?,
        expires_at: row.get(5)?,
        is_active: row.get(6)?,
        is_consumed: row.get(7)?,
        target_user_id: row.get(8)?,
        leeched_points: row.get(9)?,
    })
}

/// An owned power-up with its catalog entry
#[derive(Debug, Clone, Serialize)]
pub struct OwnedPowerUp {
    pub owned: UserPowerUp,
    pub power_up: PowerUp,
}

fn query_owned(conn: &Connection, condition: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<OwnedPowerUp>> {
    let power_up_columns = POWER_UP_COLUMNS
        .split(", ")
        .map(|c| format!("p.{}", c))
        .collect::<Vec<_>>()
        .join(", ");
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {}, {} FROM user_power_ups up JOIN power_ups p ON p.id = up.power_up_id \
             WHERE {} ORDER BY up.purchased_at DESC, up.rowid DESC",
            OWNED_COLUMNS, power_up_columns, condition
        ))
        .map_err(LeafError::DatabaseError)?;
    let rows = stmt
        .query_map(params, |row| {
            Ok(OwnedPowerUp {
                owned: map_owned(row)?,
                power_up: map_power_up_at(row, 10)?,
            })
        })
        .map_err(LeafError::DatabaseError)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(LeafError::DatabaseError)?;
    Ok(rows)
}

/// Purchasable power-ups, cheapest first
pub fn active_catalog(conn: &Connection) -> Result<Vec<PowerUp>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM power_ups WHERE is_active = 1 ORDER BY cost, name",
            POWER_UP_COLUMNS
        ))
        .map_err(LeafError::DatabaseError)?;
    let power_ups = stmt
        .query_map([], |row| map_power_up_at(row, 0))
        .map_err(LeafError::DatabaseError)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(LeafError::DatabaseError)?;
    Ok(power_ups)
}

pub fn find_power_up(conn: &Connection, id: &str) -> Result<Option<PowerUp>> {
    conn.query_row(
        &format!("SELECT {} FROM power_ups WHERE id = ?", POWER_UP_COLUMNS),
        [id],
        |row| map_power_up_at(row, 0),
    )
    .optional()
    .map_err(LeafError::DatabaseError)
}

pub fn find_owned(conn: &Connection, id: &str) -> Result<Option<OwnedPowerUp>> {
    Ok(query_owned(conn, "up.id = ?", rusqlite::params![id])?.into_iter().next())
}

/// Everything the user owns, newest purchase first
pub fn query_owned_by_user(conn: &Connection, user_id: &str) -> Result<Vec<OwnedPowerUp>> {
    query_owned(conn, "up.user_id = ?", rusqlite::params![user_id])
}

pub fn insert_user_power_up(conn: &Connection, owned: &UserPowerUp) -> Result<()> {
    conn.execute(
        "INSERT INTO user_power_ups (id, user_id, power_up_id, purchased_at, activated_at, \
         expires_at, is_active, is_consumed, target_user_id, leeched_points) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            &owned.id,
            &owned.user_id,
            &owned.power_up_id,
            &owned.purchased_at,
            &owned.activated_at,
            &owned.expires_at,
            owned.is_active,
            owned.is_consumed,
            &owned.target_user_id,
            owned.leeched_points,
        ],
    )
    .map_err(LeafError::DatabaseError)?;
    Ok(())
}

/// Stop every running leech of the user; returns how many were stopped
pub fn cancel_active_leeches(conn: &Connection, user_id: &str, now: &str) -> Result<usize> {
    conn.execute(
        "UPDATE user_power_ups SET is_active = 0, is_consumed = 1, expires_at = ?1 \
         WHERE user_id = ?2 AND is_active = 1 \
         AND power_up_id IN (SELECT id FROM power_ups WHERE kind = ?3)",
        rusqlite::params![now, user_id, PowerUpKind::Leech],
    )
    .map_err(LeafError::DatabaseError)
}

/// Whether the user owns an instance of `kind` that has not run out yet.
/// Instances never activated count as unexpired.
pub fn has_unexpired_of_kind(
    conn: &Connection,
    user_id: &str,
    kind: PowerUpKind,
    now: &str,
) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM user_power_ups up JOIN power_ups p ON p.id = up.power_up_id \
         WHERE up.user_id = ?1 AND p.kind = ?2 AND up.is_consumed = 0 \
         AND (up.expires_at IS NULL OR up.expires_at > ?3))",
        rusqlite::params![user_id, kind, now],
        |row| row.get(0),
    )
    .map_err(LeafError::DatabaseError)
}

pub fn activate(
    conn: &Connection,
    id: &str,
    activated_at: &str,
    expires_at: &str,
    target_user_id: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE user_power_ups SET is_active = 1, activated_at = ?, expires_at = ?, \
         target_user_id = ? WHERE id = ?",
        rusqlite::params![activated_at, expires_at, target_user_id, id],
    )
    .map_err(LeafError::DatabaseError)?;
    Ok(())
}

/// Active, unexpired leeches
pub fn running_leeches(conn: &Connection, now: &str) -> Result<Vec<OwnedPowerUp>> {
    query_owned(
        conn,
        "up.is_active = 1 AND p.kind = ? AND up.expires_at > ?",
        rusqlite::params![PowerUpKind::Leech, now],
    )
}

/// Deactivate everything past its expiry; returns how many were switched off
pub fn expire_stale(conn: &Connection, now: &str) -> Result<usize> {
    conn.execute(
        "UPDATE user_power_ups SET is_active = 0, is_consumed = 1 \
         WHERE is_active = 1 AND expires_at IS NOT NULL AND expires_at <= ?",
        [now],
    )
    .map_err(LeafError::DatabaseError)
}

pub fn set_target(conn: &Connection, id: &str, target_user_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE user_power_ups SET target_user_id = ? WHERE id = ?",
        [target_user_id, id],
    )
    .map_err(LeafError::DatabaseError)?;
    Ok(())
}

pub fn add_leeched_points(conn: &Connection, id: &str, amount: i64) -> Result<()> {
    conn.execute(
        "UPDATE user_power_ups SET leeched_points = leeched_points + ? WHERE id = ?",
        rusqlite::params![amount, id],
    )
    .map_err(LeafError::DatabaseError)?;
    Ok(())
}

/// Highest running double-points multiplier of the user, 1.0 without one
pub fn points_multiplier(conn: &Connection, user_id: &str, now: &str) -> Result<f64> {
    let multiplier: Option<f64> = conn
        .query_row(
            "SELECT MAX(p.effect_value) FROM user_power_ups up JOIN power_ups p ON p.id = up.power_up_id \
             WHERE up.user_id = ?1 AND p.kind = ?2 AND up.is_active = 1 AND up.expires_at > ?3",
            rusqlite::params![user_id, PowerUpKind::DoublePoints, now],
            |row| row.get(0),
        )
        .map_err(LeafError::DatabaseError)?;
    Ok(multiplier.unwrap_or(1.0).max(1.0))
}

/// Store catalog and inventory
pub struct PowerUpRepository {
    db: Arc<DatabaseManager>,
}

impl PowerUpRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    pub async fn find_all_active(&self) -> Result<Vec<PowerUp>> {
        self.db.execute(|conn| active_catalog(conn)).await
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<PowerUp>> {
        let id = id.to_string();
        self.db.execute(move |conn| find_power_up(conn, &id)).await
    }

    /// Insert unless a power-up with the same name exists
    pub async fn create(&self, power_up: &PowerUp) -> Result<bool> {
        let p = power_up.clone();
        self.db
            .execute(move |conn| {
                let inserted = conn
                    .execute(
                        &format!(
                            "INSERT OR IGNORE INTO power_ups ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                            POWER_UP_COLUMNS
                        ),
                        rusqlite::params![
                            &p.id,
                            &p.name,
                            &p.description,
                            p.cost,
                            p.kind,
                            p.duration_hours,
                            p.effect_value,
                            &p.icon,
                            &p.color,
                            p.is_active,
                            &p.created_at,
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
                conn.query_row("SELECT COUNT(*) FROM power_ups", [], |row| row.get(0))
                    .map_err(LeafError::DatabaseError)
            })
            .await
    }

    pub async fn owned_by_user(&self, user_id: &str) -> Result<Vec<OwnedPowerUp>> {
        let user_id = user_id.to_string();
        self.db
            .execute(move |conn| query_owned_by_user(conn, &user_id))
            .await
    }

    pub async fn find_owned(&self, id: &str) -> Result<Option<OwnedPowerUp>> {
        let id = id.to_string();
        self.db.execute(move |conn| find_owned(conn, &id)).await
    }

    pub async fn points_multiplier(&self, user_id: &str, now: &str) -> Result<f64> {
        let user_id = user_id.to_string();
        let now = now.to_string();
        self.db
            .execute(move |conn| points_multiplier(conn, &user_id, &now))
            .await
    }
}
