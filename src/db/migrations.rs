//! Database migrations
//!
//! Versioned schema changes tracked in `schema_migrations`. Each version is applied
//! in its own transaction.

use crate::core::error::{LeafError, Result};
use rusqlite::Connection;
use tracing::{info, warn};

/// Migration version tracking table
const MIGRATION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
)
"#;

/// Accounts, catalog, lending and social tables (version 1)
const MIGRATION_V1: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    username TEXT UNIQUE NOT NULL,
    email TEXT UNIQUE NOT NULL COLLATE NOCASE,
    password_hash TEXT NOT NULL,
    first_name TEXT,
    last_name TEXT,
    description TEXT,
    role TEXT NOT NULL DEFAULT 'user',
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    last_activity TEXT
);

CREATE TABLE IF NOT EXISTS books (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    author TEXT NOT NULL,
    category TEXT NOT NULL,
    isbn TEXT UNIQUE NOT NULL,
    description TEXT,
    cover_url TEXT,
    publication_year INTEGER,
    pages INTEGER,
    available INTEGER NOT NULL DEFAULT 1,
    posted_by TEXT REFERENCES users(id) ON DELETE SET NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS borrowed_books (
    id TEXT PRIMARY KEY,
    book_id TEXT NOT NULL REFERENCES books(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    borrowed_date TEXT NOT NULL,
    due_date TEXT NOT NULL,
    agreed_due_date TEXT,
    returned_date TEXT,
    is_returned INTEGER NOT NULL DEFAULT 0,
    is_agreed INTEGER NOT NULL DEFAULT 0
);

-- At most one open record per borrower and book
CREATE UNIQUE INDEX IF NOT EXISTS idx_borrowed_books_open
    ON borrowed_books(book_id, user_id) WHERE is_returned = 0;

CREATE TABLE IF NOT EXISTS book_reviews (
    id TEXT PRIMARY KEY,
    book_id TEXT NOT NULL REFERENCES books(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
    comment TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (book_id, user_id)
);

CREATE TABLE IF NOT EXISTS user_reviews (
    id TEXT PRIMARY KEY,
    reviewer_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    reviewed_user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 10),
    comment TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (reviewer_id, reviewed_user_id),
    CHECK (reviewer_id <> reviewed_user_id)
);

CREATE TABLE IF NOT EXISTS discussions (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    username TEXT NOT NULL,
    message TEXT NOT NULL,
    book_id TEXT REFERENCES books(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS private_messages (
    id TEXT PRIMARY KEY,
    sender_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    recipient_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    message TEXT NOT NULL,
    book_id TEXT REFERENCES books(id) ON DELETE SET NULL,
    created_at TEXT NOT NULL,
    is_read INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS notifications (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    type TEXT NOT NULL,
    title TEXT NOT NULL,
    message TEXT NOT NULL,
    book_id TEXT REFERENCES books(id) ON DELETE SET NULL,
    related_user_id TEXT REFERENCES users(id) ON DELETE SET NULL,
    is_read INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS follows (
    follower_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    followed_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    PRIMARY KEY (follower_id, followed_id),
    CHECK (follower_id <> followed_id)
);
"#;

/// Gamification: achievements, points ledger, profiles and the store (version 2)
const MIGRATION_V2: &str = r#"
CREATE TABLE IF NOT EXISTS achievements (
    id TEXT PRIMARY KEY,
    name TEXT UNIQUE NOT NULL,
    description TEXT NOT NULL,
    category TEXT NOT NULL,
    points INTEGER NOT NULL DEFAULT 10,
    rule TEXT NOT NULL,
    requirement_value INTEGER NOT NULL DEFAULT 1,
    icon TEXT NOT NULL DEFAULT 'fa-trophy',
    color TEXT NOT NULL DEFAULT '#ffd700',
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user_achievements (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    achievement_id TEXT NOT NULL REFERENCES achievements(id) ON DELETE CASCADE,
    points_awarded INTEGER NOT NULL,
    unlocked_at TEXT NOT NULL,
    is_seen INTEGER NOT NULL DEFAULT 0,
    UNIQUE (user_id, achievement_id)
);

CREATE TABLE IF NOT EXISTS point_transactions (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    amount INTEGER NOT NULL,
    kind TEXT NOT NULL,
    description TEXT NOT NULL,
    reference_id TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user_profiles (
    user_id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
    banner_style TEXT NOT NULL DEFAULT 'default',
    custom_title TEXT,
    title_color TEXT NOT NULL DEFAULT '#ffffff',
    background_style TEXT NOT NULL DEFAULT 'default',
    background_overlay INTEGER NOT NULL DEFAULT 1,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS power_ups (
    id TEXT PRIMARY KEY,
    name TEXT UNIQUE NOT NULL,
    description TEXT NOT NULL,
    cost INTEGER NOT NULL,
    kind TEXT NOT NULL,
    duration_hours INTEGER NOT NULL,
    effect_value REAL NOT NULL,
    icon TEXT NOT NULL DEFAULT 'fa-bolt',
    color TEXT NOT NULL DEFAULT '#ffd700',
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user_power_ups (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    power_up_id TEXT NOT NULL REFERENCES power_ups(id) ON DELETE CASCADE,
    purchased_at TEXT NOT NULL,
    activated_at TEXT,
    expires_at TEXT,
    is_active INTEGER NOT NULL DEFAULT 0,
    is_consumed INTEGER NOT NULL DEFAULT 0,
    target_user_id TEXT REFERENCES users(id) ON DELETE SET NULL,
    leeched_points INTEGER NOT NULL DEFAULT 0
);
"#;

/// Lookup indexes (version 3)
const MIGRATION_V3: &str = r#"
CREATE INDEX IF NOT EXISTS idx_books_posted_by ON books(posted_by);
CREATE INDEX IF NOT EXISTS idx_books_category ON books(category);
CREATE INDEX IF NOT EXISTS idx_borrowed_books_user ON borrowed_books(user_id, is_returned);
CREATE INDEX IF NOT EXISTS idx_book_reviews_book ON book_reviews(book_id, created_at);
CREATE INDEX IF NOT EXISTS idx_discussions_book ON discussions(book_id, created_at);
CREATE INDEX IF NOT EXISTS idx_private_messages_pair ON private_messages(sender_id, recipient_id, created_at);
CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, is_read, created_at);
CREATE INDEX IF NOT EXISTS idx_point_transactions_user ON point_transactions(user_id);
CREATE INDEX IF NOT EXISTS idx_user_power_ups_active ON user_power_ups(is_active, expires_at);
"#;

const MIGRATIONS: &[(i64, &str, &str)] = &[
    (1, "Accounts, catalog, lending and social", MIGRATION_V1),
    (2, "Achievements, points ledger, profiles and store", MIGRATION_V2),
    (3, "Lookup indexes", MIGRATION_V3),
];

/// Run all pending database migrations
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    info!("Running database migrations");

    conn.execute_batch(MIGRATION_TABLE)
        .map_err(LeafError::DatabaseError)?;

    let current_version = current_version(conn)?;
    info!("Current database schema version: {}", current_version);

    for (version, description, sql) in MIGRATIONS {
        if current_version < *version {
            info!("Applying migration v{}: {}", version, description);
            apply_migration(conn, *version, sql)?;
        }
    }

    info!("Database migrations completed successfully");
    Ok(())
}

/// Highest applied schema version, 0 for a fresh database
pub fn current_version(conn: &Connection) -> Result<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(LeafError::DatabaseError)
}

/// Apply a single migration
fn apply_migration(conn: &mut Connection, version: i64, sql: &str) -> Result<()> {
    let tx = conn.transaction().map_err(LeafError::DatabaseError)?;

    tx.execute_batch(sql).map_err(|e| {
        warn!("Migration v{} failed: {}", version, e);
        LeafError::DatabaseError(e)
    })?;

    tx.execute("INSERT INTO schema_migrations (version) VALUES (?)", [version])
        .map_err(LeafError::DatabaseError)?;

    tx.commit().map_err(LeafError::DatabaseError)?;

    info!("Migration v{} applied successfully", version);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();

        assert_eq!(current_version(&conn).unwrap(), 3);
        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, 3);
    }

    #[test]
    fn test_open_borrow_uniqueness_is_enforced() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        conn.execute_batch(
            "INSERT INTO users (id, username, email, password_hash, created_at)
                 VALUES ('u1', 'alice', 'a@x.io', 'h', '2024-01-01T00:00:00Z');
             INSERT INTO books (id, title, author, category, isbn, created_at)
                 VALUES ('b1', 'T', 'A', 'Fiction', '1', '2024-01-01T00:00:00Z');
             INSERT INTO borrowed_books (id, book_id, user_id, borrowed_date, due_date, is_returned)
                 VALUES ('r1', 'b1', 'u1', '2024-01-01T00:00:00Z', '2024-01-15T00:00:00Z', 1);
             INSERT INTO borrowed_books (id, book_id, user_id, borrowed_date, due_date)
                 VALUES ('r2', 'b1', 'u1', '2024-02-01T00:00:00Z', '2024-02-15T00:00:00Z');",
        )
        .unwrap();

        let duplicate = conn.execute(
            "INSERT INTO borrowed_books (id, book_id, user_id, borrowed_date, due_date)
             VALUES ('r3', 'b1', 'u1', '2024-02-02T00:00:00Z', '2024-02-16T00:00:00Z')",
            [],
        );
        assert!(duplicate.is_err());
    }

    #[test]
    fn test_rating_bounds_are_checked() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        conn.execute_batch(
            "INSERT INTO users (id, username, email, password_hash, created_at)
                 VALUES ('u1', 'alice', 'a@x.io', 'h', '2024-01-01T00:00:00Z');
             INSERT INTO books (id, title, author, category, isbn, created_at)
                 VALUES ('b1', 'T', 'A', 'Fiction', '1', '2024-01-01T00:00:00Z');",
        )
        .unwrap();

        let bad = conn.execute(
            "INSERT INTO book_reviews (id, book_id, user_id, rating, created_at, updated_at)
             VALUES ('r', 'b1', 'u1', 6, 'x', 'x')",
            [],
        );
        assert!(bad.is_err());
    }
}
