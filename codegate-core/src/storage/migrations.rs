//! Database migrations for the gate schema
//!
//! Each migration is applied atomically and tracked in the
//! `codegate_schema_version` table. New columns or tables get a new
//! migration; existing ones are never edited in place.

use crate::types::Timestamp;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use tracing::info;

use super::error::StoreError;

/// Current schema version
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Migration descriptor
pub struct Migration {
    pub version: i32,
    pub description: &'static str,
    pub up_sql: &'static str,
}

/// All available migrations in order
pub fn get_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Content registry, gating groups and pending approvals",
            up_sql: r#"
                -- Content items addressed by a user-supplied code
                CREATE TABLE IF NOT EXISTS content (
                    code TEXT PRIMARY KEY,
                    artifact_ref TEXT NOT NULL,
                    backing_locator INTEGER,            -- message id of the mirror, if any
                    title TEXT,
                    description TEXT,
                    created_at INTEGER NOT NULL
                );

                -- Gating groups; position keeps insertion order across renames
                CREATE TABLE IF NOT EXISTS gating_groups (
                    position INTEGER PRIMARY KEY AUTOINCREMENT,
                    reference TEXT NOT NULL UNIQUE,
                    group_id INTEGER NOT NULL UNIQUE,
                    created_at INTEGER NOT NULL
                );

                -- Outstanding join requests, one row per (user, group)
                CREATE TABLE IF NOT EXISTS pending_approvals (
                    user_id INTEGER NOT NULL,
                    group_id INTEGER NOT NULL,
                    status TEXT NOT NULL DEFAULT 'pending' CHECK(status IN ('pending')),
                    requested_at INTEGER NOT NULL,
                    PRIMARY KEY (user_id, group_id)
                );

                CREATE INDEX IF NOT EXISTS idx_pending_approvals_user ON pending_approvals(user_id);
            "#,
        },
        Migration {
            version: 2,
            description: "Storage group of each mirrored artifact",
            up_sql: r#"
                ALTER TABLE content ADD COLUMN backing_group INTEGER;
            "#,
        },
    ]
}

fn ensure_version_table(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS codegate_schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;
    Ok(())
}

/// Get current schema version from database
pub fn get_current_version(pool: &Pool<SqliteConnectionManager>) -> Result<i32, StoreError> {
    let conn = pool.get()?;
    ensure_version_table(&conn)?;

    let version: Option<i32> = conn.query_row(
        "SELECT MAX(version) FROM codegate_schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version.unwrap_or(0))
}

/// Run all pending migrations
pub fn migrate(pool: &Pool<SqliteConnectionManager>) -> Result<(), StoreError> {
    let current_version = get_current_version(pool)?;

    let pending: Vec<_> = get_migrations()
        .into_iter()
        .filter(|m| m.version > current_version)
        .collect();

    if pending.is_empty() {
        return Ok(());
    }

    let conn = pool.get()?;

    for migration in pending {
        let tx = conn.unchecked_transaction()?;

        tx.execute_batch(migration.up_sql)?;
        tx.execute(
            "INSERT INTO codegate_schema_version (version, applied_at) VALUES (?, ?)",
            params![migration.version, Timestamp::now().as_millis() as i64],
        )?;

        tx.commit()?;

        info!(
            version = migration.version,
            "Applied migration: {}", migration.description
        );
    }

    Ok(())
}

/// Get the latest migration version available
pub fn get_latest_version() -> i32 {
    get_migrations().iter().map(|m| m.version).max().unwrap_or(0)
}
