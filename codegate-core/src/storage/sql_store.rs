//! SQL-based storage implementation for the gate tables

use super::error::StoreError;
use crate::types::{
    ApprovalStatus, ArtifactRef, ContentRecord, GroupEntry, GroupId, MirrorLocator, NewContent,
    PendingApproval, Timestamp, UserId,
};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row};
use std::path::Path;
use std::time::Duration;

/// SQL-based storage for content, gating groups and pending approvals
///
/// Cheap to clone; clones share the same connection pool.
#[derive(Clone)]
pub struct SqlStore {
    pool: Pool<SqliteConnectionManager>,
}

fn init_connection(
    busy_timeout: Duration,
) -> impl Fn(&mut rusqlite::Connection) -> Result<(), rusqlite::Error> + Send + Sync + 'static {
    move |conn| {
        // Writers wait on each other instead of failing with SQLITE_BUSY
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
    }
}

impl SqlStore {
    /// Create a new SQL store with the given connection pool
    pub fn new(pool: Pool<SqliteConnectionManager>) -> Result<Self, StoreError> {
        super::migrations::migrate(&pool)?;

        Ok(Self { pool })
    }

    /// Open (or create) a database file
    pub fn open(
        path: impl AsRef<Path>,
        pool_size: u32,
        busy_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let manager =
            SqliteConnectionManager::file(path.as_ref()).with_init(init_connection(busy_timeout));
        let pool = Pool::builder().max_size(pool_size).build(manager)?;

        Self::new(pool)
    }

    /// Create a new in-memory store
    ///
    /// Every SQLite memory connection is a separate database, so the pool
    /// holds exactly one connection.
    pub fn memory() -> Result<Self, StoreError> {
        let manager =
            SqliteConnectionManager::memory().with_init(init_connection(Duration::from_secs(5)));
        // A recycled connection would be a fresh, unmigrated database
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)?;

        Self::new(pool)
    }

    // ===== Content Operations =====

    /// Insert a content record; `Ok(false)` if the code is taken
    pub fn insert_content(&self, content: &NewContent) -> Result<bool, StoreError> {
        let conn = self.pool.get()?;

        let result = conn.execute(
            "INSERT INTO content
                 (code, artifact_ref, backing_locator, backing_group, title, description, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                &content.code,
                content.artifact_ref.as_str(),
                content.backing_locator.map(|l| l.0),
                content.backing_group.map(|g| g.0),
                &content.title,
                &content.description,
                Timestamp::now().as_millis() as i64,
            ],
        );

        match result {
            Ok(_) => Ok(true),
            Err(e) => {
                let err = StoreError::from(e);
                if err.is_constraint_violation() {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Get a content record by code
    pub fn get_content(&self, code: &str) -> Result<Option<ContentRecord>, StoreError> {
        let conn = self.pool.get()?;

        let record = conn
            .query_row(
                "SELECT code, artifact_ref, backing_locator, title, description, backing_group
                 FROM content WHERE code = ?",
                params![code],
                content_from_row,
            )
            .optional()?;

        Ok(record)
    }

    /// Delete a content record, returning the row that was removed
    ///
    /// Lookup and deletion are one statement, so two concurrent removals of
    /// the same code cannot both observe the record.
    pub fn delete_content(&self, code: &str) -> Result<Option<ContentRecord>, StoreError> {
        let conn = self.pool.get()?;

        let record = conn
            .query_row(
                "DELETE FROM content WHERE code = ?
                 RETURNING code, artifact_ref, backing_locator, title, description, backing_group",
                params![code],
                content_from_row,
            )
            .optional()?;

        Ok(record)
    }

    /// List all content codes in registration order
    pub fn list_content_codes(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.pool.get()?;

        let mut stmt = conn.prepare("SELECT code FROM content ORDER BY rowid")?;
        let codes = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(codes)
    }

    // ===== Gating Group Operations =====

    /// Insert a gating group; `Ok(false)` if the reference or group id is taken
    pub fn insert_group(&self, entry: &GroupEntry) -> Result<bool, StoreError> {
        let conn = self.pool.get()?;

        let result = conn.execute(
            "INSERT INTO gating_groups (reference, group_id, created_at) VALUES (?, ?, ?)",
            params![
                &entry.reference,
                entry.group_id.0,
                Timestamp::now().as_millis() as i64,
            ],
        );

        match result {
            Ok(_) => Ok(true),
            Err(e) => {
                let err = StoreError::from(e);
                if err.is_constraint_violation() {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Change a group's reference; `Ok(false)` if the old reference is unknown
    ///
    /// A collision with another group's reference surfaces as a constraint
    /// violation error.
    pub fn update_group_reference(
        &self,
        old_reference: &str,
        new_reference: &str,
    ) -> Result<bool, StoreError> {
        let conn = self.pool.get()?;

        let rows = conn.execute(
            "UPDATE gating_groups SET reference = ? WHERE reference = ?",
            params![new_reference, old_reference],
        )?;

        Ok(rows > 0)
    }

    /// Get a gating group by its public reference
    pub fn group_by_reference(&self, reference: &str) -> Result<Option<GroupEntry>, StoreError> {
        let conn = self.pool.get()?;

        let entry = conn
            .query_row(
                "SELECT reference, group_id FROM gating_groups WHERE reference = ?",
                params![reference],
                group_from_row,
            )
            .optional()?;

        Ok(entry)
    }

    /// Get a gating group by its external id
    pub fn group_by_id(&self, group_id: GroupId) -> Result<Option<GroupEntry>, StoreError> {
        let conn = self.pool.get()?;

        let entry = conn
            .query_row(
                "SELECT reference, group_id FROM gating_groups WHERE group_id = ?",
                params![group_id.0],
                group_from_row,
            )
            .optional()?;

        Ok(entry)
    }

    /// List gating groups in insertion order
    pub fn list_groups(&self) -> Result<Vec<GroupEntry>, StoreError> {
        let conn = self.pool.get()?;

        let mut stmt =
            conn.prepare("SELECT reference, group_id FROM gating_groups ORDER BY position")?;
        let groups = stmt
            .query_map([], group_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(groups)
    }

    /// Delete a gating group by reference; `Ok(false)` if unknown
    pub fn delete_group(&self, reference: &str) -> Result<bool, StoreError> {
        let conn = self.pool.get()?;

        let rows = conn.execute(
            "DELETE FROM gating_groups WHERE reference = ?",
            params![reference],
        )?;

        Ok(rows > 0)
    }

    // ===== Pending Approval Operations =====

    /// Insert or refresh a pending join request
    pub fn upsert_pending(
        &self,
        user_id: UserId,
        group_id: GroupId,
        requested_at: Timestamp,
    ) -> Result<(), StoreError> {
        let conn = self.pool.get()?;

        conn.execute(
            "INSERT INTO pending_approvals (user_id, group_id, status, requested_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, group_id)
             DO UPDATE SET status = excluded.status, requested_at = excluded.requested_at",
            params![
                user_id.0,
                group_id.0,
                ApprovalStatus::Pending.as_str(),
                requested_at.as_millis() as i64,
            ],
        )?;

        Ok(())
    }

    /// Get the pending request for a (user, group) pair
    pub fn get_pending(
        &self,
        user_id: UserId,
        group_id: GroupId,
    ) -> Result<Option<PendingApproval>, StoreError> {
        let conn = self.pool.get()?;

        let row = conn
            .query_row(
                "SELECT user_id, group_id, status, requested_at
                 FROM pending_approvals WHERE user_id = ? AND group_id = ?",
                params![user_id.0, group_id.0],
                raw_pending_from_row,
            )
            .optional()?;

        row.map(RawPending::into_approval).transpose()
    }

    /// Whether a pending request exists for a (user, group) pair
    pub fn has_pending(&self, user_id: UserId, group_id: GroupId) -> Result<bool, StoreError> {
        let conn = self.pool.get()?;

        let found = conn
            .query_row(
                "SELECT 1 FROM pending_approvals
                 WHERE user_id = ? AND group_id = ? AND status = ?",
                params![user_id.0, group_id.0, ApprovalStatus::Pending.as_str()],
                |_| Ok(()),
            )
            .optional()?;

        Ok(found.is_some())
    }

    /// Delete the pending request for a (user, group) pair; `Ok(false)` if absent
    pub fn delete_pending(&self, user_id: UserId, group_id: GroupId) -> Result<bool, StoreError> {
        let conn = self.pool.get()?;

        let rows = conn.execute(
            "DELETE FROM pending_approvals WHERE user_id = ? AND group_id = ?",
            params![user_id.0, group_id.0],
        )?;

        Ok(rows > 0)
    }

    /// List every pending request of a user, oldest first
    pub fn pending_for_user(&self, user_id: UserId) -> Result<Vec<PendingApproval>, StoreError> {
        let conn = self.pool.get()?;

        let mut stmt = conn.prepare(
            "SELECT user_id, group_id, status, requested_at
             FROM pending_approvals WHERE user_id = ? ORDER BY requested_at, group_id",
        )?;
        let rows = stmt
            .query_map(params![user_id.0], raw_pending_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(RawPending::into_approval).collect()
    }
}

fn content_from_row(row: &Row<'_>) -> Result<ContentRecord, rusqlite::Error> {
    Ok(ContentRecord {
        code: row.get(0)?,
        artifact_ref: ArtifactRef(row.get(1)?),
        backing_locator: row.get::<_, Option<i64>>(2)?.map(MirrorLocator),
        title: row.get(3)?,
        description: row.get(4)?,
        backing_group: row.get::<_, Option<i64>>(5)?.map(GroupId),
    })
}

fn group_from_row(row: &Row<'_>) -> Result<GroupEntry, rusqlite::Error> {
    Ok(GroupEntry {
        reference: row.get(0)?,
        group_id: GroupId(row.get(1)?),
    })
}

struct RawPending {
    user_id: i64,
    group_id: i64,
    status: String,
    requested_at: i64,
}

impl RawPending {
    fn into_approval(self) -> Result<PendingApproval, StoreError> {
        let status = ApprovalStatus::parse(&self.status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown status '{}'", self.status)))?;

        Ok(PendingApproval {
            user_id: UserId(self.user_id),
            group_id: GroupId(self.group_id),
            status,
            requested_at: Timestamp::from_millis(self.requested_at.max(0) as u64),
        })
    }
}

fn raw_pending_from_row(row: &Row<'_>) -> Result<RawPending, rusqlite::Error> {
    Ok(RawPending {
        user_id: row.get(0)?,
        group_id: row.get(1)?,
        status: row.get(2)?,
        requested_at: row.get(3)?,
    })
}
