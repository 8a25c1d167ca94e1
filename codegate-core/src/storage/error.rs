//! Error types for the storage layer

use thiserror::Error;

/// Errors raised by the SQL store
#[derive(Debug, Error)]
pub enum StoreError {
    /// No connection could be checked out of the pool
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// SQLite rejected or failed a statement
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored row could not be decoded
    #[error("Corrupted data: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Whether the failure is a UNIQUE / PRIMARY KEY / CHECK violation
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_violation_detection() {
        let err = StoreError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE),
            Some("UNIQUE constraint failed: content.code".to_string()),
        ));
        assert!(err.is_constraint_violation());

        let err = StoreError::Corrupt("bad row".to_string());
        assert!(!err.is_constraint_violation());
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Corrupt("unknown status 'approved'".to_string());
        assert_eq!(format!("{}", err), "Corrupted data: unknown status 'approved'");
    }
}
