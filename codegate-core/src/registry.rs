//! Content registry: code-keyed content records
//!
//! The registry is the source of truth for what can be delivered. Removing
//! a record here is authoritative; cleaning up its mirrored copy is the
//! caller's follow-up (see `GateService::remove_content`).

use crate::metrics::{CONTENT_REGISTERED, CONTENT_REMOVED};
use crate::storage::{SqlStore, StoreError};
use crate::types::{ContentRecord, NewContent};
use metrics::counter;
use thiserror::Error;
use tracing::info;

/// Longest accepted content code
pub const MAX_CODE_LEN: usize = 64;

/// Content registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// Result of a registry removal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub removed: bool,
    pub record: Option<ContentRecord>,
}

/// Trim and check a content code
pub fn normalize_code(code: &str) -> Result<String, RegistryError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(RegistryError::InvalidInput("code cannot be empty".into()));
    }
    if code.chars().any(char::is_whitespace) {
        return Err(RegistryError::InvalidInput("code cannot contain whitespace".into()));
    }
    if code.chars().count() > MAX_CODE_LEN {
        return Err(RegistryError::InvalidInput(format!(
            "code longer than {MAX_CODE_LEN} characters"
        )));
    }
    Ok(code.to_string())
}

/// Check a registration payload, returning the normalized code
pub fn validate(content: &NewContent) -> Result<String, RegistryError> {
    let code = normalize_code(&content.code)?;
    if content.artifact_ref.as_str().trim().is_empty() {
        return Err(RegistryError::InvalidInput("artifact reference is required".into()));
    }
    Ok(code)
}

fn normalize_text(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

/// Code-keyed create / lookup / delete over the `content` table
#[derive(Clone)]
pub struct ContentRegistry {
    store: SqlStore,
}

impl ContentRegistry {
    pub fn new(store: SqlStore) -> Self {
        Self { store }
    }

    /// Register a content item; `Ok(false)` if the code is already taken
    ///
    /// Input is validated before anything is written. Concurrent
    /// registrations of one code are decided by the primary key: exactly one
    /// insert wins.
    pub fn register(&self, content: NewContent) -> Result<bool, RegistryError> {
        let code = validate(&content)?;
        let content = NewContent {
            code,
            title: normalize_text(content.title),
            description: normalize_text(content.description),
            ..content
        };

        let created = self.store.insert_content(&content)?;
        if created {
            counter!(CONTENT_REGISTERED).increment(1);
            info!(code = %content.code, "Content registered");
        }
        Ok(created)
    }

    pub fn lookup(&self, code: &str) -> Result<Option<ContentRecord>, RegistryError> {
        Ok(self.store.get_content(code.trim())?)
    }

    /// Delete a record and hand back what was deleted
    pub fn remove(&self, code: &str) -> Result<Removal, RegistryError> {
        let record = self.store.delete_content(code.trim())?;

        if let Some(record) = &record {
            counter!(CONTENT_REMOVED).increment(1);
            info!(code = %record.code, "Content removed");
        }

        Ok(Removal { removed: record.is_some(), record })
    }

    /// All codes in registration order
    pub fn list_codes(&self) -> Result<Vec<String>, RegistryError> {
        Ok(self.store.list_content_codes()?)
    }
}
