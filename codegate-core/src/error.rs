//! Service-level error type

use crate::directory::DirectoryError;
use crate::intake::IntakeError;
use crate::oracle::OracleError;
use crate::registry::RegistryError;
use crate::storage::StoreError;
use thiserror::Error;

/// Coarse classification used by front ends to pick a reply
///
/// "Not found" is not an error here: lookups answer `None` or `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AlreadyExists,
    OracleUnavailable,
    InvalidInput,
    /// Store or pool failure
    Storage,
}

/// Errors surfaced by `GateService`
#[derive(Debug, Error)]
pub enum GateError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Intake(#[from] IntakeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GateError::Directory(DirectoryError::AlreadyExists) => ErrorKind::AlreadyExists,
            GateError::Directory(DirectoryError::UnreachableGroup { .. }) => {
                ErrorKind::OracleUnavailable
            }
            GateError::Directory(DirectoryError::InvalidInput(_)) => ErrorKind::InvalidInput,
            GateError::Directory(DirectoryError::Store(_)) => ErrorKind::Storage,
            GateError::Registry(RegistryError::InvalidInput(_)) => ErrorKind::InvalidInput,
            GateError::Registry(RegistryError::Store(_)) => ErrorKind::Storage,
            GateError::Oracle(_) => ErrorKind::OracleUnavailable,
            GateError::Intake(_) => ErrorKind::InvalidInput,
            GateError::Store(_) => ErrorKind::Storage,
        }
    }
}

pub type GateResult<T> = Result<T, GateError>;
