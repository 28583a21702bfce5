//! Error type for `rally-db`.

use rusqlite::{ErrorCode, ffi};
use thiserror::Error;

use rally_types::error::Error as RallyError;

#[derive(Debug, Error)]
pub enum DbError {
    /// A unique or primary key constraint rejected the write.
    #[error("duplicate row: {0}")]
    Conflict(String),

    /// A foreign key points at a row that does not exist.
    #[error("missing referenced row: {0}")]
    MissingReference(String),

    /// A check or not-null constraint rejected the values.
    #[error("constraint violated: {0}")]
    Rejected(String),

    /// SQLite reported the database as busy or locked.
    #[error("database busy: {0}")]
    Busy(String),

    #[error("database lock poisoned")]
    Poisoned,

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("sqlite error: {0}")]
    Sqlite(rusqlite::Error),
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ffi::Error { extended_code, .. }, _) = &err {
            match *extended_code {
                ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    return Self::Conflict(err.to_string());
                }
                ffi::SQLITE_CONSTRAINT_FOREIGNKEY => return Self::MissingReference(err.to_string()),
                _ => {}
            }
        }

        match err.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => Self::Rejected(err.to_string()),
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                Self::Busy(err.to_string())
            }
            _ => Self::Sqlite(err),
        }
    }
}

impl From<DbError> for RallyError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Conflict(msg) => RallyError::Conflict(msg),
            DbError::MissingReference(msg) => RallyError::NotFound(msg),
            DbError::Rejected(msg) => RallyError::InvalidRequest(msg),
            DbError::Busy(msg) => RallyError::TransientStore(msg),
            other => RallyError::Internal(other.to_string()),
        }
    }
}

pub type Result<T, E = DbError> = std::result::Result<T, E>;
