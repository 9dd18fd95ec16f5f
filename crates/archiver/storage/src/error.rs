//! Error type shared by every storage backend.

use reth_db::DatabaseError;
use thiserror::Error;

/// Errors that may occur while interacting with block storage.
///
/// This enum is used across all implementations of the storage traits.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The MDBX environment rejected a read or write.
    #[error("Database error")]
    Database(#[from] DatabaseError),

    /// The database environment could not be opened.
    #[error("Failed to open database: {0}")]
    DatabaseInit(String),

    /// Filesystem error.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// A block could not be encoded or decoded.
    #[error("Codec error: {0}")]
    Codec(String),

    /// The expected entry was not found in storage.
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    /// Represents a conflict occurred while attempting to write to storage.
    #[error("Conflict error: {0}")]
    ConflictError(String),

    /// Stored data is inconsistent with its index or header.
    #[error("Corrupted storage: {0}")]
    Corrupted(String),

    /// A writer panicked while holding the storage lock.
    #[error("Storage lock poisoned")]
    LockPoisoned,
}

impl StorageError {
    /// Returns `true` if the error reports a missing entry.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::EntryNotFound(_))
    }
}

impl<T> From<std::sync::PoisonError<T>> for StorageError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::LockPoisoned
    }
}
