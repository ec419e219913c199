use thiserror::Error;

/// Errors that can occur within the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A job with this name already exists.
    #[error("Job name already taken: {name}")]
    DuplicateName { name: String },

    /// A job with this id already exists.
    #[error("Job id already taken: {id}")]
    DuplicateId { id: String },

    /// No job with the given ID exists in the store.
    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    /// A status column held a value outside the known set.
    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    /// The uploaded database could not be imported.
    #[error("{0}")]
    Import(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
