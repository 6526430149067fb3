//! Error type shared by the store, the index, search and ingestion.

/// Errors produced by the `chessdb` library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid board encoding: {0}")]
    Decode(#[from] chess::DecodeError),

    #[error(transparent)]
    PatternSyntax(#[from] chess::PatternSyntaxError),

    #[error("Cannot replay game: {0}")]
    Replay(#[from] chess::ReplayError),

    /// A batch transaction could not be started or committed. Every game of
    /// the batch is counted as failed.
    #[error("Transaction failed: {0}")]
    TransactionFailure(#[source] sqlx::Error),

    #[error("Position {position_id} has {actual} index rows, expected {expected}")]
    IndexInconsistency {
        position_id: i64,
        expected: usize,
        actual: usize,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid page request: page {page}, page size {page_size} (both start at 1)")]
    InvalidPage { page: u32, page_size: u32 },

    #[error("Fingerprint key table is corrupt: expected {expected} keys, found {found}")]
    CorruptKeyTable { expected: usize, found: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
