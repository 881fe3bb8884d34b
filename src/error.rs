//! Error type shared by the storage and editing layers

use crate::models::{ExpenseId, GeneratorId};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("generator {0} not found")]
    GeneratorNotFound(GeneratorId),

    #[error("expense {expense} not found on generator {generator}")]
    ExpenseNotFound {
        generator: GeneratorId,
        expense: ExpenseId,
    },

    #[error("history entry {0} not found")]
    HistoryNotFound(i64),

    #[error("invalid time entry '{0}': expected H or H:MM")]
    InvalidTime(String),

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("invalid timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
