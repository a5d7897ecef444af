use thiserror::Error;

use crate::models::ReviewStatus;

#[derive(Error, Debug)]
pub enum CareError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid data: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Transaction {transaction_id} is already {status}; undo it before deciding again")]
    AlreadyDecided {
        transaction_id: i64,
        status: ReviewStatus,
    },

    #[error("Inconsistent link between expense {expense_id} and transaction {transaction_id}: {detail} (run `carekeep reconcile`)")]
    InconsistentState {
        expense_id: i64,
        transaction_id: i64,
        detail: String,
    },

    #[error("Backend unavailable: {0}")]
    Dependency(String),

    #[error("Care recipient {recipient_id} is referenced by {expenses} expense(s)")]
    RecipientInUse { recipient_id: i64, expenses: i64 },

    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, CareError>;
