use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Insufficient stock for {product}: have {available}, need {requested}")]
    InsufficientStock {
        product: String,
        available: i64,
        requested: i64,
    },

    #[error("Payment of {amount:.2} exceeds outstanding balance of {balance:.2}")]
    Overpayment { amount: f64, balance: f64 },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Cannot move from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl LedgerError {
    pub fn not_found(collection: &str, id: &str) -> Self {
        LedgerError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        LedgerError::InvalidArgument(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
