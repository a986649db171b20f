use thiserror::Error;

#[derive(Error, Debug)]
pub enum FraudError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Transaction '{transaction_id}' already exists")]
    DuplicateTransaction { transaction_id: String },

    #[error("Transaction '{transaction_id}' not found")]
    TransactionNotFound { transaction_id: String },

    #[error("Transaction '{transaction_id}' has already been scored")]
    AlreadyScored { transaction_id: String },

    #[error("History lookup failed: {reason}")]
    Lookup { reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FraudError {
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest { reason: reason.into() }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig { reason: reason.into() }
    }

    pub fn lookup(reason: impl Into<String>) -> Self {
        Self::Lookup { reason: reason.into() }
    }
}

pub type FraudResult<T> = Result<T, FraudError>;
