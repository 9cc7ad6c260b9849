//! Error types for the consolidator

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the consolidator
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Ledger API errors
    #[error("Ocean API error: {0}")]
    Ocean(String),

    #[error("Ocean API timeout after {0}ms")]
    OceanTimeout(u64),

    #[error("Ocean API returned {status} for {url}")]
    OceanStatus { status: u16, url: String },

    // Wallet service errors
    #[error("Wallet API error: {0}")]
    WalletApi(String),

    #[error("Transaction build failed: {0}")]
    TransactionBuild(String),

    #[error("Transaction send failed: {0}")]
    TransactionSend(String),

    #[error("No spendable output back to the wallet in transaction {txid}")]
    MissingInputRef { txid: String },

    // Notification errors
    #[error("Notification failed: {0}")]
    Notification(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Ocean(_) | Error::OceanTimeout(_) | Error::WalletApi(_) => true,
            Error::OceanStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

// Conversion from reqwest errors
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Error::Deserialization(e.to_string())
        } else {
            Error::Ocean(e.to_string())
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
