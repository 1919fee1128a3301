use serde::{Deserialize, Serialize};
use thiserror::Error;
use trade_core::SwapError;

pub mod memory_store;
pub mod postgres_client;

pub use memory_store::MemoryStore;
pub use postgres_client::PostgresClient;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Connection pool creation failed: {0}")]
    PoolCreation(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

impl From<PersistenceError> for SwapError {
    fn from(err: PersistenceError) -> Self {
        SwapError::Storage(err.to_string())
    }
}

/// Stored sync position for one `(wallet, chain)` key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCursor {
    pub cursor: String,
    pub block_number: u64,
}

impl StoredCursor {
    /// Parse a hex cursor into its stored form. Sentinels are not storable.
    pub fn parse(cursor: &str) -> Result<Self> {
        let block_number = trade_core::parse_cursor(Some(cursor)).ok_or_else(|| {
            PersistenceError::InvalidData(format!("cursor '{}' is not a block number", cursor))
        })?;

        Ok(Self {
            cursor: cursor.trim().to_string(),
            block_number,
        })
    }
}
