use thiserror::Error;

use crate::pricing::PricingError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Pricing lookup failed: {0}")]
    Pricing(#[from] PricingError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Store not initialized at {url}: {source}")]
    NotInitialized {
        url: String,
        #[source]
        source: Box<StoreError>,
    },
}

impl StoreError {
    /// True when the backing store was unreachable or rejected the request.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            StoreError::Pool(_) | StoreError::Database(_) | StoreError::NotInitialized { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
