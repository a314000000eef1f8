//! Process-wide handle to the store.
//!
//! Created once at startup and passed to whoever needs it. `init` opens the
//! pool and schema; `get` hands out the shared `Arc<Database>`.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::db::Database;
use crate::error::{Result, StoreError};

pub struct StoreHandle {
    config: DatabaseConfig,
    db: RwLock<Option<Arc<Database>>>,
}

impl StoreHandle {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            db: RwLock::new(None),
        }
    }

    /// Open the store if it is not open yet. Safe to call repeatedly.
    /// Returns false, after logging, when the store cannot be reached.
    pub fn init(&self) -> bool {
        match self.open_if_needed() {
            Ok(_) => true,
            Err(e) => {
                log::error!("[store] Failed to initialize {}: {}", self.config.url, e);
                false
            }
        }
    }

    /// The shared database, opening it on first use.
    pub fn get(&self) -> Result<Arc<Database>> {
        if let Some(db) = self.db.read().as_ref() {
            return Ok(Arc::clone(db));
        }
        self.open_if_needed().map_err(|e| {
            log::error!("[store] Store unavailable: {}", e);
            StoreError::NotInitialized {
                url: self.config.url.clone(),
                source: Box::new(e),
            }
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.db.read().is_some()
    }

    /// Release the handle's reference. Connections close once the last
    /// outstanding `Arc<Database>` is dropped.
    pub fn close(&self) {
        if self.db.write().take().is_some() {
            log::info!("[store] Closed {}", self.config.url);
        }
    }

    fn open_if_needed(&self) -> Result<Arc<Database>> {
        let mut slot = self.db.write();
        if let Some(db) = slot.as_ref() {
            return Ok(Arc::clone(db));
        }

        let db = Arc::new(Database::open(&self.config)?);
        db.health_check()?;
        log::info!("[store] Database initialized at {}", self.config.url);
        *slot = Some(Arc::clone(&db));
        Ok(db)
    }
}
