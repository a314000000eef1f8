//! Age-based garbage collection for cached entity profiles

use chrono::{DateTime, Utc};

use crate::db::{Database, days_before, to_db_timestamp};
use crate::error::Result;

/// Rows removed by one profile sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfilePurge {
    pub tokens: usize,
    pub wallets: usize,
}

impl ProfilePurge {
    pub fn total(&self) -> usize {
        self.tokens + self.wallets
    }
}

impl Database {
    /// Delete token and wallet profiles not refreshed in `max_age_days`.
    /// KOL wallets are curated and never swept. A negative age is rejected.
    pub fn purge_stale_profiles(&self, max_age_days: i64) -> Result<ProfilePurge> {
        self.purge_stale_profiles_at(Utc::now(), max_age_days)
    }

    pub fn purge_stale_profiles_at(
        &self,
        now: DateTime<Utc>,
        max_age_days: i64,
    ) -> Result<ProfilePurge> {
        let cutoff = to_db_timestamp(&days_before(now, max_age_days)?);
        let conn = self.conn()?;
        let purge = ProfilePurge {
            tokens: conn.execute("DELETE FROM token_data WHERE last_updated < ?1", [&cutoff])?,
            wallets: conn.execute("DELETE FROM wallet_data WHERE last_updated < ?1", [&cutoff])?,
        };
        if purge.total() > 0 {
            log::info!(
                "[store] Purged {} token and {} wallet profiles older than {} days",
                purge.tokens,
                purge.wallets,
                max_age_days
            );
        }
        Ok(purge)
    }
}
