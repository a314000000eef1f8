//! Wallet profile cache (wallet_data table)

use chainscout_types::{WalletData, normalize_address};
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;

use crate::db::{Database, days_before, decode_json, to_db_timestamp};
use crate::error::Result;

/// Win rate a wallet must beat to count as profitable.
const PROFITABLE_WIN_RATE: f64 = 50.0;

fn row_to_wallet(row: &rusqlite::Row) -> rusqlite::Result<WalletData> {
    decode_json(0, &row.get::<_, String>(0)?)
}

impl Database {
    pub fn get_wallet(&self, address: &str) -> Result<Option<WalletData>> {
        let conn = self.conn()?;
        let wallet = conn
            .query_row(
                "SELECT data FROM wallet_data WHERE address = ?1",
                [normalize_address(address)],
                row_to_wallet,
            )
            .optional()?;
        Ok(wallet)
    }

    /// Upsert a wallet profile, lowercasing the address and stamping `last_updated`.
    pub fn save_wallet(&self, wallet: &WalletData) -> Result<WalletData> {
        self.save_wallet_at(wallet, Utc::now())
    }

    pub(crate) fn save_wallet_at(
        &self,
        wallet: &WalletData,
        now: DateTime<Utc>,
    ) -> Result<WalletData> {
        let mut stored = wallet.clone();
        stored.address = normalize_address(&wallet.address);
        stored.last_updated = Some(now);

        let data = serde_json::to_string(&stored)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO wallet_data (address, is_kol, is_deployer, win_rate, data, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(address) DO UPDATE SET
                is_kol = excluded.is_kol,
                is_deployer = excluded.is_deployer,
                win_rate = excluded.win_rate,
                data = excluded.data,
                last_updated = excluded.last_updated",
            rusqlite::params![
                stored.address,
                stored.is_kol,
                stored.is_deployer,
                stored.win_rate,
                data,
                to_db_timestamp(&now),
            ],
        )?;
        Ok(stored)
    }

    /// Wallets refreshed within `days` with a win rate above 50%, best first.
    pub fn profitable_wallets(&self, days: i64, limit: usize) -> Result<Vec<WalletData>> {
        self.profitable_wallets_at(Utc::now(), days, limit)
    }

    pub(crate) fn profitable_wallets_at(
        &self,
        now: DateTime<Utc>,
        days: i64,
        limit: usize,
    ) -> Result<Vec<WalletData>> {
        let conn = self.conn()?;
        let cutoff = to_db_timestamp(&days_before(now, days)?);
        let mut stmt = conn.prepare(
            "SELECT data FROM wallet_data
             WHERE last_updated >= ?1 AND win_rate > ?2
             ORDER BY win_rate DESC
             LIMIT ?3",
        )?;
        let wallets = stmt
            .query_map(
                rusqlite::params![cutoff, PROFITABLE_WIN_RATE, limit as i64],
                row_to_wallet,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(wallets)
    }

    /// Deployer wallets refreshed within `days`, best win rate first.
    pub fn profitable_deployers(&self, days: i64, limit: usize) -> Result<Vec<WalletData>> {
        self.profitable_deployers_at(Utc::now(), days, limit)
    }

    pub(crate) fn profitable_deployers_at(
        &self,
        now: DateTime<Utc>,
        days: i64,
        limit: usize,
    ) -> Result<Vec<WalletData>> {
        let conn = self.conn()?;
        let cutoff = to_db_timestamp(&days_before(now, days)?);
        let mut stmt = conn.prepare(
            "SELECT data FROM wallet_data
             WHERE is_deployer = 1 AND last_updated >= ?1
             ORDER BY win_rate DESC
             LIMIT ?2",
        )?;
        let wallets = stmt
            .query_map(rusqlite::params![cutoff, limit as i64], row_to_wallet)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(wallets)
    }
}
