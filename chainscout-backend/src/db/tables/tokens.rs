//! Token profile cache (token_data table)

use chainscout_types::{TokenData, normalize_address};
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;

use crate::db::{Database, decode_json, to_db_timestamp};
use crate::error::Result;

impl Database {
    pub fn get_token(&self, address: &str) -> Result<Option<TokenData>> {
        let conn = self.conn()?;
        let token = conn
            .query_row(
                "SELECT data FROM token_data WHERE address = ?1",
                [normalize_address(address)],
                |row| decode_json::<TokenData>(0, &row.get::<_, String>(0)?),
            )
            .optional()?;
        Ok(token)
    }

    /// Upsert a token profile. The address is lowercased and `last_updated`
    /// is stamped by the store, replacing whatever the caller set.
    pub fn save_token(&self, token: &TokenData) -> Result<TokenData> {
        self.save_token_at(token, Utc::now())
    }

    pub(crate) fn save_token_at(&self, token: &TokenData, now: DateTime<Utc>) -> Result<TokenData> {
        let mut stored = token.clone();
        stored.address = normalize_address(&token.address);
        stored.deployer = token.deployer.as_deref().map(normalize_address);
        stored.last_updated = Some(now);

        let data = serde_json::to_string(&stored)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO token_data (address, deployer, data, last_updated)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(address) DO UPDATE SET
                deployer = excluded.deployer,
                data = excluded.data,
                last_updated = excluded.last_updated",
            rusqlite::params![stored.address, stored.deployer, data, to_db_timestamp(&now)],
        )?;
        Ok(stored)
    }

    /// Every cached token launched by `deployer`, most recently refreshed first.
    pub fn tokens_by_deployer(&self, deployer: &str) -> Result<Vec<TokenData>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT data FROM token_data WHERE deployer = ?1 ORDER BY last_updated DESC",
        )?;
        let tokens = stmt
            .query_map([normalize_address(deployer)], |row| {
                decode_json::<TokenData>(0, &row.get::<_, String>(0)?)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tokens)
    }
}
