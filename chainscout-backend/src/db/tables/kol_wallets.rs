//! Curated KOL wallet directory (kol_wallets table)

use chainscout_types::{KolWallet, normalize_address};
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;

use crate::db::{Database, decode_json, to_db_timestamp};
use crate::error::Result;

/// Lookup key for KOL names. Folds non-ASCII letters as well as ASCII.
fn fold_name(name: &str) -> String {
    name.trim().to_lowercase()
}

fn row_to_kol(row: &rusqlite::Row) -> rusqlite::Result<KolWallet> {
    decode_json(0, &row.get::<_, String>(0)?)
}

impl Database {
    /// Find a KOL by exact name (any casing, Unicode aware) or by address.
    ///
    /// A name match wins over an address match when both exist.
    pub fn get_kol_wallet(&self, name_or_address: &str) -> Result<Option<KolWallet>> {
        let conn = self.conn()?;
        let kol = conn
            .query_row(
                "SELECT data FROM kol_wallets
                 WHERE name_folded = ?1 OR address = ?2
                 ORDER BY CASE WHEN name_folded = ?1 THEN 0 ELSE 1 END, name
                 LIMIT 1",
                rusqlite::params![fold_name(name_or_address), normalize_address(name_or_address)],
                row_to_kol,
            )
            .optional()?;
        Ok(kol)
    }

    pub fn list_kol_wallets(&self) -> Result<Vec<KolWallet>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT data FROM kol_wallets ORDER BY name_folded, address")?;
        let kols = stmt
            .query_map([], row_to_kol)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(kols)
    }

    /// Upsert a KOL wallet keyed by lowercased address, stamping `last_updated`.
    pub fn save_kol_wallet(&self, kol: &KolWallet) -> Result<KolWallet> {
        self.save_kol_wallet_at(kol, Utc::now())
    }

    pub(crate) fn save_kol_wallet_at(
        &self,
        kol: &KolWallet,
        now: DateTime<Utc>,
    ) -> Result<KolWallet> {
        let mut stored = kol.clone();
        stored.address = normalize_address(&kol.address);
        stored.last_updated = Some(now);

        let data = serde_json::to_string(&stored)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO kol_wallets (address, name, name_folded, data, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(address) DO UPDATE SET
                name = excluded.name,
                name_folded = excluded.name_folded,
                data = excluded.data,
                last_updated = excluded.last_updated",
            rusqlite::params![
                stored.address,
                stored.name,
                fold_name(&stored.name),
                data,
                to_db_timestamp(&now),
            ],
        )?;
        Ok(stored)
    }
}
