//! Daily scan quota ledger (user_scans table)

use chainscout_types::ScanType;
use chrono::{NaiveDate, Utc};
use rusqlite::OptionalExtension;

use crate::db::{Database, to_db_date};
use crate::error::Result;

impl Database {
    /// Number of scans of `scan_type` the user ran on `date`. Missing rows count as 0.
    pub fn get_scan_count(&self, user_id: i64, scan_type: ScanType, date: NaiveDate) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn
            .query_row(
                "SELECT count FROM user_scans WHERE user_id = ?1 AND scan_type = ?2 AND date = ?3",
                rusqlite::params![user_id, scan_type.as_ref(), to_db_date(date)],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(count.unwrap_or(0))
    }

    /// Add one scan for the day and return the new count.
    ///
    /// A single upsert statement, so concurrent callers never lose an increment.
    pub fn increment_scan_count(
        &self,
        user_id: i64,
        scan_type: ScanType,
        date: NaiveDate,
    ) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "INSERT INTO user_scans (user_id, scan_type, date, count)
             VALUES (?1, ?2, ?3, 1)
             ON CONFLICT(user_id, scan_type, date) DO UPDATE SET count = count + 1
             RETURNING count",
            rusqlite::params![user_id, scan_type.as_ref(), to_db_date(date)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Drop every counter that does not belong to the current UTC day.
    pub fn reset_daily_scan_counts(&self) -> Result<usize> {
        self.reset_scan_counts_except(Utc::now().date_naive())
    }

    /// Drop every counter whose date differs from `today`. Running it twice is a no-op.
    pub fn reset_scan_counts_except(&self, today: NaiveDate) -> Result<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM user_scans WHERE date <> ?1",
            [to_db_date(today)],
        )?;
        if deleted > 0 {
            log::info!("[quota] Reset {} scan counters not dated {}", deleted, today);
        }
        Ok(deleted)
    }
}
