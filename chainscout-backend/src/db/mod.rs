//! SQLite persistence for accounts, quotas, profiles and subscriptions.
//!
//! `Database` owns the connection pool and schema; each module under
//! `tables/` adds an `impl Database` block for one table group.

mod sqlite;
pub mod tables;

pub use sqlite::{Database, DbConnection};

use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, TimeDelta, Utc};
use rusqlite::types::Type;
use serde::de::DeserializeOwned;

use crate::error::{Result, StoreError};

/// Last year whose RFC 3339 form keeps the fixed four-digit width.
const MAX_STORED_YEAR: i32 = 9999;

/// Fixed-width RFC 3339 so that string order in SQL matches time order.
pub(crate) fn to_db_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_db_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_optional_timestamp(
    idx: usize,
    raw: Option<String>,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_db_timestamp(idx, &s)).transpose()
}

/// `from` moved by `days` (negative moves back), rejected when the result
/// would not fit the timestamp column's sortable range.
pub(crate) fn shift_days(from: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>> {
    TimeDelta::try_days(days)
        .and_then(|delta| from.checked_add_signed(delta))
        .filter(|dt| (0..=MAX_STORED_YEAR).contains(&dt.year()))
        .ok_or_else(|| StoreError::InvalidInput(format!("{} days from {} is out of range", days, from)))
}

/// Cutoff for "within the last `days` days". Negative windows are rejected.
pub(crate) fn days_before(now: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>> {
    if days < 0 {
        return Err(StoreError::InvalidInput(format!("negative day window {}", days)));
    }
    TimeDelta::try_days(days)
        .and_then(|delta| now.checked_sub_signed(delta))
        .filter(|dt| dt.year() >= 0)
        .ok_or_else(|| StoreError::InvalidInput(format!("{} days before {} is out of range", days, now)))
}

pub(crate) fn to_db_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Decode a JSON payload column into its typed record.
pub(crate) fn decode_json<T: DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
