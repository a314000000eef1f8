//! Address tracking subscriptions (tracking_subscriptions table)

use chainscout_types::{TrackingSubscription, TrackingType, normalize_address};
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use rusqlite::types::Type;
use std::str::FromStr;

use crate::db::{Database, parse_db_timestamp, parse_optional_timestamp, to_db_timestamp};
use crate::error::Result;

const SUBSCRIPTION_COLUMNS: &str =
    "id, user_id, tracking_type, target_address, is_active, created_at, last_checked";

fn row_to_subscription(row: &rusqlite::Row) -> rusqlite::Result<TrackingSubscription> {
    let tracking_type: String = row.get(2)?;
    let created_at: String = row.get(5)?;
    Ok(TrackingSubscription {
        id: Some(row.get(0)?),
        user_id: row.get(1)?,
        tracking_type: TrackingType::from_str(&tracking_type)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?,
        target_address: row.get(3)?,
        is_active: row.get(4)?,
        created_at: parse_db_timestamp(5, &created_at)?,
        last_checked: parse_optional_timestamp(6, row.get(6)?)?,
    })
}

impl Database {
    /// Create or overwrite the subscription for (user, type, target).
    ///
    /// Re-subscribing reactivates an existing row instead of adding a second one.
    /// Returns the row id.
    pub fn subscribe(&self, subscription: &TrackingSubscription) -> Result<i64> {
        let conn = self.conn()?;
        let id = conn.query_row(
            "INSERT INTO tracking_subscriptions
                (user_id, tracking_type, target_address, is_active, created_at, last_checked)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(user_id, tracking_type, target_address) DO UPDATE SET
                is_active = excluded.is_active,
                created_at = excluded.created_at,
                last_checked = excluded.last_checked
             RETURNING id",
            rusqlite::params![
                subscription.user_id,
                subscription.tracking_type.as_ref(),
                normalize_address(&subscription.target_address),
                subscription.is_active,
                to_db_timestamp(&subscription.created_at),
                subscription.last_checked.as_ref().map(to_db_timestamp),
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn get_subscription(
        &self,
        user_id: i64,
        tracking_type: TrackingType,
        target_address: &str,
    ) -> Result<Option<TrackingSubscription>> {
        let conn = self.conn()?;
        let subscription = conn
            .query_row(
                &format!(
                    "SELECT {} FROM tracking_subscriptions
                     WHERE user_id = ?1 AND tracking_type = ?2 AND target_address = ?3",
                    SUBSCRIPTION_COLUMNS
                ),
                rusqlite::params![
                    user_id,
                    tracking_type.as_ref(),
                    normalize_address(target_address)
                ],
                row_to_subscription,
            )
            .optional()?;
        Ok(subscription)
    }

    /// Hard-delete a subscription. Returns false when there was nothing to delete.
    pub fn unsubscribe(
        &self,
        user_id: i64,
        tracking_type: TrackingType,
        target_address: &str,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "DELETE FROM tracking_subscriptions
             WHERE user_id = ?1 AND tracking_type = ?2 AND target_address = ?3",
            rusqlite::params![
                user_id,
                tracking_type.as_ref(),
                normalize_address(target_address)
            ],
        )?;
        Ok(rows > 0)
    }

    /// Pause or resume a subscription without deleting it.
    pub fn set_subscription_active(&self, id: i64, is_active: bool) -> Result<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE tracking_subscriptions SET is_active = ?1 WHERE id = ?2",
            rusqlite::params![is_active, id],
        )?;
        Ok(rows > 0)
    }

    /// Active subscriptions owned by a user, oldest first.
    pub fn list_user_subscriptions(&self, user_id: i64) -> Result<Vec<TrackingSubscription>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tracking_subscriptions
             WHERE user_id = ?1 AND is_active = 1
             ORDER BY id",
            SUBSCRIPTION_COLUMNS
        ))?;
        let subscriptions = stmt
            .query_map([user_id], row_to_subscription)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(subscriptions)
    }

    pub fn list_active_subscriptions_by_type(
        &self,
        tracking_type: TrackingType,
    ) -> Result<Vec<TrackingSubscription>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tracking_subscriptions
             WHERE tracking_type = ?1 AND is_active = 1
             ORDER BY id",
            SUBSCRIPTION_COLUMNS
        ))?;
        let subscriptions = stmt
            .query_map([tracking_type.as_ref()], row_to_subscription)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(subscriptions)
    }

    pub fn list_all_active_subscriptions(&self) -> Result<Vec<TrackingSubscription>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tracking_subscriptions WHERE is_active = 1 ORDER BY id",
            SUBSCRIPTION_COLUMNS
        ))?;
        let subscriptions = stmt
            .query_map([], row_to_subscription)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(subscriptions)
    }

    /// Record that the tracker polled this subscription.
    pub fn touch_subscription_checked(&self, id: i64) -> Result<bool> {
        self.touch_subscription_checked_at(id, Utc::now())
    }

    pub fn touch_subscription_checked_at(&self, id: i64, now: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE tracking_subscriptions SET last_checked = ?1 WHERE id = ?2",
            rusqlite::params![to_db_timestamp(&now), id],
        )?;
        Ok(rows > 0)
    }
}
