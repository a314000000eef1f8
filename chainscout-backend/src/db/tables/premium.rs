//! Premium entitlement lifecycle and the payment log (users premium columns, transactions)
//!
//! Validity is never computed on read: a lapsed user keeps `is_premium = 1`
//! until `expire_premium_sweep` flips it.

use chainscout_types::{TRANSACTION_TYPE_PREMIUM_PURCHASE, TransactionRecord, User};
use chrono::{DateTime, Utc};
use rusqlite::TransactionBehavior;

use crate::db::tables::users::{USER_COLUMNS, row_to_user};
use crate::db::{Database, parse_db_timestamp, shift_days, to_db_timestamp};
use crate::error::{Result, StoreError};
use crate::pricing::PlanPricing;

/// Expiry for a grant made at `granted_at`. Always counted from the grant
/// time, so a renewal replaces the remaining time instead of adding to it.
/// Durations that are negative or reach past year 9999 are rejected.
pub fn premium_expiry_from(granted_at: DateTime<Utc>, duration_days: i64) -> Result<DateTime<Utc>> {
    if duration_days < 0 {
        return Err(StoreError::InvalidInput(format!(
            "negative premium duration {}",
            duration_days
        )));
    }
    shift_days(granted_at, duration_days)
}

/// A paid premium grant as submitted by the payment handler.
#[derive(Debug, Clone, Copy)]
pub struct PremiumPurchase<'a> {
    pub user_id: i64,
    pub duration_days: i64,
    /// Plan name understood by the pricing lookup (e.g. "weekly")
    pub plan: &'a str,
    pub currency: &'a str,
    /// On-chain payment hash, when the handler has one
    pub transaction_id: Option<&'a str>,
}

const TRANSACTION_COLUMNS: &str = "id, user_id, type, plan_type, currency, amount, duration_days, \
     network, transaction_id, date";

fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<TransactionRecord> {
    let date: String = row.get(9)?;
    Ok(TransactionRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        transaction_type: row.get(2)?,
        plan_type: row.get(3)?,
        currency: row.get(4)?,
        amount: row.get(5)?,
        duration_days: row.get(6)?,
        network: row.get(7)?,
        transaction_id: row.get(8)?,
        date: parse_db_timestamp(9, &date)?,
    })
}

impl Database {
    /// Make the user premium for `duration_days` from now.
    /// Returns the new expiry, or None when the user does not exist.
    pub fn grant_premium(&self, user_id: i64, duration_days: i64) -> Result<Option<DateTime<Utc>>> {
        self.grant_premium_at(user_id, duration_days, Utc::now())
    }

    pub fn grant_premium_at(
        &self,
        user_id: i64,
        duration_days: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        let until = premium_expiry_from(now, duration_days)?;
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE users SET is_premium = 1, premium_until = ?1, updated_at = ?2
             WHERE user_id = ?3",
            rusqlite::params![to_db_timestamp(&until), to_db_timestamp(&now), user_id],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        log::info!("[premium] Granted premium to user {} until {}", user_id, until);
        Ok(Some(until))
    }

    /// Drop premium immediately, clearing the expiry.
    pub fn revoke_premium(&self, user_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE users SET is_premium = 0, premium_until = NULL, updated_at = ?1
             WHERE user_id = ?2",
            rusqlite::params![to_db_timestamp(&Utc::now()), user_id],
        )?;
        if rows > 0 {
            log::info!("[premium] Revoked premium for user {}", user_id);
        }
        Ok(rows > 0)
    }

    /// Grant premium for a purchase and append the payment to the transaction log.
    ///
    /// The plan is priced before anything is written; a pricing failure leaves
    /// the store untouched. The user update and the log insert commit together.
    /// Returns None (and writes nothing) when the user does not exist.
    pub fn grant_premium_with_payment(
        &self,
        purchase: &PremiumPurchase<'_>,
        pricing: &dyn PlanPricing,
    ) -> Result<Option<TransactionRecord>> {
        self.grant_premium_with_payment_at(purchase, pricing, Utc::now())
    }

    pub fn grant_premium_with_payment_at(
        &self,
        purchase: &PremiumPurchase<'_>,
        pricing: &dyn PlanPricing,
        now: DateTime<Utc>,
    ) -> Result<Option<TransactionRecord>> {
        let details = pricing
            .plan_payment_details(purchase.plan, purchase.currency)
            .map_err(|e| {
                log::error!(
                    "[premium] Pricing failed for user {} ({} / {}): {}",
                    purchase.user_id,
                    purchase.plan,
                    purchase.currency,
                    e
                );
                e
            })?;

        let until = premium_expiry_from(now, purchase.duration_days)?;
        let stamp = to_db_timestamp(&now);

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let updated = tx.execute(
            "UPDATE users SET
                is_premium = 1,
                premium_until = ?1,
                premium_plan = ?2,
                payment_currency = ?3,
                last_payment_id = ?4,
                updated_at = ?5
             WHERE user_id = ?6",
            rusqlite::params![
                to_db_timestamp(&until),
                purchase.plan,
                details.currency,
                purchase.transaction_id,
                stamp,
                purchase.user_id,
            ],
        )?;
        if updated == 0 {
            // Dropping the transaction rolls it back
            log::warn!("[premium] Payment for unknown user {} not recorded", purchase.user_id);
            return Ok(None);
        }

        let id = tx.query_row(
            "INSERT INTO transactions
                (user_id, type, plan_type, currency, amount, duration_days, network, transaction_id, date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             RETURNING id",
            rusqlite::params![
                purchase.user_id,
                TRANSACTION_TYPE_PREMIUM_PURCHASE,
                purchase.plan,
                details.currency,
                details.amount,
                details.duration_days,
                details.network,
                purchase.transaction_id,
                stamp,
            ],
            |row| row.get(0),
        )?;
        tx.commit()?;

        log::info!(
            "[premium] User {} bought {} ({} {} on {}), premium until {}",
            purchase.user_id,
            purchase.plan,
            details.amount,
            details.currency,
            details.network,
            until
        );

        Ok(Some(TransactionRecord {
            id,
            user_id: purchase.user_id,
            transaction_type: TRANSACTION_TYPE_PREMIUM_PURCHASE.to_string(),
            plan_type: purchase.plan.to_string(),
            currency: details.currency,
            amount: details.amount,
            duration_days: details.duration_days,
            network: details.network,
            transaction_id: purchase.transaction_id.map(str::to_string),
            date: now,
        }))
    }

    /// Clear premium for every user whose expiry has already passed.
    pub fn expire_premium_sweep(&self) -> Result<usize> {
        self.expire_premium_sweep_at(Utc::now())
    }

    pub fn expire_premium_sweep_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn()?;
        let stamp = to_db_timestamp(&now);
        let expired = conn.execute(
            "UPDATE users SET is_premium = 0, premium_until = NULL, updated_at = ?1
             WHERE is_premium = 1 AND premium_until IS NOT NULL AND premium_until < ?1",
            [&stamp],
        )?;
        if expired > 0 {
            log::info!("[premium] Expired premium for {} users", expired);
        }
        Ok(expired)
    }

    /// Premium users whose expiry falls in `[now + d, now + d + 1 day)` for any offset `d`.
    pub fn users_with_expiring_premium(&self, day_offsets: &[i64]) -> Result<Vec<User>> {
        self.users_with_expiring_premium_at(Utc::now(), day_offsets)
    }

    pub fn users_with_expiring_premium_at(
        &self,
        now: DateTime<Utc>,
        day_offsets: &[i64],
    ) -> Result<Vec<User>> {
        if day_offsets.is_empty() {
            return Ok(Vec::new());
        }

        let mut windows = Vec::with_capacity(day_offsets.len() * 2);
        for &days in day_offsets {
            let start = shift_days(now, days)?;
            windows.push(to_db_timestamp(&start));
            windows.push(to_db_timestamp(&shift_days(start, 1)?));
        }
        let predicate = (0..day_offsets.len())
            .map(|i| format!("(premium_until >= ?{} AND premium_until < ?{})", 2 * i + 1, 2 * i + 2))
            .collect::<Vec<_>>()
            .join(" OR ");

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users WHERE is_premium = 1 AND ({}) ORDER BY premium_until, user_id",
            USER_COLUMNS, predicate
        ))?;
        let users = stmt
            .query_map(rusqlite::params_from_iter(windows.iter()), row_to_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    /// Payment log for one user, newest first.
    pub fn list_transactions_for_user(&self, user_id: i64) -> Result<Vec<TransactionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions WHERE user_id = ?1 ORDER BY date DESC, id DESC",
            TRANSACTION_COLUMNS
        ))?;
        let records = stmt
            .query_map([user_id], row_to_transaction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::open_temp_db;
    use crate::error::StoreError;
    use crate::pricing::{PlanCatalog, PricingError};
    use chainscout_types::{PaymentDetails, PremiumState};
    use chrono::Duration;

    struct BrokenPricing;

    impl PlanPricing for BrokenPricing {
        fn plan_payment_details(
            &self,
            _plan: &str,
            _currency: &str,
        ) -> std::result::Result<PaymentDetails, PricingError> {
            Err(PricingError::Unavailable("price feed down".to_string()))
        }
    }

    fn purchase(user_id: i64) -> PremiumPurchase<'static> {
        PremiumPurchase {
            user_id,
            duration_days: 30,
            plan: "monthly",
            currency: "eth",
            transaction_id: Some("0xabc123"),
        }
    }

    #[test]
    fn test_grant_then_expire_cycle() {
        let (_dir, db) = open_temp_db();
        db.ensure_user(1).unwrap();
        let t0 = Utc::now();

        let until = db.grant_premium_at(1, 7, t0).unwrap().unwrap();
        assert_eq!(until, t0 + Duration::days(7));
        let user = db.get_user(1).unwrap().unwrap();
        assert_eq!(user.premium_state(t0), PremiumState::Active);

        // Not yet expired: nothing to sweep
        assert_eq!(db.expire_premium_sweep_at(t0 + Duration::days(6)).unwrap(), 0);
        assert!(db.get_user(1).unwrap().unwrap().is_premium);

        // Lapsed but not swept: the stored flag is still set
        let later = t0 + Duration::days(8);
        let lapsed = db.get_user(1).unwrap().unwrap();
        assert!(lapsed.is_premium);
        assert_eq!(lapsed.premium_state(later), PremiumState::Expired);

        assert_eq!(db.expire_premium_sweep_at(later).unwrap(), 1);
        let swept = db.get_user(1).unwrap().unwrap();
        assert!(!swept.is_premium);
        assert!(swept.premium_until.is_none());
        assert_eq!(swept.premium_state(later), PremiumState::NotPremium);

        assert_eq!(db.expire_premium_sweep_at(later).unwrap(), 0);
    }

    #[test]
    fn test_regrant_counts_from_now() {
        let (_dir, db) = open_temp_db();
        db.ensure_user(1).unwrap();
        let t0 = Utc::now();
        db.grant_premium_at(1, 30, t0).unwrap();

        let t1 = t0 + Duration::days(2);
        let until = db.grant_premium_at(1, 7, t1).unwrap().unwrap();
        assert_eq!(until, t1 + Duration::days(7));
        assert_eq!(db.get_user(1).unwrap().unwrap().premium_until, Some(until));
    }

    #[test]
    fn test_grant_and_revoke_unknown_user() {
        let (_dir, db) = open_temp_db();
        assert!(db.grant_premium(404, 7).unwrap().is_none());
        assert!(!db.revoke_premium(404).unwrap());

        db.ensure_user(5).unwrap();
        db.grant_premium(5, 7).unwrap();
        assert!(db.revoke_premium(5).unwrap());
        let user = db.get_user(5).unwrap().unwrap();
        assert!(!user.is_premium);
        assert!(user.premium_until.is_none());
    }

    #[test]
    fn test_out_of_range_durations_are_rejected() {
        let (_dir, db) = open_temp_db();
        db.ensure_user(1).unwrap();

        for days in [10_000_000_000_000, 3_000_000, -1] {
            let err = db.grant_premium(1, days).unwrap_err();
            assert!(matches!(err, StoreError::InvalidInput(_)), "{} days: {}", days, err);
        }
        assert!(!db.get_user(1).unwrap().unwrap().is_premium);

        let mut huge = purchase(1);
        huge.duration_days = i64::MAX;
        assert!(matches!(
            db.grant_premium_with_payment(&huge, &PlanCatalog::builtin()),
            Err(StoreError::InvalidInput(_))
        ));
        assert!(db.list_transactions_for_user(1).unwrap().is_empty());

        assert!(matches!(
            db.users_with_expiring_premium(&[i64::MAX]),
            Err(StoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_long_grant_is_not_swept_early() {
        let (_dir, db) = open_temp_db();
        db.ensure_user(1).unwrap();
        let now = Utc::now();

        // Largest grant that still lands before year 10000
        let until = db.grant_premium_at(1, 2_000_000, now).unwrap().unwrap();
        assert_eq!(until, now + Duration::days(2_000_000));
        assert_eq!(db.expire_premium_sweep_at(now).unwrap(), 0);
        assert!(db.get_user(1).unwrap().unwrap().is_premium);
    }

    #[test]
    fn test_expiring_window() {
        let (_dir, db) = open_temp_db();
        db.ensure_user(1).unwrap();
        db.ensure_user(2).unwrap();
        let now = Utc::now();

        let expires = now + Duration::hours(36);
        db.grant_premium_at(1, 0, expires).unwrap();
        db.grant_premium_at(2, 10, now).unwrap();

        let in_one = db.users_with_expiring_premium_at(now, &[1]).unwrap();
        assert_eq!(in_one.iter().map(|u| u.user_id).collect::<Vec<_>>(), vec![1]);
        assert!(db.users_with_expiring_premium_at(now, &[3]).unwrap().is_empty());

        let either = db.users_with_expiring_premium_at(now, &[3, 1, 10]).unwrap();
        assert_eq!(either.iter().map(|u| u.user_id).collect::<Vec<_>>(), vec![1, 2]);
        assert!(db.users_with_expiring_premium_at(now, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_payment_records_plan_and_transaction() {
        let (_dir, db) = open_temp_db();
        db.ensure_user(1).unwrap();
        let now = Utc::now();

        let record = db
            .grant_premium_with_payment_at(&purchase(1), &PlanCatalog::builtin(), now)
            .unwrap()
            .unwrap();
        assert_eq!(record.transaction_type, "premium_purchase");
        assert_eq!(record.currency, "ETH");
        assert_eq!(record.network, "Ethereum");
        assert_eq!(record.duration_days, 30);

        let user = db.get_user(1).unwrap().unwrap();
        assert!(user.is_premium);
        assert_eq!(user.premium_until, Some(now + Duration::days(30)));
        assert_eq!(user.premium_plan.as_deref(), Some("monthly"));
        assert_eq!(user.payment_currency.as_deref(), Some("ETH"));
        assert_eq!(user.last_payment_id.as_deref(), Some("0xabc123"));

        assert_eq!(db.list_transactions_for_user(1).unwrap(), vec![record]);
    }

    #[test]
    fn test_pricing_failure_writes_nothing() {
        let (_dir, db) = open_temp_db();
        db.ensure_user(1).unwrap();

        let err = db
            .grant_premium_with_payment(&purchase(1), &BrokenPricing)
            .unwrap_err();
        assert!(matches!(err, StoreError::Pricing(PricingError::Unavailable(_))));

        let mut unknown_plan = purchase(1);
        unknown_plan.plan = "lifetime";
        assert!(db
            .grant_premium_with_payment(&unknown_plan, &PlanCatalog::builtin())
            .is_err());

        let user = db.get_user(1).unwrap().unwrap();
        assert!(!user.is_premium);
        assert!(user.premium_plan.is_none());
        assert!(db.list_transactions_for_user(1).unwrap().is_empty());
    }

    #[test]
    fn test_payment_for_unknown_user_is_rolled_back() {
        let (_dir, db) = open_temp_db();
        let result = db
            .grant_premium_with_payment(&purchase(77), &PlanCatalog::builtin())
            .unwrap();
        assert!(result.is_none());
        assert!(db.list_transactions_for_user(77).unwrap().is_empty());
    }

    #[test]
    fn test_transactions_newest_first() {
        let (_dir, db) = open_temp_db();
        db.ensure_user(1).unwrap();
        let now = Utc::now();
        let catalog = PlanCatalog::builtin();

        let weekly = PremiumPurchase {
            plan: "weekly",
            currency: "BNB",
            duration_days: 7,
            ..purchase(1)
        };
        db.grant_premium_with_payment_at(&weekly, &catalog, now).unwrap();
        db.grant_premium_with_payment_at(&purchase(1), &catalog, now + Duration::days(7))
            .unwrap();

        let plans: Vec<_> = db
            .list_transactions_for_user(1)
            .unwrap()
            .into_iter()
            .map(|t| (t.plan_type, t.network))
            .collect();
        assert_eq!(
            plans,
            vec![
                ("monthly".to_string(), "Ethereum".to_string()),
                ("weekly".to_string(), "BSC".to_string()),
            ]
        );
    }
}
