//! Referral ledger (referrals table + users.referral_count)

use chainscout_types::ReferralEdge;
use chrono::{DateTime, Utc};
use rusqlite::TransactionBehavior;

use crate::db::{Database, parse_db_timestamp, to_db_timestamp};
use crate::error::Result;

impl Database {
    /// Record that `referrer_id` brought in `referred_id`.
    ///
    /// Returns true only the first time the pair is seen; the referrer's
    /// `referral_count` is bumped in the same transaction. Repeats just
    /// refresh the edge date. Nothing is recorded while the referrer has no
    /// user row, so a later call after sign-up still credits them.
    pub fn record_referral(&self, referrer_id: i64, referred_id: i64) -> Result<bool> {
        self.record_referral_at(referrer_id, referred_id, Utc::now())
    }

    pub fn record_referral_at(
        &self,
        referrer_id: i64,
        referred_id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let date = to_db_timestamp(&now);

        let referrer_exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE user_id = ?1)",
            [referrer_id],
            |row| row.get(0),
        )?;
        if !referrer_exists {
            log::warn!(
                "[referrals] Referrer {} has no user row, referral of {} not recorded",
                referrer_id,
                referred_id
            );
            return Ok(false);
        }

        let inserted = tx.execute(
            "INSERT INTO referrals (referrer_id, referred_id, date)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(referrer_id, referred_id) DO NOTHING",
            rusqlite::params![referrer_id, referred_id, date],
        )? > 0;

        if inserted {
            tx.execute(
                "UPDATE users SET referral_count = referral_count + 1, updated_at = ?1
                 WHERE user_id = ?2",
                rusqlite::params![date, referrer_id],
            )?;
        } else {
            tx.execute(
                "UPDATE referrals SET date = ?1 WHERE referrer_id = ?2 AND referred_id = ?3",
                rusqlite::params![date, referrer_id, referred_id],
            )?;
        }

        tx.commit()?;
        if inserted {
            log::info!("[referrals] User {} referred user {}", referrer_id, referred_id);
        }
        Ok(inserted)
    }

    /// Everyone `referrer_id` has referred, oldest first.
    pub fn list_referrals_by(&self, referrer_id: i64) -> Result<Vec<ReferralEdge>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT referrer_id, referred_id, date FROM referrals
             WHERE referrer_id = ?1
             ORDER BY date, referred_id",
        )?;
        let edges = stmt
            .query_map([referrer_id], |row| {
                let date: String = row.get(2)?;
                Ok(ReferralEdge {
                    referrer_id: row.get(0)?,
                    referred_id: row.get(1)?,
                    date: parse_db_timestamp(2, &date)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(edges)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_support::open_temp_db;
    use chrono::{Duration, Utc};

    #[test]
    fn test_rerecording_never_double_counts() {
        let (_dir, db) = open_temp_db();
        db.ensure_user(1).unwrap();
        let now = Utc::now();

        assert!(db.record_referral_at(1, 2, now).unwrap());
        assert!(!db.record_referral_at(1, 2, now + Duration::days(1)).unwrap());
        assert!(db.record_referral_at(1, 3, now).unwrap());

        assert_eq!(db.get_user(1).unwrap().unwrap().referral_count, 2);

        let edges = db.list_referrals_by(1).unwrap();
        assert_eq!(edges.len(), 2);
        let repeated = edges.iter().find(|e| e.referred_id == 2).unwrap();
        assert_eq!(repeated.date, now + Duration::days(1));
    }

    #[test]
    fn test_unknown_referrer_is_credited_after_signup() {
        let (_dir, db) = open_temp_db();
        assert!(!db.record_referral(10, 11).unwrap());
        assert!(db.get_user(10).unwrap().is_none());
        assert!(db.list_referrals_by(10).unwrap().is_empty());

        db.ensure_user(10).unwrap();
        assert!(db.record_referral(10, 11).unwrap());
        assert_eq!(db.get_user(10).unwrap().unwrap().referral_count, 1);
        assert_eq!(db.list_referrals_by(10).unwrap().len(), 1);
        assert!(db.list_referrals_by(11).unwrap().is_empty());
    }
}
