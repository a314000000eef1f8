//! User account database operations

use chainscout_types::{User, UserCounts};
use chrono::{DateTime, Duration, Utc};
use rusqlite::OptionalExtension;

use crate::db::{Database, parse_db_timestamp, parse_optional_timestamp, to_db_timestamp};
use crate::error::Result;

pub(crate) const USER_COLUMNS: &str = "user_id, username, first_name, last_name, is_premium, premium_until, \
     premium_plan, payment_currency, last_payment_id, is_admin, referral_code, referral_count, \
     created_at, last_active";

pub(crate) fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    let created_at: String = row.get(12)?;
    let last_active: String = row.get(13)?;
    Ok(User {
        user_id: row.get(0)?,
        username: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        is_premium: row.get(4)?,
        premium_until: parse_optional_timestamp(5, row.get(5)?)?,
        premium_plan: row.get(6)?,
        payment_currency: row.get(7)?,
        last_payment_id: row.get(8)?,
        is_admin: row.get(9)?,
        referral_code: row.get(10)?,
        referral_count: row.get(11)?,
        created_at: parse_db_timestamp(12, &created_at)?,
        last_active: parse_db_timestamp(13, &last_active)?,
    })
}

impl Database {
    /// Get a user by Telegram user id
    pub fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE user_id = ?1", USER_COLUMNS),
                [user_id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Insert or update a user.
    ///
    /// `referral_count` and the premium columns (`is_premium`, `premium_until`,
    /// `premium_plan`, `payment_currency`, `last_payment_id`) are only written
    /// on insert. Afterwards the referral ledger and the premium operations own
    /// them, so saving a stale copy never undoes a grant, sweep or referral.
    pub fn save_user(&self, user: &User) -> Result<()> {
        let conn = self.conn()?;
        let now = to_db_timestamp(&Utc::now());
        conn.execute(
            "INSERT INTO users (
                user_id, username, first_name, last_name, is_premium, premium_until,
                premium_plan, payment_currency, last_payment_id, is_admin, referral_code,
                referral_count, created_at, last_active, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT(user_id) DO UPDATE SET
                username = excluded.username,
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                is_admin = excluded.is_admin,
                referral_code = excluded.referral_code,
                created_at = excluded.created_at,
                last_active = excluded.last_active,
                updated_at = excluded.updated_at",
            rusqlite::params![
                user.user_id,
                user.username,
                user.first_name,
                user.last_name,
                user.is_premium,
                user.premium_until.as_ref().map(to_db_timestamp),
                user.premium_plan,
                user.payment_currency,
                user.last_payment_id,
                user.is_admin,
                user.referral_code,
                user.referral_count,
                to_db_timestamp(&user.created_at),
                to_db_timestamp(&user.last_active),
                now,
            ],
        )?;
        Ok(())
    }

    /// Return the stored user, creating a free-tier row on first interaction.
    pub fn ensure_user(&self, user_id: i64) -> Result<User> {
        let now = Utc::now();
        let created = User::new(user_id, now);
        let conn = self.conn()?;
        let stamp = to_db_timestamp(&now);
        conn.execute(
            "INSERT INTO users (user_id, created_at, last_active, updated_at)
             VALUES (?1, ?2, ?2, ?2)
             ON CONFLICT(user_id) DO NOTHING",
            rusqlite::params![user_id, stamp],
        )?;
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE user_id = ?1", USER_COLUMNS),
                [user_id],
                row_to_user,
            )
            .optional()?;
        Ok(user.unwrap_or(created))
    }

    /// Stamp `last_active`. Returns false if the user does not exist.
    pub fn touch_user_activity(&self, user_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let now = to_db_timestamp(&Utc::now());
        let rows = conn.execute(
            "UPDATE users SET last_active = ?1, updated_at = ?1 WHERE user_id = ?2",
            rusqlite::params![now, user_id],
        )?;
        Ok(rows > 0)
    }

    pub fn set_user_admin(&self, user_id: i64, is_admin: bool) -> Result<bool> {
        let conn = self.conn()?;
        let now = to_db_timestamp(&Utc::now());
        let rows = conn.execute(
            "UPDATE users SET is_admin = ?1, updated_at = ?2 WHERE user_id = ?3",
            rusqlite::params![is_admin, now, user_id],
        )?;
        Ok(rows > 0)
    }

    pub fn update_referral_code(&self, user_id: i64, referral_code: &str) -> Result<bool> {
        let conn = self.conn()?;
        let now = to_db_timestamp(&Utc::now());
        let rows = conn.execute(
            "UPDATE users SET referral_code = ?1, updated_at = ?2 WHERE user_id = ?3",
            rusqlite::params![referral_code, now, user_id],
        )?;
        Ok(rows > 0)
    }

    pub fn list_all_users(&self) -> Result<Vec<User>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users ORDER BY user_id",
            USER_COLUMNS
        ))?;
        let users = stmt
            .query_map([], row_to_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    pub fn list_admin_users(&self) -> Result<Vec<User>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users WHERE is_admin = 1 ORDER BY user_id",
            USER_COLUMNS
        ))?;
        let users = stmt
            .query_map([], row_to_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    pub fn user_counts(&self) -> Result<UserCounts> {
        self.user_counts_at(Utc::now())
    }

    /// Totals plus users active since UTC midnight, the last 7 days and the last 30 days.
    pub fn user_counts_at(&self, now: DateTime<Utc>) -> Result<UserCounts> {
        let conn = self.conn()?;
        let today_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or(now);
        let count_active_since = |since: DateTime<Utc>| -> rusqlite::Result<i64> {
            conn.query_row(
                "SELECT COUNT(*) FROM users WHERE last_active >= ?1",
                [to_db_timestamp(&since)],
                |row| row.get(0),
            )
        };

        Ok(UserCounts {
            total_users: conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?,
            premium_users: conn.query_row(
                "SELECT COUNT(*) FROM users WHERE is_premium = 1",
                [],
                |row| row.get(0),
            )?,
            active_today: count_active_since(today_start)?,
            active_week: count_active_since(now - Duration::days(7))?,
            active_month: count_active_since(now - Duration::days(30))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_support::open_temp_db;
    use chainscout_types::User;
    use chrono::{Duration, Utc};

    #[test]
    fn test_save_twice_keeps_one_row_with_last_write() {
        let (_dir, db) = open_temp_db();
        let now = Utc::now();

        let mut user = User::new(42, now);
        user.username = Some("first".to_string());
        db.save_user(&user).unwrap();
        user.username = Some("second".to_string());
        db.save_user(&user).unwrap();

        let users = db.list_all_users().unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].username.as_deref(), Some("second"));
        assert_eq!(db.get_user(42).unwrap().unwrap(), users[0]);
    }

    #[test]
    fn test_missing_user_is_none() {
        let (_dir, db) = open_temp_db();
        assert!(db.get_user(7).unwrap().is_none());
        assert!(!db.touch_user_activity(7).unwrap());
        assert!(!db.set_user_admin(7, true).unwrap());
    }

    #[test]
    fn test_ensure_user_creates_once() {
        let (_dir, db) = open_temp_db();
        let created = db.ensure_user(5).unwrap();
        assert!(!created.is_premium);
        assert_eq!(created.referral_count, 0);

        db.update_referral_code(5, "REF5").unwrap();
        let again = db.ensure_user(5).unwrap();
        assert_eq!(again.referral_code.as_deref(), Some("REF5"));
        assert_eq!(again.created_at, created.created_at);
    }

    #[test]
    fn test_save_does_not_overwrite_referral_count() {
        let (_dir, db) = open_temp_db();
        let user = User::new(1, Utc::now());
        db.save_user(&user).unwrap();
        db.ensure_user(2).unwrap();
        assert!(db.record_referral(1, 2).unwrap());

        // A handler saving a record it read before the referral landed
        db.save_user(&user).unwrap();
        assert_eq!(db.get_user(1).unwrap().unwrap().referral_count, 1);
    }

    #[test]
    fn test_stale_save_keeps_premium_transitions() {
        let (_dir, db) = open_temp_db();
        let stale = db.ensure_user(1).unwrap();

        let until = db.grant_premium(1, 30).unwrap().unwrap();
        let mut touched = stale.clone();
        touched.username = Some("renamed".to_string());
        db.save_user(&touched).unwrap();

        let user = db.get_user(1).unwrap().unwrap();
        assert!(user.is_premium);
        assert_eq!(user.premium_until, Some(until));
        assert_eq!(user.username.as_deref(), Some("renamed"));

        // A copy read while premium must not bring the entitlement back after a sweep
        let premium_copy = db.get_user(1).unwrap().unwrap();
        assert_eq!(db.expire_premium_sweep_at(until + Duration::days(1)).unwrap(), 1);
        db.save_user(&premium_copy).unwrap();

        let user = db.get_user(1).unwrap().unwrap();
        assert!(!user.is_premium);
        assert!(user.premium_until.is_none());
    }

    #[test]
    fn test_admins_and_counts() {
        let (_dir, db) = open_temp_db();
        let now = Utc::now();

        let mut fresh = User::new(1, now);
        fresh.is_premium = true;
        fresh.premium_until = Some(now + Duration::days(10));
        db.save_user(&fresh).unwrap();

        let mut idle = User::new(2, now - Duration::days(60));
        idle.last_active = now - Duration::days(20);
        db.save_user(&idle).unwrap();

        let mut gone = User::new(3, now - Duration::days(90));
        gone.last_active = now - Duration::days(45);
        db.save_user(&gone).unwrap();

        assert!(db.set_user_admin(2, true).unwrap());
        let admins = db.list_admin_users().unwrap();
        assert_eq!(admins.len(), 1);
        assert_eq!(admins[0].user_id, 2);

        let counts = db.user_counts_at(now).unwrap();
        assert_eq!(counts.total_users, 3);
        assert_eq!(counts.premium_users, 1);
        assert_eq!(counts.active_week, 1);
        assert_eq!(counts.active_month, 2);
        assert!(counts.active_today <= 1);
    }
}
