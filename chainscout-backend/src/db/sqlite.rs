use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::error::Result;

pub type DbConnection = PooledConnection<SqliteConnectionManager>;

pub struct Database {
    pool: Pool<SqliteConnectionManager>,
    url: String,
}

impl Database {
    /// Open the pool and make sure every table and index exists.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let in_memory = config.is_in_memory();

        // Create parent directory if it doesn't exist
        if !in_memory {
            if let Some(parent) = Path::new(&config.url).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).ok();
                }
            }
        }

        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        let manager = if in_memory {
            SqliteConnectionManager::memory()
        } else {
            SqliteConnectionManager::file(&config.url)
        };
        let manager = manager.with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            conn.execute_batch("PRAGMA foreign_keys=ON;")
        });

        // Every pooled ":memory:" connection is its own database, so keep exactly one
        let max_size = if in_memory { 1 } else { config.pool_size };
        let pool = Pool::builder()
            .max_size(max_size)
            .connection_timeout(busy_timeout)
            .build(manager)?;

        let db = Self {
            pool,
            url: config.url.clone(),
        };
        db.init_schema(in_memory)?;
        Ok(db)
    }

    /// Check a connection out of the pool.
    pub fn conn(&self) -> Result<DbConnection> {
        Ok(self.pool.get()?)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Round-trip a trivial query to confirm the store is reachable.
    pub fn health_check(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    fn init_schema(&self, in_memory: bool) -> Result<()> {
        let conn = self.conn()?;

        if !in_memory {
            conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        }

        // Users
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                username TEXT,
                first_name TEXT,
                last_name TEXT,
                is_premium INTEGER NOT NULL DEFAULT 0,
                premium_until TEXT,
                premium_plan TEXT,
                payment_currency TEXT,
                last_payment_id TEXT,
                is_admin INTEGER NOT NULL DEFAULT 0,
                referral_code TEXT,
                referral_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                last_active TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_users_premium ON users(is_premium, premium_until);
            CREATE INDEX IF NOT EXISTS idx_users_admin ON users(is_admin);
            CREATE INDEX IF NOT EXISTS idx_users_last_active ON users(last_active);",
        )?;

        // Daily scan counters
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS user_scans (
                user_id INTEGER NOT NULL,
                scan_type TEXT NOT NULL,
                date TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, scan_type, date)
            );
            CREATE INDEX IF NOT EXISTS idx_user_scans_date ON user_scans(date);",
        )?;

        // Entity profiles: key columns for lookups, full record in `data`
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS token_data (
                address TEXT PRIMARY KEY,
                deployer TEXT,
                data TEXT NOT NULL,
                last_updated TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_token_data_deployer ON token_data(deployer);
            CREATE INDEX IF NOT EXISTS idx_token_data_last_updated ON token_data(last_updated);

            CREATE TABLE IF NOT EXISTS wallet_data (
                address TEXT PRIMARY KEY,
                is_kol INTEGER NOT NULL DEFAULT 0,
                is_deployer INTEGER NOT NULL DEFAULT 0,
                win_rate REAL NOT NULL DEFAULT 0,
                data TEXT NOT NULL,
                last_updated TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_wallet_data_kol ON wallet_data(is_kol);
            CREATE INDEX IF NOT EXISTS idx_wallet_data_deployer ON wallet_data(is_deployer, win_rate DESC);
            CREATE INDEX IF NOT EXISTS idx_wallet_data_last_updated ON wallet_data(last_updated);

            CREATE TABLE IF NOT EXISTS kol_wallets (
                address TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                name_folded TEXT NOT NULL,
                data TEXT NOT NULL,
                last_updated TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_kol_wallets_name_folded ON kol_wallets(name_folded);",
        )?;

        // Tracking subscriptions
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tracking_subscriptions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                tracking_type TEXT NOT NULL,
                target_address TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                last_checked TEXT,
                UNIQUE(user_id, tracking_type, target_address)
            );
            CREATE INDEX IF NOT EXISTS idx_tracking_type_active ON tracking_subscriptions(tracking_type, is_active);
            CREATE INDEX IF NOT EXISTS idx_tracking_user_active ON tracking_subscriptions(user_id, is_active);",
        )?;

        // Referrals and payment log
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS referrals (
                referrer_id INTEGER NOT NULL,
                referred_id INTEGER NOT NULL,
                date TEXT NOT NULL,
                PRIMARY KEY (referrer_id, referred_id)
            );

            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                type TEXT NOT NULL,
                plan_type TEXT NOT NULL,
                currency TEXT NOT NULL,
                amount REAL NOT NULL,
                duration_days INTEGER NOT NULL,
                network TEXT NOT NULL,
                transaction_id TEXT,
                date TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_transactions_user ON transactions(user_id, date DESC);",
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_creates_parent_dir_and_is_reopenable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("store.db");
        let config = DatabaseConfig::new(path.to_str().unwrap());

        let db = Database::open(&config).expect("Failed to open database");
        db.health_check().unwrap();
        assert_eq!(db.url(), path.to_str().unwrap());
        drop(db);

        // Schema creation is idempotent
        let db = Database::open(&config).expect("Failed to reopen database");
        db.health_check().unwrap();
    }

    #[test]
    fn test_in_memory_store() {
        let db = Database::open(&DatabaseConfig::new(":memory:")).unwrap();
        db.health_check().unwrap();
        let conn = db.conn().unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
                 ('users', 'user_scans', 'token_data', 'wallet_data', 'kol_wallets',
                  'tracking_subscriptions', 'referrals', 'transactions')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 8);
    }
}
