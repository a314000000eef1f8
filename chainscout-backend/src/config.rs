use std::env;
use std::fmt::Display;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;

/// Environment variable names - single source of truth
pub mod env_vars {
    pub const DATABASE_URL: &str = "CHAINSCOUT_DATABASE_URL";
    pub const DB_POOL_SIZE: &str = "CHAINSCOUT_DB_POOL_SIZE";
    pub const DB_BUSY_TIMEOUT_MS: &str = "CHAINSCOUT_DB_BUSY_TIMEOUT_MS";
    pub const CONFIG_DIR: &str = "CHAINSCOUT_CONFIG_DIR";
    // Maintenance scheduler
    pub const SCHEDULER_POLL_SECS: &str = "CHAINSCOUT_SCHEDULER_POLL_SECS";
    pub const PREMIUM_SWEEP_SECS: &str = "CHAINSCOUT_PREMIUM_SWEEP_SECS";
    pub const PROFILE_MAX_AGE_DAYS: &str = "CHAINSCOUT_PROFILE_MAX_AGE_DAYS";
}

/// Default values
pub mod defaults {
    pub const DATABASE_URL: &str = "./.db/chainscout.db";
    pub const DB_POOL_SIZE: u32 = 8;
    pub const DB_BUSY_TIMEOUT_MS: u64 = 5_000;
    pub const CONFIG_DIR: &str = "config";
    pub const SCHEDULER_POLL_SECS: u64 = 60;
    pub const PREMIUM_SWEEP_SECS: u64 = 600;
    pub const PROFILE_MAX_AGE_DAYS: i64 = 30;
}

/// Accepted ranges for the maintenance settings
pub mod limits {
    use std::ops::RangeInclusive;

    pub const SCHEDULER_POLL_SECS: RangeInclusive<u64> = 1..=86_400;
    pub const PREMIUM_SWEEP_SECS: RangeInclusive<u64> = 1..=604_800;
    pub const PROFILE_MAX_AGE_DAYS: RangeInclusive<i64> = 1..=3_650;
}

/// Returns the absolute path to the chainscout-backend directory.
pub fn backend_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

/// Read and parse an env var, falling back to `default` when unset or malformed.
fn parse_env<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("Ignoring invalid value {:?} for {}", raw, name);
            default
        }),
        Err(_) => default,
    }
}

/// Parse `raw`, falling back to `default` when it is missing, malformed or outside `range`.
fn parse_in_range<T>(name: &str, raw: Option<String>, default: T, range: RangeInclusive<T>) -> T
where
    T: FromStr + PartialOrd + Display,
{
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if range.contains(&value) => value,
        Ok(value) => {
            log::warn!(
                "Ignoring {} = {}: must be between {} and {}",
                name,
                value,
                range.start(),
                range.end()
            );
            default
        }
        Err(_) => {
            log::warn!("Ignoring invalid value {:?} for {}", raw, name);
            default
        }
    }
}

fn parse_env_in_range<T>(name: &str, default: T, range: RangeInclusive<T>) -> T
where
    T: FromStr + PartialOrd + Display,
{
    parse_in_range(name, env::var(name).ok(), default, range)
}

/// Connection settings for the SQLite store
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// File path, or ":memory:" for a single-connection in-memory store
    pub url: String,
    pub pool_size: u32,
    /// How long a writer waits on a locked database, also used as the pool checkout timeout
    pub busy_timeout_ms: u64,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pool_size: defaults::DB_POOL_SIZE,
            busy_timeout_ms: defaults::DB_BUSY_TIMEOUT_MS,
        }
    }

    pub fn from_env() -> Self {
        Self {
            url: env::var(env_vars::DATABASE_URL)
                .unwrap_or_else(|_| defaults::DATABASE_URL.to_string()),
            pool_size: parse_env(env_vars::DB_POOL_SIZE, defaults::DB_POOL_SIZE).max(1),
            busy_timeout_ms: parse_env(env_vars::DB_BUSY_TIMEOUT_MS, defaults::DB_BUSY_TIMEOUT_MS),
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.url == ":memory:"
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    /// Directory holding premium_plans.ron
    pub config_dir: PathBuf,
    pub scheduler_poll_secs: u64,
    pub premium_sweep_secs: u64,
    pub profile_max_age_days: i64,
}

impl Config {
    pub fn from_env() -> Self {
        // Check ./config first, then the repo-level config next to the backend crate
        let config_dir = env::var(env_vars::CONFIG_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let local = PathBuf::from(defaults::CONFIG_DIR);
                if local.exists() {
                    local
                } else {
                    backend_dir()
                        .parent()
                        .map(|root| root.join(defaults::CONFIG_DIR))
                        .unwrap_or(local)
                }
            });

        Self {
            database: DatabaseConfig::from_env(),
            config_dir,
            scheduler_poll_secs: parse_env_in_range(
                env_vars::SCHEDULER_POLL_SECS,
                defaults::SCHEDULER_POLL_SECS,
                limits::SCHEDULER_POLL_SECS,
            ),
            premium_sweep_secs: parse_env_in_range(
                env_vars::PREMIUM_SWEEP_SECS,
                defaults::PREMIUM_SWEEP_SECS,
                limits::PREMIUM_SWEEP_SECS,
            ),
            profile_max_age_days: parse_env_in_range(
                env_vars::PROFILE_MAX_AGE_DAYS,
                defaults::PROFILE_MAX_AGE_DAYS,
                limits::PROFILE_MAX_AGE_DAYS,
            ),
        }
    }
}
