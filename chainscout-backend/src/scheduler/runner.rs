use crate::config::{Config, defaults};
use crate::db::Database;
use crate::db::tables::profiles::ProfilePurge;
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::{Duration as TokioDuration, interval};

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Poll interval in seconds for checking due jobs
    pub poll_interval_secs: u64,
    /// Minimum seconds between two premium expiry sweeps
    pub premium_sweep_interval_secs: u64,
    /// Token and wallet profiles older than this are purged once a day
    pub profile_max_age_days: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            poll_interval_secs: defaults::SCHEDULER_POLL_SECS,
            premium_sweep_interval_secs: defaults::PREMIUM_SWEEP_SECS,
            profile_max_age_days: defaults::PROFILE_MAX_AGE_DAYS,
        }
    }
}

impl From<&Config> for SchedulerConfig {
    fn from(config: &Config) -> Self {
        SchedulerConfig {
            poll_interval_secs: config.scheduler_poll_secs,
            premium_sweep_interval_secs: config.premium_sweep_secs,
            profile_max_age_days: config.profile_max_age_days,
        }
    }
}

/// What one pass of `run_due_jobs` did. `None` means the job was not due
/// (or failed and will be retried on the next pass).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub scan_counters_reset: Option<usize>,
    pub profiles_purged: Option<ProfilePurge>,
    pub premium_expired: Option<usize>,
}

#[derive(Debug, Default)]
struct ScheduleState {
    last_daily_run: Option<NaiveDate>,
    last_premium_sweep: Option<DateTime<Utc>>,
}

/// Background task driving the store's periodic maintenance:
/// daily quota reset and profile purge, and the premium expiry sweep.
pub struct MaintenanceScheduler {
    db: Arc<Database>,
    config: SchedulerConfig,
    state: Mutex<ScheduleState>,
}

impl MaintenanceScheduler {
    pub fn new(db: Arc<Database>, config: SchedulerConfig) -> Self {
        MaintenanceScheduler {
            db,
            config,
            state: Mutex::new(ScheduleState::default()),
        }
    }

    /// Start the scheduler background task
    pub async fn start(self: Arc<Self>, mut shutdown_rx: oneshot::Receiver<()>) {
        log::info!(
            "[scheduler] Started (poll: {}s, premium sweep: {}s, profile max age: {}d)",
            self.config.poll_interval_secs,
            self.config.premium_sweep_interval_secs,
            self.config.profile_max_age_days
        );

        let mut poll_interval = interval(TokioDuration::from_secs(self.config.poll_interval_secs.max(1)));

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    log::info!("[scheduler] Received shutdown signal");
                    break;
                }
                _ = poll_interval.tick() => {
                    self.run_due_jobs(Utc::now());
                }
            }
        }

        log::info!("[scheduler] Stopped");
    }

    /// Run every job that is due at `now`. Failed jobs stay due.
    pub fn run_due_jobs(&self, now: DateTime<Utc>) -> MaintenanceReport {
        let mut state = self.state.lock();
        let mut report = MaintenanceReport::default();

        let today = now.date_naive();
        if state.last_daily_run != Some(today) {
            report.scan_counters_reset = match self.db.reset_scan_counts_except(today) {
                Ok(deleted) => Some(deleted),
                Err(e) => {
                    log::error!("[scheduler] Daily scan counter reset failed: {}", e);
                    None
                }
            };
            report.profiles_purged =
                match self.db.purge_stale_profiles_at(now, self.config.profile_max_age_days) {
                    Ok(purge) => Some(purge),
                    Err(e) => {
                        log::error!("[scheduler] Profile purge failed: {}", e);
                        None
                    }
                };
            if report.scan_counters_reset.is_some() && report.profiles_purged.is_some() {
                state.last_daily_run = Some(today);
            }
        }

        let sweep_due = match state.last_premium_sweep {
            Some(last) => i64::try_from(self.config.premium_sweep_interval_secs)
                .ok()
                .and_then(TimeDelta::try_seconds)
                .is_some_and(|every| now.signed_duration_since(last) >= every),
            None => true,
        };
        if sweep_due {
            match self.db.expire_premium_sweep_at(now) {
                Ok(expired) => {
                    report.premium_expired = Some(expired);
                    state.last_premium_sweep = Some(now);
                }
                Err(e) => log::error!("[scheduler] Premium expiry sweep failed: {}", e),
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::open_temp_db;
    use chainscout_types::{ScanType, TokenData};
    use chrono::Duration;

    fn scheduler(db: Database) -> MaintenanceScheduler {
        MaintenanceScheduler::new(
            Arc::new(db),
            SchedulerConfig {
                poll_interval_secs: 1,
                premium_sweep_interval_secs: 600,
                profile_max_age_days: 30,
            },
        )
    }

    #[test]
    fn test_daily_jobs_run_once_per_day() {
        let (_dir, db) = open_temp_db();
        let sched = scheduler(db);
        let now = DateTime::parse_from_rfc3339("2026-03-10T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let yesterday = (now - Duration::days(1)).date_naive();

        sched.db.increment_scan_count(1, ScanType::TokenScan, yesterday).unwrap();
        sched
            .db
            .save_token_at(&TokenData::new("0xold"), now - Duration::days(40))
            .unwrap();

        let first = sched.run_due_jobs(now);
        assert_eq!(first.scan_counters_reset, Some(1));
        assert_eq!(first.profiles_purged.map(|p| p.tokens), Some(1));

        // Same day again: daily jobs are skipped
        sched.db.increment_scan_count(1, ScanType::TokenScan, yesterday).unwrap();
        let second = sched.run_due_jobs(now + Duration::seconds(30));
        assert_eq!(second.scan_counters_reset, None);
        assert_eq!(second.profiles_purged, None);
        assert_eq!(sched.db.get_scan_count(1, ScanType::TokenScan, yesterday).unwrap(), 1);

        // Next day picks it up
        let third = sched.run_due_jobs(now + Duration::days(1));
        assert_eq!(third.scan_counters_reset, Some(1));
    }

    #[test]
    fn test_premium_sweep_respects_interval() {
        let (_dir, db) = open_temp_db();
        let sched = scheduler(db);
        let now = Utc::now();
        sched.db.ensure_user(1).unwrap();
        sched.db.grant_premium_at(1, 1, now - Duration::days(2)).unwrap();

        assert_eq!(sched.run_due_jobs(now).premium_expired, Some(1));
        assert_eq!(sched.run_due_jobs(now + Duration::seconds(60)).premium_expired, None);
        assert_eq!(sched.run_due_jobs(now + Duration::seconds(600)).premium_expired, Some(0));
        assert!(!sched.db.get_user(1).unwrap().unwrap().is_premium);
    }

    #[test]
    fn test_bad_profile_age_is_retried_not_fatal() {
        let (_dir, db) = open_temp_db();
        let sched = MaintenanceScheduler::new(
            Arc::new(db),
            SchedulerConfig {
                poll_interval_secs: 1,
                premium_sweep_interval_secs: u64::MAX,
                profile_max_age_days: i64::MAX,
            },
        );
        let now = Utc::now();

        let first = sched.run_due_jobs(now);
        assert!(first.scan_counters_reset.is_some());
        assert_eq!(first.profiles_purged, None);
        assert_eq!(first.premium_expired, Some(0));

        // Daily jobs stay due after the failed purge; an unrepresentable interval never fires again
        let second = sched.run_due_jobs(now + Duration::seconds(1));
        assert!(second.scan_counters_reset.is_some());
        assert_eq!(second.premium_expired, None);
    }

    #[tokio::test]
    async fn test_start_stops_on_shutdown() {
        let (_dir, db) = open_temp_db();
        let sched = Arc::new(scheduler(db));
        let (tx, rx) = oneshot::channel();

        let task = tokio::spawn(Arc::clone(&sched).start(rx));
        tx.send(()).unwrap();
        tokio::time::timeout(TokioDuration::from_secs(5), task)
            .await
            .expect("scheduler did not stop")
            .unwrap();
    }
}
