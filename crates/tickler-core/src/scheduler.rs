//! Process-wide periodic job host.
//!
//! One `Scheduler` per deployment owns four named loops, all on UTC timers:
//!
//! | job        | cadence            |
//! |------------|--------------------|
//! | dispatcher | every minute       |
//! | digest     | hourly at minute 0 |
//! | maintainer | daily at 01:00     |
//! | sweeper    | daily at 02:00     |
//!
//! Each loop awaits its job body before sleeping again, so ticks never
//! overlap; missed interval ticks are coalesced rather than bursted, and a
//! boundary run that starts more than the misfire grace late is dropped.
//! Shutdown lets the in-flight tick of every job finish.

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Timelike, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::jobs::{DigestDispatcher, ReminderDispatcher, RetentionSweeper};
use crate::push::PushTransport;
use crate::repository::{MaintenanceRepository, SqliteRepository};

/// Timer configuration for the scheduler's four jobs.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Reminder dispatcher cadence
    pub dispatcher_interval: Duration,
    /// UTC hour of the daily occurrence top-up
    pub maintenance_hour: u32,
    /// UTC hour of the daily notification sweep
    pub retention_hour: u32,
    /// How late a boundary job may start and still run
    pub misfire_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            dispatcher_interval: Duration::from_secs(60),
            maintenance_hour: 1,
            retention_hour: 2,
            misfire_grace: Duration::from_secs(60),
        }
    }
}

/// The long-lived scheduler owned by the process host. Jobs receive the
/// repository handle as a parameter; no state beyond the database survives a
/// restart, and the dispatcher catches up naturally because its query is
/// time-based.
pub struct Scheduler {
    repo: Arc<SqliteRepository>,
    transport: Arc<dyn PushTransport>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(repo: Arc<SqliteRepository>, transport: Arc<dyn PushTransport>) -> Self {
        Self::with_config(repo, transport, SchedulerConfig::default())
    }

    pub fn with_config(
        repo: Arc<SqliteRepository>,
        transport: Arc<dyn PushTransport>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            repo,
            transport,
            config,
        }
    }

    /// Runs all four job loops until `shutdown` flips, then waits for the
    /// in-flight tick of each to complete.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let grace = ChronoDuration::from_std(self.config.misfire_grace)
            .unwrap_or_else(|_| ChronoDuration::seconds(60));

        let mut tasks = Vec::new();

        // Reminder dispatcher: every minute, coalescing missed ticks.
        {
            let repo = Arc::clone(&self.repo);
            let transport = Arc::clone(&self.transport);
            let interval = self.config.dispatcher_interval;
            let mut shutdown = shutdown.clone();
            tasks.push(tokio::spawn(async move {
                let dispatcher = ReminderDispatcher::default();
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(e) = dispatcher
                                .run_once(repo.as_ref(), transport.as_ref(), Utc::now())
                                .await
                            {
                                tracing::error!(error = %e, "reminder dispatch tick failed");
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }
                tracing::debug!("reminder dispatcher stopped");
            }));
        }

        // Daily digest: hourly on the hour.
        {
            let repo = Arc::clone(&self.repo);
            let mut shutdown = shutdown.clone();
            tasks.push(tokio::spawn(async move {
                let digest = DigestDispatcher;
                loop {
                    let target = next_hour_boundary(Utc::now());
                    tokio::select! {
                        _ = sleep_until(target) => {
                            if misfired(target, Utc::now(), grace) {
                                tracing::warn!(job = "digest", "missed scheduled run; skipping");
                                continue;
                            }
                            if let Err(e) = digest.run_once(repo.as_ref(), Utc::now()).await {
                                tracing::error!(error = %e, "daily digest tick failed");
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }
                tracing::debug!("digest dispatcher stopped");
            }));
        }

        // Occurrence maintainer: daily at the configured UTC hour.
        {
            let repo = Arc::clone(&self.repo);
            let hour = self.config.maintenance_hour;
            let mut shutdown = shutdown.clone();
            tasks.push(tokio::spawn(async move {
                loop {
                    let target = next_daily_boundary(Utc::now(), hour);
                    tokio::select! {
                        _ = sleep_until(target) => {
                            if misfired(target, Utc::now(), grace) {
                                tracing::warn!(job = "maintainer", "missed scheduled run; skipping");
                                continue;
                            }
                            let today = Utc::now().date_naive();
                            match repo.top_up_all(today).await {
                                Ok(count) if count > 0 => {
                                    tracing::info!(count, "generated occurrences");
                                }
                                Ok(_) => {}
                                Err(e) => {
                                    tracing::error!(error = %e, "occurrence maintenance failed");
                                }
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }
                tracing::debug!("occurrence maintainer stopped");
            }));
        }

        // Retention sweeper: daily at the configured UTC hour.
        {
            let repo = Arc::clone(&self.repo);
            let hour = self.config.retention_hour;
            let mut shutdown = shutdown.clone();
            tasks.push(tokio::spawn(async move {
                let sweeper = RetentionSweeper;
                loop {
                    let target = next_daily_boundary(Utc::now(), hour);
                    tokio::select! {
                        _ = sleep_until(target) => {
                            if misfired(target, Utc::now(), grace) {
                                tracing::warn!(job = "sweeper", "missed scheduled run; skipping");
                                continue;
                            }
                            if let Err(e) = sweeper.run_once(repo.as_ref(), Utc::now()).await {
                                tracing::error!(error = %e, "retention sweep failed");
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }
                tracing::debug!("retention sweeper stopped");
            }));
        }

        tracing::info!("scheduler started");
        for task in tasks {
            let _ = task.await;
        }
        tracing::info!("scheduler stopped");
    }
}

async fn sleep_until(target: DateTime<Utc>) {
    let wait = (target - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    tokio::time::sleep(wait).await;
}

fn misfired(target: DateTime<Utc>, now: DateTime<Utc>, grace: ChronoDuration) -> bool {
    now - target > grace
}

/// The next top-of-hour strictly after `now`.
fn next_hour_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
    let hour_start = now
        .date_naive()
        .and_time(NaiveTime::from_hms_opt(now.hour(), 0, 0).unwrap_or(NaiveTime::MIN))
        .and_utc();
    hour_start + ChronoDuration::hours(1)
}

/// The next occurrence of `hour:00` UTC strictly after `now`.
fn next_daily_boundary(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let today_target = now
        .date_naive()
        .and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN))
        .and_utc();
    if today_target > now {
        today_target
    } else {
        today_target + ChronoDuration::days(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_next_hour_boundary() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 15, 30).unwrap();
        assert_eq!(
            next_hour_boundary(now),
            Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()
        );

        let on_the_hour = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        assert_eq!(
            next_hour_boundary(on_the_hour),
            Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_next_daily_boundary() {
        let before = Utc.with_ymd_and_hms(2026, 3, 1, 0, 30, 0).unwrap();
        assert_eq!(
            next_daily_boundary(before, 2),
            Utc.with_ymd_and_hms(2026, 3, 1, 2, 0, 0).unwrap()
        );

        let after = Utc.with_ymd_and_hms(2026, 3, 1, 2, 0, 0).unwrap();
        assert_eq!(
            next_daily_boundary(after, 2),
            Utc.with_ymd_and_hms(2026, 3, 2, 2, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_misfire_grace() {
        let target = Utc.with_ymd_and_hms(2026, 3, 1, 2, 0, 0).unwrap();
        let grace = ChronoDuration::seconds(60);

        assert!(!misfired(target, target + ChronoDuration::seconds(30), grace));
        assert!(!misfired(target, target + ChronoDuration::seconds(60), grace));
        assert!(misfired(target, target + ChronoDuration::seconds(61), grace));
    }
}
