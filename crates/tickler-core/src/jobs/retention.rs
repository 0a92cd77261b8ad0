use chrono::{DateTime, Duration, Utc};

use crate::error::CoreError;
use crate::repository::{NotificationRepository, Repository};

/// Age beyond which notifications are removed.
pub const RETENTION_DAYS: i64 = 30;

/// Daily sweep that deletes notifications older than the retention horizon.
pub struct RetentionSweeper;

impl RetentionSweeper {
    /// Deletes everything created before `now - 30 days`. Idempotent; returns
    /// the number of rows removed.
    pub async fn run_once<R>(&self, repo: &R, now: DateTime<Utc>) -> Result<u64, CoreError>
    where
        R: Repository + ?Sized,
    {
        let cutoff = now - Duration::days(RETENTION_DAYS);
        let deleted = repo.delete_notifications_before(cutoff).await?;
        if deleted > 0 {
            tracing::info!(deleted, retention_days = RETENTION_DAYS, "pruned old notifications");
        }
        Ok(deleted)
    }
}
