use crate::error::CoreError;
use crate::models::{OccurrenceStatus, Todo};
use crate::recurrence;
use crate::repository::{MaintenanceRepository, SqliteRepository, TodoRepository};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use std::collections::HashSet;
use uuid::Uuid;

/// Configuration for occurrence-window maintenance.
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// Length of the materialization window in days
    pub window_days: i64,
    /// Floor of pending future occurrences below which a series is refilled
    pub min_upcoming: i64,
    /// Upper bound on occurrences inserted per top-up
    pub max_batch: usize,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            window_days: 30,
            min_upcoming: 5,
            max_batch: 100,
        }
    }
}

#[async_trait]
impl super::MaintenanceRepository for SqliteRepository {
    async fn top_up_series(
        &self,
        todo_id: Uuid,
        from_date: NaiveDate,
        max: usize,
    ) -> Result<usize, CoreError> {
        let mut tx = self.pool().begin().await?;

        let todo: Todo = sqlx::query_as("SELECT * FROM todos WHERE id = $1")
            .bind(todo_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Todo {todo_id}")))?;

        let (Some(rrule), Some(anchor)) = (todo.rrule.clone(), todo.due_date) else {
            return Ok(0);
        };
        if !todo.is_recurring {
            return Ok(0);
        }

        // Pull only the dates; the set makes re-runs cheap no-ops.
        let existing: Vec<NaiveDate> = sqlx::query_scalar(
            "SELECT occurrence_date FROM todo_occurrences WHERE parent_todo_id = $1",
        )
        .bind(todo_id)
        .fetch_all(&mut *tx)
        .await?;
        let existing: HashSet<NaiveDate> = existing.into_iter().collect();

        let cap = max.min(self.maintenance().max_batch);
        let window_end = from_date + Duration::days(self.maintenance().window_days);
        let dates = recurrence::enumerate_dates(&rrule, anchor, from_date, window_end, cap)?;

        let now = Utc::now();
        let mut inserted = 0usize;
        for date in dates {
            if existing.contains(&date) {
                continue;
            }

            // The UNIQUE (parent_todo_id, occurrence_date) constraint makes
            // concurrent top-ups of the same series safe.
            let result = sqlx::query(
                r#"INSERT OR IGNORE INTO todo_occurrences
                (id, parent_todo_id, user_id, occurrence_date, status, completed_at, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, NULL, $6, $7)"#,
            )
            .bind(Uuid::now_v7())
            .bind(todo_id)
            .bind(todo.user_id)
            .bind(date)
            .bind(OccurrenceStatus::Pending)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            inserted += result.rows_affected() as usize;
        }

        if inserted > 0 {
            sqlx::query(
                "UPDATE todos SET occurrences_generated = occurrences_generated + $1, updated_at = $2 WHERE id = $3",
            )
            .bind(inserted as i64)
            .bind(now)
            .bind(todo_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn top_up_all(&self, today: NaiveDate) -> Result<usize, CoreError> {
        let series = self.list_recurring_todos().await?;
        let window = self.maintenance().window_days as usize;

        let mut total = 0;
        for todo in series {
            match self.top_up_series(todo.id, today, window).await {
                Ok(count) => total += count,
                Err(e) => {
                    tracing::error!(todo_id = %todo.id, error = %e, "occurrence top-up failed");
                }
            }
        }
        Ok(total)
    }
}

impl SqliteRepository {
    /// Refills the window when the series has fallen below the floor of
    /// pending future occurrences, starting the day after the latest known
    /// occurrence.
    pub(crate) async fn ensure_upcoming(&self, todo_id: Uuid) -> Result<usize, CoreError> {
        let Some(todo) = self.todo_by_id(todo_id).await? else {
            return Ok(0);
        };
        if !todo.is_recurring || todo.rrule.is_none() {
            return Ok(0);
        }

        let today = Utc::now().date_naive();
        let pending: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM todo_occurrences
            WHERE parent_todo_id = $1 AND status = $2 AND occurrence_date >= $3"#,
        )
        .bind(todo_id)
        .bind(OccurrenceStatus::Pending)
        .bind(today)
        .fetch_one(self.pool())
        .await?;

        let floor = self.maintenance().min_upcoming;
        if pending >= floor {
            return Ok(0);
        }

        let latest: Option<NaiveDate> = sqlx::query_scalar(
            "SELECT MAX(occurrence_date) FROM todo_occurrences WHERE parent_todo_id = $1",
        )
        .bind(todo_id)
        .fetch_one(self.pool())
        .await?;

        let Some(from) = latest.map(|d| d + Duration::days(1)).or(todo.due_date) else {
            return Ok(0);
        };

        self.top_up_series(todo_id, from, (floor * 2) as usize).await
    }
}
