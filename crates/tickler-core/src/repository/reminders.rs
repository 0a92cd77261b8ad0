use crate::error::CoreError;
use crate::models::{NewReminderData, Reminder, ReminderStatus, Todo};
use crate::repository::SqliteRepository;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use uuid::Uuid;

/// Cap on simultaneously active (pending or snoozed) reminders per todo.
pub const MAX_ACTIVE_REMINDERS: usize = 5;

#[async_trait]
impl super::ReminderRepository for SqliteRepository {
    async fn create_reminder(
        &self,
        user_id: Uuid,
        todo_id: Uuid,
        data: NewReminderData,
    ) -> Result<Reminder, CoreError> {
        match (data.fire_at, data.offset_minutes) {
            (Some(_), Some(_)) | (None, None) => {
                return Err(CoreError::InvalidInput(
                    "exactly one of fire_at and offset_minutes must be provided".to_string(),
                ));
            }
            _ => {}
        }
        if let Some(offset) = data.offset_minutes {
            if offset >= 0 {
                return Err(CoreError::InvalidInput(
                    "offset_minutes must be a negative number of minutes before the due date"
                        .to_string(),
                ));
            }
        }

        let mut tx = self.pool().begin().await?;

        let todo: Todo = sqlx::query_as("SELECT * FROM todos WHERE id = $1 AND user_id = $2")
            .bind(todo_id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Todo {todo_id}")))?;

        // Cap check inside the transaction so racing creates cannot both
        // squeeze under the limit.
        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reminders WHERE todo_id = $1 AND status IN ('pending', 'snoozed')",
        )
        .bind(todo_id)
        .fetch_one(&mut *tx)
        .await?;
        if active >= MAX_ACTIVE_REMINDERS as i64 {
            return Err(CoreError::TooManyReminders(MAX_ACTIVE_REMINDERS));
        }

        let fire_at = match data.fire_at {
            Some(at) => at,
            None => {
                let offset = data.offset_minutes.unwrap_or_default();
                let due = todo.due_date.ok_or_else(|| {
                    CoreError::InvalidInput(
                        "offset_minutes requires the todo to have a due date".to_string(),
                    )
                })?;
                // Offsets are anchored at UTC midnight of the due date.
                due.and_time(NaiveTime::MIN).and_utc() + Duration::minutes(offset)
            }
        };

        if let Some(occurrence_id) = data.occurrence_id {
            let belongs: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM todo_occurrences WHERE id = $1 AND parent_todo_id = $2",
            )
            .bind(occurrence_id)
            .bind(todo_id)
            .fetch_one(&mut *tx)
            .await?;
            if belongs == 0 {
                return Err(CoreError::InvalidInput(
                    "occurrence does not belong to this todo".to_string(),
                ));
            }
        }

        let reminder = Reminder {
            id: Uuid::now_v7(),
            todo_id,
            occurrence_id: data.occurrence_id,
            user_id,
            fire_at,
            offset_minutes: data.offset_minutes,
            status: ReminderStatus::Pending,
            sent_at: None,
            snoozed_until: None,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"INSERT INTO reminders
            (id, todo_id, occurrence_id, user_id, fire_at, offset_minutes, status, sent_at, snoozed_until, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
        )
        .bind(reminder.id)
        .bind(reminder.todo_id)
        .bind(reminder.occurrence_id)
        .bind(reminder.user_id)
        .bind(reminder.fire_at)
        .bind(reminder.offset_minutes)
        .bind(reminder.status)
        .bind(reminder.sent_at)
        .bind(reminder.snoozed_until)
        .bind(reminder.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(reminder)
    }

    async fn list_reminders(
        &self,
        user_id: Uuid,
        todo_id: Uuid,
        include_fired: bool,
    ) -> Result<Vec<Reminder>, CoreError> {
        let owned: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM todos WHERE id = $1 AND user_id = $2")
                .bind(todo_id)
                .bind(user_id)
                .fetch_one(self.pool())
                .await?;
        if owned == 0 {
            return Err(CoreError::NotFound(format!("Todo {todo_id}")));
        }

        let reminders = if include_fired {
            sqlx::query_as(
                r#"SELECT * FROM reminders
                WHERE todo_id = $1 AND user_id = $2
                ORDER BY fire_at"#,
            )
            .bind(todo_id)
            .bind(user_id)
            .fetch_all(self.pool())
            .await?
        } else {
            sqlx::query_as(
                r#"SELECT * FROM reminders
                WHERE todo_id = $1 AND user_id = $2 AND status IN ('pending', 'snoozed')
                ORDER BY fire_at"#,
            )
            .bind(todo_id)
            .bind(user_id)
            .fetch_all(self.pool())
            .await?
        };
        Ok(reminders)
    }

    async fn delete_reminder(&self, user_id: Uuid, id: Uuid) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM reminders WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("Reminder {id}")));
        }
        Ok(())
    }

    async fn snooze_reminder(
        &self,
        user_id: Uuid,
        id: Uuid,
        minutes: i64,
        now: DateTime<Utc>,
    ) -> Result<Reminder, CoreError> {
        if minutes <= 0 {
            return Err(CoreError::InvalidInput(
                "snooze minutes must be positive".to_string(),
            ));
        }

        let until = now + Duration::minutes(minutes);

        // No separate queue: moving fire_at forward is enough for the
        // dispatcher's due query to pick the reminder up again.
        let updated: Option<Reminder> = sqlx::query_as(
            r#"UPDATE reminders
            SET status = $1, fire_at = $2, snoozed_until = $3
            WHERE id = $4 AND user_id = $5 AND status IN ('pending', 'snoozed')
            RETURNING *"#,
        )
        .bind(ReminderStatus::Snoozed)
        .bind(until)
        .bind(until)
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;

        match updated {
            Some(reminder) => Ok(reminder),
            None => {
                let exists: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM reminders WHERE id = $1 AND user_id = $2")
                        .bind(id)
                        .bind(user_id)
                        .fetch_one(self.pool())
                        .await?;
                if exists == 0 {
                    Err(CoreError::NotFound(format!("Reminder {id}")))
                } else {
                    Err(CoreError::InvalidInput(
                        "cannot snooze a sent or cancelled reminder".to_string(),
                    ))
                }
            }
        }
    }

    async fn due_reminders(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Reminder>, CoreError> {
        let reminders = sqlx::query_as(
            r#"SELECT * FROM reminders
            WHERE fire_at <= $1 AND status IN ('pending', 'snoozed')
            ORDER BY fire_at ASC
            LIMIT $2"#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(reminders)
    }

    async fn mark_reminder_sent(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, CoreError> {
        // The status guard makes the transition atomic: a reminder that
        // already reached a terminal state is never re-sent.
        let result = sqlx::query(
            r#"UPDATE reminders
            SET status = $1, sent_at = $2
            WHERE id = $3 AND status IN ('pending', 'snoozed')"#,
        )
        .bind(ReminderStatus::Sent)
        .bind(now)
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn cancel_reminder(&self, id: Uuid) -> Result<bool, CoreError> {
        let result = sqlx::query(
            r#"UPDATE reminders
            SET status = $1
            WHERE id = $2 AND status IN ('pending', 'snoozed')"#,
        )
        .bind(ReminderStatus::Cancelled)
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
