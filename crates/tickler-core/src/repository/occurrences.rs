use crate::error::CoreError;
use crate::models::{Occurrence, OccurrenceStatus};
use crate::repository::{OccurrenceRepository, SqliteRepository, TodoRepository};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

#[async_trait]
impl super::OccurrenceRepository for SqliteRepository {
    async fn find_occurrence(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Occurrence>, CoreError> {
        let occurrence =
            sqlx::query_as("SELECT * FROM todo_occurrences WHERE id = $1 AND user_id = $2")
                .bind(id)
                .bind(user_id)
                .fetch_optional(self.pool())
                .await?;
        Ok(occurrence)
    }

    async fn list_occurrences(
        &self,
        user_id: Uuid,
        todo_id: Uuid,
        status: Option<OccurrenceStatus>,
    ) -> Result<Vec<Occurrence>, CoreError> {
        // Owner check first so a foreign todo id reads as not-found.
        self.find_todo(user_id, todo_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Todo {todo_id}")))?;

        let occurrences = match status {
            Some(status) => {
                sqlx::query_as(
                    r#"SELECT * FROM todo_occurrences
                    WHERE parent_todo_id = $1 AND user_id = $2 AND status = $3
                    ORDER BY occurrence_date"#,
                )
                .bind(todo_id)
                .bind(user_id)
                .bind(status)
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"SELECT * FROM todo_occurrences
                    WHERE parent_todo_id = $1 AND user_id = $2
                    ORDER BY occurrence_date"#,
                )
                .bind(todo_id)
                .bind(user_id)
                .fetch_all(self.pool())
                .await?
            }
        };
        Ok(occurrences)
    }

    async fn current_occurrence(
        &self,
        user_id: Uuid,
        todo_id: Uuid,
    ) -> Result<Option<Occurrence>, CoreError> {
        let today = Utc::now().date_naive();

        let today_occurrence: Option<Occurrence> = sqlx::query_as(
            r#"SELECT * FROM todo_occurrences
            WHERE parent_todo_id = $1 AND user_id = $2 AND occurrence_date = $3"#,
        )
        .bind(todo_id)
        .bind(user_id)
        .bind(today)
        .fetch_optional(self.pool())
        .await?;

        if today_occurrence.is_some() {
            return Ok(today_occurrence);
        }

        // Never a past-pending occurrence; callers wanting overdue filter
        // explicitly.
        let next = sqlx::query_as(
            r#"SELECT * FROM todo_occurrences
            WHERE parent_todo_id = $1 AND user_id = $2 AND status = $3 AND occurrence_date > $4
            ORDER BY occurrence_date
            LIMIT 1"#,
        )
        .bind(todo_id)
        .bind(user_id)
        .bind(OccurrenceStatus::Pending)
        .bind(today)
        .fetch_optional(self.pool())
        .await?;
        Ok(next)
    }

    async fn complete_occurrence(&self, user_id: Uuid, id: Uuid) -> Result<Occurrence, CoreError> {
        let now = Utc::now();
        let occurrence = self
            .transition_occurrence(user_id, id, OccurrenceStatus::Completed, Some(now), now)
            .await?;
        self.ensure_upcoming(occurrence.parent_todo_id).await?;
        Ok(occurrence)
    }

    async fn skip_occurrence(&self, user_id: Uuid, id: Uuid) -> Result<Occurrence, CoreError> {
        let now = Utc::now();
        let occurrence = self
            .transition_occurrence(user_id, id, OccurrenceStatus::Skipped, None, now)
            .await?;
        self.ensure_upcoming(occurrence.parent_todo_id).await?;
        Ok(occurrence)
    }

    async fn pending_occurrences_on(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Occurrence>, CoreError> {
        let occurrences = sqlx::query_as(
            r#"SELECT * FROM todo_occurrences
            WHERE user_id = $1 AND occurrence_date = $2 AND status = $3
            ORDER BY created_at"#,
        )
        .bind(user_id)
        .bind(date)
        .bind(OccurrenceStatus::Pending)
        .fetch_all(self.pool())
        .await?;
        Ok(occurrences)
    }
}

impl SqliteRepository {
    /// Terminal status write. The status guard is part of the UPDATE so the
    /// check is atomic with the transition even under concurrent editors.
    async fn transition_occurrence(
        &self,
        user_id: Uuid,
        id: Uuid,
        status: OccurrenceStatus,
        completed_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Occurrence, CoreError> {
        let updated: Option<Occurrence> = sqlx::query_as(
            r#"UPDATE todo_occurrences
            SET status = $1, completed_at = $2, updated_at = $3
            WHERE id = $4 AND user_id = $5 AND status = $6
            RETURNING *"#,
        )
        .bind(status)
        .bind(completed_at)
        .bind(now)
        .bind(id)
        .bind(user_id)
        .bind(OccurrenceStatus::Pending)
        .fetch_optional(self.pool())
        .await?;

        match updated {
            Some(occurrence) => Ok(occurrence),
            None => match self.find_occurrence(user_id, id).await? {
                None => Err(CoreError::NotFound(format!("Occurrence {id}"))),
                Some(_) => Err(CoreError::InvalidInput(
                    "occurrence is already completed or skipped".to_string(),
                )),
            },
        }
    }
}
