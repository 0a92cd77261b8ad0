use crate::error::CoreError;
use crate::models::{
    EditScope, NewReminderData, NewTodoData, OccurrenceStatus, Reminder, Todo, UpdateTodoData,
};
use crate::repository::{
    MaintenanceRepository, OccurrenceRepository, PreferencesRepository, ReminderRepository,
    SqliteRepository, TagRepository, TodoRepository,
};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use sqlx::{Sqlite, Transaction};
use uuid::Uuid;

const MAX_TITLE_LENGTH: usize = 255;

fn validated_title(raw: &str) -> Result<String, CoreError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(CoreError::InvalidInput("title must not be empty".to_string()));
    }
    if title.len() > MAX_TITLE_LENGTH {
        return Err(CoreError::InvalidInput(format!(
            "title must be at most {MAX_TITLE_LENGTH} characters"
        )));
    }
    Ok(title.to_string())
}

#[async_trait]
impl super::TodoRepository for SqliteRepository {
    async fn create_todo(&self, user_id: Uuid, data: NewTodoData) -> Result<Todo, CoreError> {
        let title = validated_title(&data.title)?;

        let mut rrule = None;
        let mut recurrence_end_date = None;
        let mut recurrence_count = None;
        if let Some(config) = &data.recurrence {
            if data.due_date.is_none() {
                return Err(CoreError::InvalidInput(
                    "due_date is required for recurring todos".to_string(),
                ));
            }
            rrule = Some(config.to_rrule()?);
            recurrence_end_date = config.end_date;
            recurrence_count = config.end_count.map(i64::from);
        }

        let now = Utc::now();
        let todo = Todo {
            id: Uuid::now_v7(),
            title,
            description: data.description.clone(),
            completed: false,
            user_id,
            due_date: data.due_date,
            priority: data.priority,
            is_recurring: data.recurrence.is_some(),
            rrule,
            recurrence_end_date,
            recurrence_count,
            occurrences_generated: 0,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.pool().begin().await?;
        Self::insert_todo_in_tx(&mut tx, &todo).await?;
        Self::assign_tags_in_tx(&mut tx, user_id, todo.id, &data.tag_ids).await?;
        tx.commit().await?;

        // Seed the first occurrence window for a new series.
        if todo.is_recurring {
            if let Some(due) = todo.due_date {
                self.top_up_series(todo.id, due, self.maintenance().window_days as usize)
                    .await?;
            }
        }

        if let Some(due) = todo.due_date {
            self.auto_default_reminder(user_id, todo.id, due).await?;
        }

        // Re-read so occurrences_generated reflects the seeded window.
        self.find_todo(user_id, todo.id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Todo {}", todo.id)))
    }

    async fn find_todo(&self, user_id: Uuid, id: Uuid) -> Result<Option<Todo>, CoreError> {
        let todo = sqlx::query_as("SELECT * FROM todos WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(todo)
    }

    async fn todo_by_id(&self, id: Uuid) -> Result<Option<Todo>, CoreError> {
        let todo = sqlx::query_as("SELECT * FROM todos WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(todo)
    }

    async fn list_todos(&self, user_id: Uuid) -> Result<Vec<Todo>, CoreError> {
        let todos =
            sqlx::query_as("SELECT * FROM todos WHERE user_id = $1 ORDER BY created_at DESC")
                .bind(user_id)
                .fetch_all(self.pool())
                .await?;
        Ok(todos)
    }

    async fn update_todo(
        &self,
        user_id: Uuid,
        id: Uuid,
        data: UpdateTodoData,
        scope: Option<EditScope>,
    ) -> Result<Todo, CoreError> {
        let todo = self
            .find_todo(user_id, id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Todo {id}")))?;

        if todo.is_recurring && scope == Some(EditScope::ThisOnly) {
            return self.split_occurrence_edit(user_id, todo, data).await;
        }

        // Non-recurring todos and all_future edits patch the row directly;
        // future occurrences inherit by looking the head up, not by copying.
        let title = match data.title {
            Some(t) => validated_title(&t)?,
            None => todo.title,
        };
        let description = match data.description {
            Some(d) => d,
            None => todo.description,
        };
        let completed = data.completed.unwrap_or(todo.completed);
        let due_date = match data.due_date {
            Some(d) => d,
            None => todo.due_date,
        };
        let priority = match data.priority {
            Some(p) => p,
            None => todo.priority,
        };

        if todo.is_recurring && due_date.is_none() {
            return Err(CoreError::InvalidInput(
                "a recurring todo requires a due date".to_string(),
            ));
        }

        let updated: Todo = sqlx::query_as(
            r#"UPDATE todos
            SET title = $1, description = $2, completed = $3, due_date = $4, priority = $5, updated_at = $6
            WHERE id = $7 AND user_id = $8
            RETURNING *"#,
        )
        .bind(&title)
        .bind(&description)
        .bind(completed)
        .bind(due_date)
        .bind(priority)
        .bind(Utc::now())
        .bind(id)
        .bind(user_id)
        .fetch_one(self.pool())
        .await?;

        if let Some(tag_ids) = data.tag_ids {
            self.replace_tags(user_id, id, &tag_ids).await?;
        }

        Ok(updated)
    }

    async fn stop_recurring(
        &self,
        user_id: Uuid,
        id: Uuid,
        keep_pending: bool,
    ) -> Result<Todo, CoreError> {
        let todo = self
            .find_todo(user_id, id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Todo {id}")))?;

        if !todo.is_recurring {
            return Ok(todo);
        }

        let now = Utc::now();
        let today = now.date_naive();

        let mut tx = self.pool().begin().await?;

        let updated: Todo = sqlx::query_as(
            r#"UPDATE todos
            SET is_recurring = FALSE, rrule = NULL, recurrence_end_date = $1, updated_at = $2
            WHERE id = $3
            RETURNING *"#,
        )
        .bind(today)
        .bind(now)
        .bind(todo.id)
        .fetch_one(&mut *tx)
        .await?;

        if !keep_pending {
            sqlx::query(
                r#"DELETE FROM todo_occurrences
                WHERE parent_todo_id = $1 AND status = $2 AND occurrence_date > $3"#,
            )
            .bind(todo.id)
            .bind(OccurrenceStatus::Pending)
            .bind(today)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_todo(&self, user_id: Uuid, id: Uuid) -> Result<(), CoreError> {
        // Foreign keys cascade to occurrences and reminders and null out
        // notification references.
        let result = sqlx::query("DELETE FROM todos WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("Todo {id}")));
        }
        Ok(())
    }

    async fn list_recurring_todos(&self) -> Result<Vec<Todo>, CoreError> {
        let todos = sqlx::query_as(
            "SELECT * FROM todos WHERE is_recurring = TRUE AND rrule IS NOT NULL",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(todos)
    }

    async fn todos_due_on(&self, user_id: Uuid, date: NaiveDate) -> Result<Vec<Todo>, CoreError> {
        let todos = sqlx::query_as(
            r#"SELECT * FROM todos
            WHERE user_id = $1 AND due_date = $2 AND completed = FALSE AND is_recurring = FALSE
            ORDER BY created_at"#,
        )
        .bind(user_id)
        .bind(date)
        .fetch_all(self.pool())
        .await?;
        Ok(todos)
    }
}

impl SqliteRepository {
    pub(crate) async fn insert_todo_in_tx(
        tx: &mut Transaction<'_, Sqlite>,
        todo: &Todo,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"INSERT INTO todos
            (id, title, description, completed, user_id, due_date, priority, is_recurring,
             rrule, recurrence_end_date, recurrence_count, occurrences_generated, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"#,
        )
        .bind(todo.id)
        .bind(&todo.title)
        .bind(&todo.description)
        .bind(todo.completed)
        .bind(todo.user_id)
        .bind(todo.due_date)
        .bind(todo.priority)
        .bind(todo.is_recurring)
        .bind(&todo.rrule)
        .bind(todo.recurrence_end_date)
        .bind(todo.recurrence_count)
        .bind(todo.occurrences_generated)
        .bind(todo.created_at)
        .bind(todo.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// "This only" edit of a recurring todo: materialize a standalone todo
    /// carrying the merged head+patch fields, skip the current occurrence so
    /// it no longer surfaces, and keep the future window full.
    async fn split_occurrence_edit(
        &self,
        user_id: Uuid,
        head: Todo,
        data: UpdateTodoData,
    ) -> Result<Todo, CoreError> {
        let current = self.current_occurrence(user_id, head.id).await?;

        let title = match data.title {
            Some(t) => validated_title(&t)?,
            None => head.title.clone(),
        };
        let description = match data.description {
            Some(d) => d,
            None => head.description.clone(),
        };
        let priority = match data.priority {
            Some(p) => p,
            None => head.priority,
        };
        // Due date precedence: the patch, then the occurrence being split
        // off, then the head's own due date.
        let due_date = match data.due_date {
            Some(d) => d,
            None => current
                .as_ref()
                .map(|occ| occ.occurrence_date)
                .or(head.due_date),
        };

        let now = Utc::now();
        let detached = Todo {
            id: Uuid::now_v7(),
            title,
            description,
            completed: data.completed.unwrap_or(false),
            user_id,
            due_date,
            priority,
            is_recurring: false,
            rrule: None,
            recurrence_end_date: None,
            recurrence_count: None,
            occurrences_generated: 0,
            created_at: now,
            updated_at: now,
        };

        // Tags are copied as references from the head unless the patch
        // replaces them.
        let tag_ids: Vec<Uuid> = match &data.tag_ids {
            Some(ids) => ids.clone(),
            None => self
                .tags_for_todo(head.id)
                .await?
                .into_iter()
                .map(|tag| tag.id)
                .collect(),
        };

        let mut tx = self.pool().begin().await?;
        Self::insert_todo_in_tx(&mut tx, &detached).await?;
        Self::assign_tags_in_tx(&mut tx, user_id, detached.id, &tag_ids).await?;

        if let Some(occ) = &current {
            if occ.status == OccurrenceStatus::Pending {
                sqlx::query(
                    "UPDATE todo_occurrences SET status = $1, updated_at = $2 WHERE id = $3",
                )
                .bind(OccurrenceStatus::Skipped)
                .bind(now)
                .bind(occ.id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;

        if current.is_some() {
            self.ensure_upcoming(head.id).await?;
        }

        Ok(detached)
    }

    /// Creates a reminder from the user's default offset when one is
    /// configured and the resulting fire time is still in the future.
    async fn auto_default_reminder(
        &self,
        user_id: Uuid,
        todo_id: Uuid,
        due: NaiveDate,
    ) -> Result<Option<Reminder>, CoreError> {
        let prefs = self.get_preferences(user_id).await?;
        let Some(offset) = prefs.default_reminder_offset else {
            return Ok(None);
        };

        let fire_at = due.and_time(NaiveTime::MIN).and_utc() + Duration::minutes(offset);
        if fire_at <= Utc::now() {
            return Ok(None);
        }

        let reminder = self
            .create_reminder(
                user_id,
                todo_id,
                NewReminderData {
                    offset_minutes: Some(offset),
                    ..Default::default()
                },
            )
            .await?;
        Ok(Some(reminder))
    }
}
