use crate::error::CoreError;
use crate::models::Tag;
use crate::repository::SqliteRepository;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Sqlite, Transaction};
use uuid::Uuid;

#[async_trait]
impl super::TagRepository for SqliteRepository {
    async fn create_tag(
        &self,
        user_id: Uuid,
        name: &str,
        color: Option<String>,
    ) -> Result<Tag, CoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::InvalidInput(
                "tag name must not be blank".to_string(),
            ));
        }

        let duplicate: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tags WHERE user_id = $1 AND lower(name) = lower($2)",
        )
        .bind(user_id)
        .bind(name)
        .fetch_one(self.pool())
        .await?;
        if duplicate > 0 {
            return Err(CoreError::InvalidInput(format!(
                "a tag named '{name}' already exists"
            )));
        }

        let tag = Tag {
            id: Uuid::now_v7(),
            user_id,
            name: name.to_string(),
            color,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO tags (id, user_id, name, color, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(tag.id)
        .bind(tag.user_id)
        .bind(&tag.name)
        .bind(&tag.color)
        .bind(tag.created_at)
        .execute(self.pool())
        .await?;

        Ok(tag)
    }

    async fn list_tags(&self, user_id: Uuid) -> Result<Vec<Tag>, CoreError> {
        let tags = sqlx::query_as("SELECT * FROM tags WHERE user_id = $1 ORDER BY name")
            .bind(user_id)
            .fetch_all(self.pool())
            .await?;
        Ok(tags)
    }

    async fn tags_for_todo(&self, todo_id: Uuid) -> Result<Vec<Tag>, CoreError> {
        let tags = sqlx::query_as(
            r#"SELECT t.* FROM tags t
            INNER JOIN todo_tags tt ON t.id = tt.tag_id
            WHERE tt.todo_id = $1
            ORDER BY t.name"#,
        )
        .bind(todo_id)
        .fetch_all(self.pool())
        .await?;
        Ok(tags)
    }
}

impl SqliteRepository {
    /// Attaches tags to a todo inside an open transaction. Tag ids that do
    /// not exist or belong to another user are silently ignored.
    pub(crate) async fn assign_tags_in_tx(
        tx: &mut Transaction<'_, Sqlite>,
        user_id: Uuid,
        todo_id: Uuid,
        tag_ids: &[Uuid],
    ) -> Result<(), CoreError> {
        for tag_id in tag_ids {
            let owned: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM tags WHERE id = $1 AND user_id = $2")
                    .bind(tag_id)
                    .bind(user_id)
                    .fetch_one(&mut **tx)
                    .await?;
            if owned == 0 {
                continue;
            }

            sqlx::query("INSERT OR IGNORE INTO todo_tags (todo_id, tag_id) VALUES ($1, $2)")
                .bind(todo_id)
                .bind(tag_id)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }

    /// Replaces the todo's entire tag set.
    pub(crate) async fn replace_tags(
        &self,
        user_id: Uuid,
        todo_id: Uuid,
        tag_ids: &[Uuid],
    ) -> Result<(), CoreError> {
        let mut tx = self.pool().begin().await?;

        sqlx::query("DELETE FROM todo_tags WHERE todo_id = $1")
            .bind(todo_id)
            .execute(&mut *tx)
            .await?;

        Self::assign_tags_in_tx(&mut tx, user_id, todo_id, tag_ids).await?;

        tx.commit().await?;
        Ok(())
    }
}
