use crate::error::CoreError;
use crate::models::{NewNotificationData, Notification, NotificationKind, NotificationPage};
use crate::repository::{NotificationRepository, SqliteRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::QueryBuilder;
use uuid::Uuid;

#[async_trait]
impl super::NotificationRepository for SqliteRepository {
    async fn create_notification(
        &self,
        data: NewNotificationData,
    ) -> Result<Notification, CoreError> {
        let notification = Notification {
            id: Uuid::now_v7(),
            user_id: data.user_id,
            kind: data.kind,
            title: data.title,
            body: data.body,
            todo_id: data.todo_id,
            reminder_id: data.reminder_id,
            read: false,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"INSERT INTO notifications
            (id, user_id, kind, title, body, todo_id, reminder_id, read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(notification.id)
        .bind(notification.user_id)
        .bind(notification.kind)
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(notification.todo_id)
        .bind(notification.reminder_id)
        .bind(notification.read)
        .bind(notification.created_at)
        .execute(self.pool())
        .await?;

        Ok(notification)
    }

    async fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<NotificationPage, CoreError> {
        let items: Vec<Notification> = if unread_only {
            sqlx::query_as(
                r#"SELECT * FROM notifications
                WHERE user_id = $1 AND read = FALSE
                ORDER BY created_at DESC
                LIMIT $2 OFFSET $3"#,
            )
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool())
            .await?
        } else {
            sqlx::query_as(
                r#"SELECT * FROM notifications
                WHERE user_id = $1
                ORDER BY created_at DESC
                LIMIT $2 OFFSET $3"#,
            )
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool())
            .await?
        };

        let total: i64 = if unread_only {
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND read = FALSE",
            )
            .bind(user_id)
            .fetch_one(self.pool())
            .await?
        } else {
            sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(self.pool())
                .await?
        };

        let unread = self.unread_count(user_id).await?;

        Ok(NotificationPage {
            items,
            total,
            unread,
        })
    }

    async fn unread_count(&self, user_id: Uuid) -> Result<i64, CoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND read = FALSE",
        )
        .bind(user_id)
        .fetch_one(self.pool())
        .await?;
        Ok(count)
    }

    async fn set_notification_read(
        &self,
        user_id: Uuid,
        id: Uuid,
        read: bool,
    ) -> Result<Notification, CoreError> {
        let updated: Option<Notification> = sqlx::query_as(
            "UPDATE notifications SET read = $1 WHERE id = $2 AND user_id = $3 RETURNING *",
        )
        .bind(read)
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;
        updated.ok_or_else(|| CoreError::NotFound(format!("Notification {id}")))
    }

    async fn mark_notifications_read(
        &self,
        user_id: Uuid,
        ids: &[Uuid],
    ) -> Result<u64, CoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("UPDATE notifications SET read = TRUE WHERE user_id = ");
        builder.push_bind(user_id);
        builder.push(" AND read = FALSE AND id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        builder.push(")");

        let result = builder.build().execute(self.pool()).await?;
        Ok(result.rows_affected())
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, CoreError> {
        let result = sqlx::query(
            "UPDATE notifications SET read = TRUE WHERE user_id = $1 AND read = FALSE",
        )
        .bind(user_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_notification(&self, user_id: Uuid, id: Uuid) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("Notification {id}")));
        }
        Ok(())
    }

    async fn digest_sent_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<bool, CoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM notifications
            WHERE user_id = $1 AND kind = $2 AND created_at >= $3"#,
        )
        .bind(user_id)
        .bind(NotificationKind::DailyDigest)
        .bind(since)
        .fetch_one(self.pool())
        .await?;
        Ok(count > 0)
    }

    async fn delete_notifications_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, CoreError> {
        let result = sqlx::query("DELETE FROM notifications WHERE created_at < $1")
            .bind(cutoff)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }
}
