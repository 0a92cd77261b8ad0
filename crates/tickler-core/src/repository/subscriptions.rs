use crate::error::CoreError;
use crate::models::{NewSubscriptionData, PushSubscription};
use crate::repository::SqliteRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[async_trait]
impl super::PushSubscriptionRepository for SqliteRepository {
    async fn register_subscription(
        &self,
        user_id: Uuid,
        data: NewSubscriptionData,
    ) -> Result<PushSubscription, CoreError> {
        if data.endpoint.trim().is_empty() {
            return Err(CoreError::InvalidInput(
                "subscription endpoint must not be empty".to_string(),
            ));
        }

        let mut tx = self.pool().begin().await?;

        let existing: Option<PushSubscription> =
            sqlx::query_as("SELECT * FROM push_subscriptions WHERE endpoint = $1")
                .bind(&data.endpoint)
                .fetch_optional(&mut *tx)
                .await?;

        if let Some(subscription) = existing {
            // Same endpoint, different account: the device changed hands, so
            // rebind it to the current user.
            if subscription.user_id != user_id {
                let rebound: PushSubscription = sqlx::query_as(
                    "UPDATE push_subscriptions SET user_id = $1 WHERE id = $2 RETURNING *",
                )
                .bind(user_id)
                .bind(subscription.id)
                .fetch_one(&mut *tx)
                .await?;
                tx.commit().await?;
                return Ok(rebound);
            }
            tx.commit().await?;
            return Ok(subscription);
        }

        let subscription = PushSubscription {
            id: Uuid::now_v7(),
            user_id,
            endpoint: data.endpoint,
            p256dh_key: data.p256dh_key,
            auth_key: data.auth_key,
            user_agent: data.user_agent,
            created_at: Utc::now(),
            last_used_at: None,
        };

        sqlx::query(
            r#"INSERT INTO push_subscriptions
            (id, user_id, endpoint, p256dh_key, auth_key, user_agent, created_at, last_used_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
        )
        .bind(subscription.id)
        .bind(subscription.user_id)
        .bind(&subscription.endpoint)
        .bind(&subscription.p256dh_key)
        .bind(&subscription.auth_key)
        .bind(&subscription.user_agent)
        .bind(subscription.created_at)
        .bind(subscription.last_used_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(subscription)
    }

    async fn list_subscriptions(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<PushSubscription>, CoreError> {
        let subscriptions = sqlx::query_as(
            "SELECT * FROM push_subscriptions WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(subscriptions)
    }

    async fn unregister_endpoint(
        &self,
        user_id: Uuid,
        endpoint: &str,
    ) -> Result<bool, CoreError> {
        let result =
            sqlx::query("DELETE FROM push_subscriptions WHERE endpoint = $1 AND user_id = $2")
                .bind(endpoint)
                .bind(user_id)
                .execute(self.pool())
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_subscription(&self, user_id: Uuid, id: Uuid) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM push_subscriptions WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("Push subscription {id}")));
        }
        Ok(())
    }

    async fn remove_subscription(&self, id: Uuid) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM push_subscriptions WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn touch_subscription(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), CoreError> {
        sqlx::query("UPDATE push_subscriptions SET last_used_at = $1 WHERE id = $2")
            .bind(now)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
