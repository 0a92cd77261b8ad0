use crate::error::CoreError;
use crate::models::{UpdatePreferencesData, UserPreferences};
use crate::repository::{PreferencesRepository, SqliteRepository};
use crate::timezone;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

#[async_trait]
impl super::PreferencesRepository for SqliteRepository {
    async fn get_preferences(&self, user_id: Uuid) -> Result<UserPreferences, CoreError> {
        let existing: Option<UserPreferences> =
            sqlx::query_as("SELECT * FROM user_preferences WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(self.pool())
                .await?;
        if let Some(prefs) = existing {
            return Ok(prefs);
        }

        // First access creates the default row; OR IGNORE absorbs a racing
        // insert for the same user.
        let now = Utc::now();
        sqlx::query(
            r#"INSERT OR IGNORE INTO user_preferences
            (id, user_id, timezone, default_reminder_offset, push_enabled, digest_enabled, digest_time, created_at, updated_at)
            VALUES ($1, $2, 'UTC', NULL, TRUE, FALSE, NULL, $3, $4)"#,
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        let prefs = sqlx::query_as("SELECT * FROM user_preferences WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(self.pool())
            .await?;
        Ok(prefs)
    }

    async fn update_preferences(
        &self,
        user_id: Uuid,
        data: UpdatePreferencesData,
    ) -> Result<UserPreferences, CoreError> {
        let current = self.get_preferences(user_id).await?;

        let tz = match data.timezone {
            Some(tz) => {
                timezone::validate_timezone(&tz)?;
                tz
            }
            None => current.timezone,
        };
        let default_reminder_offset = match data.default_reminder_offset {
            Some(offset) => {
                if let Some(minutes) = offset {
                    if minutes >= 0 {
                        return Err(CoreError::InvalidInput(
                            "default_reminder_offset must be a negative number of minutes"
                                .to_string(),
                        ));
                    }
                }
                offset
            }
            None => current.default_reminder_offset,
        };
        let push_enabled = data.push_enabled.unwrap_or(current.push_enabled);
        let digest_enabled = data.digest_enabled.unwrap_or(current.digest_enabled);
        let digest_time = match data.digest_time {
            Some(time) => time,
            None => current.digest_time,
        };

        let updated: UserPreferences = sqlx::query_as(
            r#"UPDATE user_preferences
            SET timezone = $1, default_reminder_offset = $2, push_enabled = $3,
                digest_enabled = $4, digest_time = $5, updated_at = $6
            WHERE user_id = $7
            RETURNING *"#,
        )
        .bind(&tz)
        .bind(default_reminder_offset)
        .bind(push_enabled)
        .bind(digest_enabled)
        .bind(digest_time)
        .bind(Utc::now())
        .bind(user_id)
        .fetch_one(self.pool())
        .await?;

        Ok(updated)
    }

    async fn digest_candidates(&self) -> Result<Vec<UserPreferences>, CoreError> {
        let candidates = sqlx::query_as(
            r#"SELECT * FROM user_preferences
            WHERE digest_enabled = TRUE AND digest_time IS NOT NULL"#,
        )
        .fetch_all(self.pool())
        .await?;
        Ok(candidates)
    }
}
