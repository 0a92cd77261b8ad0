use crate::db::DbPool;
use crate::error::CoreError;
use crate::models::{
    EditScope, NewNotificationData, NewReminderData, NewSubscriptionData, NewTodoData,
    Notification, NotificationPage, Occurrence, OccurrenceStatus, PushSubscription, Reminder,
    Tag, Todo, UpdatePreferencesData, UpdateTodoData, UserPreferences,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

// Re-export domain modules
pub mod maintenance;
pub mod notifications;
pub mod occurrences;
pub mod preferences;
pub mod reminders;
pub mod subscriptions;
pub mod tags;
pub mod todos;

pub use maintenance::MaintenanceConfig;

/// Domain-specific trait for todo operations, including the series-edit
/// semantics for recurring todos.
#[async_trait]
pub trait TodoRepository {
    /// Creates a todo; a recurrence config seeds the first occurrence window
    /// and a due date auto-creates the user's default reminder when one is
    /// configured and still in the future.
    async fn create_todo(&self, user_id: Uuid, data: NewTodoData) -> Result<Todo, CoreError>;
    async fn find_todo(&self, user_id: Uuid, id: Uuid) -> Result<Option<Todo>, CoreError>;
    /// Unscoped lookup for background jobs; API paths must use [`Self::find_todo`].
    async fn todo_by_id(&self, id: Uuid) -> Result<Option<Todo>, CoreError>;
    async fn list_todos(&self, user_id: Uuid) -> Result<Vec<Todo>, CoreError>;
    /// Applies a patch. `ThisOnly` on a recurring todo splits the current
    /// occurrence into a new non-recurring todo and returns it.
    async fn update_todo(
        &self,
        user_id: Uuid,
        id: Uuid,
        data: UpdateTodoData,
        scope: Option<EditScope>,
    ) -> Result<Todo, CoreError>;
    /// Ends a series: clears the rule, stamps the end date, and unless
    /// `keep_pending` deletes pending future occurrences. Idempotent.
    async fn stop_recurring(
        &self,
        user_id: Uuid,
        id: Uuid,
        keep_pending: bool,
    ) -> Result<Todo, CoreError>;
    async fn delete_todo(&self, user_id: Uuid, id: Uuid) -> Result<(), CoreError>;
    /// All active series heads (recurring with a rule), for the daily top-up.
    async fn list_recurring_todos(&self) -> Result<Vec<Todo>, CoreError>;
    /// Non-recurring, not-completed todos due on the given date (digest).
    async fn todos_due_on(&self, user_id: Uuid, date: NaiveDate) -> Result<Vec<Todo>, CoreError>;
}

/// Domain-specific trait for occurrence operations.
#[async_trait]
pub trait OccurrenceRepository {
    async fn find_occurrence(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Occurrence>, CoreError>;
    async fn list_occurrences(
        &self,
        user_id: Uuid,
        todo_id: Uuid,
        status: Option<OccurrenceStatus>,
    ) -> Result<Vec<Occurrence>, CoreError>;
    /// Today's occurrence if materialized, else the next strictly-future
    /// pending one. Past pending occurrences are never returned.
    async fn current_occurrence(
        &self,
        user_id: Uuid,
        todo_id: Uuid,
    ) -> Result<Option<Occurrence>, CoreError>;
    /// Marks the occurrence completed and tops the series back up when too
    /// few pending future occurrences remain.
    async fn complete_occurrence(&self, user_id: Uuid, id: Uuid) -> Result<Occurrence, CoreError>;
    /// Marks the occurrence skipped; same top-up behavior as completion.
    async fn skip_occurrence(&self, user_id: Uuid, id: Uuid) -> Result<Occurrence, CoreError>;
    /// Pending occurrences on a given date across all of a user's series.
    async fn pending_occurrences_on(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Occurrence>, CoreError>;
}

/// Domain-specific trait for reminder operations.
#[async_trait]
pub trait ReminderRepository {
    async fn create_reminder(
        &self,
        user_id: Uuid,
        todo_id: Uuid,
        data: NewReminderData,
    ) -> Result<Reminder, CoreError>;
    async fn list_reminders(
        &self,
        user_id: Uuid,
        todo_id: Uuid,
        include_fired: bool,
    ) -> Result<Vec<Reminder>, CoreError>;
    async fn delete_reminder(&self, user_id: Uuid, id: Uuid) -> Result<(), CoreError>;
    /// Reschedules the reminder `minutes` into the future; the dispatcher's
    /// due query picks it up again when the new fire time arrives.
    async fn snooze_reminder(
        &self,
        user_id: Uuid,
        id: Uuid,
        minutes: i64,
        now: DateTime<Utc>,
    ) -> Result<Reminder, CoreError>;
    /// Reminders eligible to fire: `fire_at <= now`, status pending or
    /// snoozed, ascending by fire time, bounded by `limit`.
    async fn due_reminders(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Reminder>, CoreError>;
    /// Transitions to `sent` iff the reminder is still active; returns
    /// whether the transition happened.
    async fn mark_reminder_sent(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, CoreError>;
    /// Transitions to `cancelled` iff the reminder is still active.
    async fn cancel_reminder(&self, id: Uuid) -> Result<bool, CoreError>;
}

/// Domain-specific trait for the in-app notification center.
#[async_trait]
pub trait NotificationRepository {
    async fn create_notification(
        &self,
        data: NewNotificationData,
    ) -> Result<Notification, CoreError>;
    async fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<NotificationPage, CoreError>;
    async fn unread_count(&self, user_id: Uuid) -> Result<i64, CoreError>;
    async fn set_notification_read(
        &self,
        user_id: Uuid,
        id: Uuid,
        read: bool,
    ) -> Result<Notification, CoreError>;
    async fn mark_notifications_read(
        &self,
        user_id: Uuid,
        ids: &[Uuid],
    ) -> Result<u64, CoreError>;
    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, CoreError>;
    async fn delete_notification(&self, user_id: Uuid, id: Uuid) -> Result<(), CoreError>;
    /// Whether a daily digest notification exists at or after `since`.
    async fn digest_sent_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<bool, CoreError>;
    /// Retention sweep; returns the number of rows removed.
    async fn delete_notifications_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, CoreError>;
}

/// Domain-specific trait for the push subscription registry.
#[async_trait]
pub trait PushSubscriptionRepository {
    /// Upserts by endpoint; an existing endpoint is rebound to `user_id`
    /// (device handoff).
    async fn register_subscription(
        &self,
        user_id: Uuid,
        data: NewSubscriptionData,
    ) -> Result<PushSubscription, CoreError>;
    async fn list_subscriptions(&self, user_id: Uuid)
        -> Result<Vec<PushSubscription>, CoreError>;
    /// Removes a subscription by endpoint for the given user; returns
    /// whether a row was removed.
    async fn unregister_endpoint(&self, user_id: Uuid, endpoint: &str)
        -> Result<bool, CoreError>;
    async fn delete_subscription(&self, user_id: Uuid, id: Uuid) -> Result<(), CoreError>;
    /// Unconditional removal, used when the push service reports the
    /// subscription gone.
    async fn remove_subscription(&self, id: Uuid) -> Result<(), CoreError>;
    async fn touch_subscription(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), CoreError>;
}

/// Domain-specific trait for user preferences.
#[async_trait]
pub trait PreferencesRepository {
    /// Fetches the user's preferences, creating the default row on first
    /// access.
    async fn get_preferences(&self, user_id: Uuid) -> Result<UserPreferences, CoreError>;
    async fn update_preferences(
        &self,
        user_id: Uuid,
        data: UpdatePreferencesData,
    ) -> Result<UserPreferences, CoreError>;
    /// Preference rows with the digest enabled and a digest time set.
    async fn digest_candidates(&self) -> Result<Vec<UserPreferences>, CoreError>;
}

/// Domain-specific trait for tags as far as the edit semantics need them.
#[async_trait]
pub trait TagRepository {
    async fn create_tag(
        &self,
        user_id: Uuid,
        name: &str,
        color: Option<String>,
    ) -> Result<Tag, CoreError>;
    async fn list_tags(&self, user_id: Uuid) -> Result<Vec<Tag>, CoreError>;
    async fn tags_for_todo(&self, todo_id: Uuid) -> Result<Vec<Tag>, CoreError>;
}

/// Domain-specific trait for occurrence-window maintenance.
#[async_trait]
pub trait MaintenanceRepository {
    /// Materializes up to `max` missing occurrences for one series starting
    /// at `from_date`. Idempotent; returns the number inserted.
    async fn top_up_series(
        &self,
        todo_id: Uuid,
        from_date: NaiveDate,
        max: usize,
    ) -> Result<usize, CoreError>;
    /// Daily refresh across every active series.
    async fn top_up_all(&self, today: NaiveDate) -> Result<usize, CoreError>;
}

/// Main repository trait that composes all domain traits.
#[async_trait]
pub trait Repository:
    TodoRepository
    + OccurrenceRepository
    + ReminderRepository
    + NotificationRepository
    + PushSubscriptionRepository
    + PreferencesRepository
    + TagRepository
    + MaintenanceRepository
    + Send
    + Sync
{
}

/// SQLite implementation of the repository pattern.
pub struct SqliteRepository {
    pool: DbPool,
    maintenance: MaintenanceConfig,
}

impl SqliteRepository {
    pub fn new(pool: DbPool, maintenance: MaintenanceConfig) -> Self {
        Self { pool, maintenance }
    }

    pub fn with_defaults(pool: DbPool) -> Self {
        Self::new(pool, MaintenanceConfig::default())
    }

    /// Get a reference to the database pool for internal use across modules
    pub(crate) fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Get a reference to the maintenance configuration for internal use
    pub(crate) fn maintenance(&self) -> &MaintenanceConfig {
        &self.maintenance
    }
}

// The main Repository trait implementation is available once all domain
// trait implementations are defined in their modules.
impl Repository for SqliteRepository {}
