use chrono::{DateTime, Utc};

use crate::error::CoreError;
use crate::models::{NewNotificationData, NotificationKind, Reminder};
use crate::push::{self, PushPayload, PushTransport};
use crate::repository::{
    NotificationRepository, ReminderRepository, Repository, TodoRepository,
};

/// Fires reminders whose time has arrived: one in-app notification per
/// firing, best-effort push fan-out, and an atomic transition to `sent`.
pub struct ReminderDispatcher {
    /// Upper bound on reminders processed per tick
    pub batch_size: i64,
}

impl Default for ReminderDispatcher {
    fn default() -> Self {
        Self { batch_size: 200 }
    }
}

impl ReminderDispatcher {
    /// One dispatcher tick. Eligible reminders are processed in ascending
    /// fire-time order; a failure on one reminder never halts the batch.
    /// Returns the number fired.
    pub async fn run_once<R>(
        &self,
        repo: &R,
        transport: &dyn PushTransport,
        now: DateTime<Utc>,
    ) -> Result<usize, CoreError>
    where
        R: Repository + ?Sized,
    {
        let due = repo.due_reminders(now, self.batch_size).await?;
        if due.is_empty() {
            return Ok(0);
        }

        let mut fired = 0;
        for reminder in due {
            match self.fire(repo, transport, &reminder, now).await {
                Ok(true) => fired += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(reminder_id = %reminder.id, error = %e, "failed to fire reminder");
                }
            }
        }

        if fired > 0 {
            tracing::info!(fired, "dispatched reminders");
        }
        Ok(fired)
    }

    /// Firing protocol for a single reminder. The in-app notification is the
    /// durable outcome; push is additive and may fail silently. The final
    /// `sent` transition is guarded by status, so a reminder is never fired
    /// twice.
    async fn fire<R>(
        &self,
        repo: &R,
        transport: &dyn PushTransport,
        reminder: &Reminder,
        now: DateTime<Utc>,
    ) -> Result<bool, CoreError>
    where
        R: Repository + ?Sized,
    {
        let Some(todo) = repo.todo_by_id(reminder.todo_id).await? else {
            // The todo vanished out from under the reminder.
            repo.cancel_reminder(reminder.id).await?;
            tracing::debug!(reminder_id = %reminder.id, "cancelled reminder for missing todo");
            return Ok(false);
        };

        let title = format!("Reminder: {}", todo.title);
        let body = match todo.due_date {
            Some(due) => format!("Due: {}", due.format("%b %d, %Y")),
            None => "Task reminder".to_string(),
        };

        repo.create_notification(NewNotificationData {
            user_id: reminder.user_id,
            kind: NotificationKind::Reminder,
            title: title.clone(),
            body: Some(body.clone()),
            todo_id: Some(todo.id),
            reminder_id: Some(reminder.id),
        })
        .await?;

        let payload = PushPayload {
            title,
            body,
            url: Some(format!("/todos/{}", todo.id)),
            tag: Some(format!("reminder-{}", reminder.id)),
        };
        if let Err(e) =
            push::fan_out(repo, transport, reminder.user_id, &payload, now).await
        {
            tracing::warn!(reminder_id = %reminder.id, error = %e, "push fan-out failed");
        }

        let transitioned = repo.mark_reminder_sent(reminder.id, now).await?;
        Ok(transitioned)
    }
}
