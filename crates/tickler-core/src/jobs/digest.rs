use chrono::{DateTime, Timelike, Utc};

use crate::error::CoreError;
use crate::models::{NewNotificationData, NotificationKind, Priority, Todo, UserPreferences};
use crate::repository::{
    NotificationRepository, OccurrenceRepository, PreferencesRepository, Repository,
    TodoRepository,
};
use crate::timezone;

/// Bullet lines shown per group (regular and recurring) before truncation.
const MAX_LISTED_PER_GROUP: usize = 5;

/// Emits the once-per-local-day digest notification for every opted-in user
/// whose local hour matches their configured digest hour.
pub struct DigestDispatcher;

impl DigestDispatcher {
    /// One hourly tick. Invalid timezones and per-user failures are logged
    /// and skipped without affecting other users. Returns the number of
    /// digests written.
    pub async fn run_once<R>(&self, repo: &R, now: DateTime<Utc>) -> Result<usize, CoreError>
    where
        R: Repository + ?Sized,
    {
        let candidates = repo.digest_candidates().await?;

        let mut sent = 0;
        for prefs in candidates {
            match self.process_user(repo, &prefs, now).await {
                Ok(true) => sent += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(user_id = %prefs.user_id, error = %e, "daily digest failed");
                }
            }
        }

        if sent > 0 {
            tracing::info!(sent, "sent daily digests");
        }
        Ok(sent)
    }

    async fn process_user<R>(
        &self,
        repo: &R,
        prefs: &UserPreferences,
        now: DateTime<Utc>,
    ) -> Result<bool, CoreError>
    where
        R: Repository + ?Sized,
    {
        let Some(digest_time) = prefs.digest_time else {
            return Ok(false);
        };

        let tz = match timezone::validate_timezone(&prefs.timezone) {
            Ok(tz) => tz,
            Err(_) => {
                tracing::warn!(
                    user_id = %prefs.user_id,
                    timezone = %prefs.timezone,
                    "invalid timezone; skipping digest"
                );
                return Ok(false);
            }
        };

        // The job runs hourly, so hour equality is the whole schedule check.
        if timezone::local_hour(&tz, now) != digest_time.hour() {
            return Ok(false);
        }

        // At most one digest per local day.
        let day_start = timezone::local_day_start_utc(&tz, now);
        if repo.digest_sent_since(prefs.user_id, day_start).await? {
            return Ok(false);
        }

        let today = timezone::local_date(&tz, now);
        let due_todos = repo.todos_due_on(prefs.user_id, today).await?;
        let occurrences = repo.pending_occurrences_on(prefs.user_id, today).await?;

        let mut recurring_titles = Vec::with_capacity(occurrences.len());
        for occurrence in &occurrences {
            if let Some(parent) = repo.todo_by_id(occurrence.parent_todo_id).await? {
                recurring_titles.push(parent.title);
            }
        }

        let (title, body) = compose_digest(&due_todos, &recurring_titles);

        repo.create_notification(NewNotificationData {
            user_id: prefs.user_id,
            kind: NotificationKind::DailyDigest,
            title,
            body: Some(body),
            todo_id: None,
            reminder_id: None,
        })
        .await?;

        // In-app only; this job does not push.
        Ok(true)
    }
}

fn priority_marker(priority: Priority) -> &'static str {
    match priority {
        Priority::High => "🔴",
        Priority::Medium => "🟡",
        Priority::Low => "🟢",
    }
}

fn compose_digest(due_todos: &[Todo], recurring_titles: &[String]) -> (String, String) {
    let total = due_todos.len() + recurring_titles.len();

    if total == 0 {
        return (
            "Daily Digest: No tasks due today".to_string(),
            "You have no tasks due today. Enjoy your day!".to_string(),
        );
    }

    let title = format!(
        "Daily Digest: {} task{} due today",
        total,
        if total == 1 { "" } else { "s" }
    );

    let mut lines: Vec<String> = Vec::new();
    for todo in due_todos.iter().take(MAX_LISTED_PER_GROUP) {
        match todo.priority {
            Some(priority) => {
                lines.push(format!("• {} {}", todo.title, priority_marker(priority)))
            }
            None => lines.push(format!("• {}", todo.title)),
        }
    }
    for name in recurring_titles.iter().take(MAX_LISTED_PER_GROUP) {
        lines.push(format!("• {name} (recurring)"));
    }

    let remaining = total - lines.len();
    if remaining > 0 {
        lines.push(format!("...and {remaining} more"));
    }

    (title, lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn todo_titled(title: &str, priority: Option<Priority>) -> Todo {
        Todo {
            id: Uuid::now_v7(),
            title: title.to_string(),
            description: None,
            completed: false,
            user_id: Uuid::now_v7(),
            due_date: None,
            priority,
            is_recurring: false,
            rrule: None,
            recurrence_end_date: None,
            recurrence_count: None,
            occurrences_generated: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_compose_empty_day() {
        let (title, body) = compose_digest(&[], &[]);
        assert_eq!(title, "Daily Digest: No tasks due today");
        assert_eq!(body, "You have no tasks due today. Enjoy your day!");
    }

    #[test]
    fn test_compose_single_task() {
        let todos = vec![todo_titled("Water plants", Some(Priority::High))];
        let (title, body) = compose_digest(&todos, &[]);
        assert_eq!(title, "Daily Digest: 1 task due today");
        assert_eq!(body, "• Water plants 🔴");
    }

    #[test]
    fn test_compose_mixed_groups() {
        let todos = vec![
            todo_titled("Pay rent", None),
            todo_titled("Call dentist", Some(Priority::Low)),
        ];
        let recurring = vec!["Morning run".to_string()];
        let (title, body) = compose_digest(&todos, &recurring);
        assert_eq!(title, "Daily Digest: 3 tasks due today");
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "• Pay rent");
        assert_eq!(lines[1], "• Call dentist 🟢");
        assert_eq!(lines[2], "• Morning run (recurring)");
    }

    #[test]
    fn test_compose_truncates_with_more_line() {
        let todos: Vec<Todo> = (0..8)
            .map(|i| todo_titled(&format!("Task {i}"), None))
            .collect();
        let recurring: Vec<String> = (0..7).map(|i| format!("Habit {i}")).collect();

        let (title, body) = compose_digest(&todos, &recurring);
        assert_eq!(title, "Daily Digest: 15 tasks due today");

        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 11);
        assert_eq!(lines[10], "...and 5 more");
        assert!(lines[9].ends_with("(recurring)"));
    }
}
