use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::recurrence::RecurrenceConfig;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid priority: {0}")]
pub struct ParsePriorityError(String);

impl FromStr for Priority {
    type Err = ParsePriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            _ => Err(ParsePriorityError(s.to_string())),
        }
    }
}

/// Status of a single occurrence in a recurring series.
///
/// `completed` and `skipped` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OccurrenceStatus {
    Pending,
    Completed,
    Skipped,
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid occurrence status: {0}")]
pub struct ParseOccurrenceStatusError(String);

impl FromStr for OccurrenceStatus {
    type Err = ParseOccurrenceStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(OccurrenceStatus::Pending),
            "completed" => Ok(OccurrenceStatus::Completed),
            "skipped" => Ok(OccurrenceStatus::Skipped),
            _ => Err(ParseOccurrenceStatusError(s.to_string())),
        }
    }
}

/// Status of a reminder.
///
/// Transitions: `pending -> sent | snoozed | cancelled`; a snoozed reminder
/// becomes eligible again once its updated fire time arrives. `sent` and
/// `cancelled` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReminderStatus {
    Pending,
    Sent,
    Snoozed,
    Cancelled,
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid reminder status: {0}")]
pub struct ParseReminderStatusError(String);

impl FromStr for ReminderStatus {
    type Err = ParseReminderStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ReminderStatus::Pending),
            "sent" => Ok(ReminderStatus::Sent),
            "snoozed" => Ok(ReminderStatus::Snoozed),
            "cancelled" => Ok(ReminderStatus::Cancelled),
            _ => Err(ParseReminderStatusError(s.to_string())),
        }
    }
}

/// Kind of an in-app notification.
///
/// `recurring_due` is declared for forward compatibility; no job currently
/// produces it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Reminder,
    DailyDigest,
    RecurringDue,
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid notification kind: {0}")]
pub struct ParseNotificationKindError(String);

impl FromStr for NotificationKind {
    type Err = ParseNotificationKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reminder" => Ok(NotificationKind::Reminder),
            "daily_digest" => Ok(NotificationKind::DailyDigest),
            "recurring_due" => Ok(NotificationKind::RecurringDue),
            _ => Err(ParseNotificationKindError(s.to_string())),
        }
    }
}

/// Scope for edit operations on recurring todos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditScope {
    /// Split the current occurrence out of the series as a standalone todo
    ThisOnly,
    /// Update the series head; future occurrences inherit by lookup
    AllFuture,
}

impl std::fmt::Display for EditScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EditScope::ThisOnly => write!(f, "this_only"),
            EditScope::AllFuture => write!(f, "all_future"),
        }
    }
}

impl FromStr for EditScope {
    type Err = ParseEditScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "this_only" | "this" => Ok(EditScope::ThisOnly),
            "all_future" | "future" | "all" => Ok(EditScope::AllFuture),
            _ => Err(ParseEditScopeError(s.to_string())),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid edit scope: {0}")]
pub struct ParseEditScopeError(String);

/// A user's todo. Recurring todos act as the series head: the RRULE lives
/// here and materialized occurrences reference it as their parent.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Todo {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub user_id: Uuid,
    /// Deadline as a calendar date; anchors the series when recurring
    pub due_date: Option<NaiveDate>,
    pub priority: Option<Priority>,
    pub is_recurring: bool,
    /// RFC 5545 RRULE string (e.g. FREQ=WEEKLY;BYDAY=MO,WE,FR)
    pub rrule: Option<String>,
    pub recurrence_end_date: Option<NaiveDate>,
    pub recurrence_count: Option<i64>,
    /// Count of occurrences created so far across all top-ups
    pub occurrences_generated: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single materialized instance of a recurring todo with its own
/// completion state.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Occurrence {
    pub id: Uuid,
    pub parent_todo_id: Uuid,
    /// Owner, denormalized for query efficiency
    pub user_id: Uuid,
    pub occurrence_date: NaiveDate,
    pub status: OccurrenceStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A reminder scheduled against a todo, either at an absolute instant or at
/// an offset relative to the todo's due date.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Reminder {
    pub id: Uuid,
    pub todo_id: Uuid,
    pub occurrence_id: Option<Uuid>,
    pub user_id: Uuid,
    /// UTC instant at which the reminder becomes due
    pub fire_at: DateTime<Utc>,
    /// Minutes relative to the due date (negative = before)
    pub offset_minutes: Option<i64>,
    pub status: ReminderStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub snoozed_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// An entry in the in-app notification center.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: Option<String>,
    pub todo_id: Option<Uuid>,
    pub reminder_id: Option<Uuid>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// A browser push subscription: an endpoint plus the keys needed to encrypt
/// payloads for it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PushSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub endpoint: String,
    pub p256dh_key: String,
    pub auth_key: String,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Per-user settings for timezone, reminders, digest, and push.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserPreferences {
    pub id: Uuid,
    pub user_id: Uuid,
    /// IANA timezone name (e.g. "America/New_York")
    pub timezone: String,
    /// Default minutes-before-due for auto-created reminders (negative)
    pub default_reminder_offset: Option<i64>,
    pub push_enabled: bool,
    pub digest_enabled: bool,
    /// Local time of day at which the daily digest is delivered
    pub digest_time: Option<NaiveTime>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user-scoped label attached to todos.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tag {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Data Transfer Objects (DTOs)
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct NewTodoData {
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub priority: Option<Priority>,
    pub tag_ids: Vec<Uuid>,
    /// When present, the todo becomes a recurring series head; a due date is
    /// required as the series anchor
    pub recurrence: Option<RecurrenceConfig>,
}

/// Partial update for a todo. The double-`Option` fields distinguish
/// "leave unchanged" (outer `None`) from "clear" (`Some(None)`).
#[derive(Debug, Clone, Default)]
pub struct UpdateTodoData {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub completed: Option<bool>,
    pub due_date: Option<Option<NaiveDate>>,
    pub priority: Option<Option<Priority>>,
    /// When provided, replaces the todo's entire tag set
    pub tag_ids: Option<Vec<Uuid>>,
}

/// Input for creating a reminder. Exactly one of `fire_at` and
/// `offset_minutes` must be set; an offset requires the todo to have a due
/// date at creation time.
#[derive(Debug, Clone, Default)]
pub struct NewReminderData {
    pub fire_at: Option<DateTime<Utc>>,
    pub offset_minutes: Option<i64>,
    pub occurrence_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct NewNotificationData {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: Option<String>,
    pub todo_id: Option<Uuid>,
    pub reminder_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct NewSubscriptionData {
    pub endpoint: String,
    pub p256dh_key: String,
    pub auth_key: String,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdatePreferencesData {
    pub timezone: Option<String>,
    pub default_reminder_offset: Option<Option<i64>>,
    pub push_enabled: Option<bool>,
    pub digest_enabled: Option<bool>,
    pub digest_time: Option<Option<NaiveTime>>,
}

/// One page of a user's notification listing, with the counts the
/// notification center renders alongside it.
#[derive(Debug, Clone)]
pub struct NotificationPage {
    pub items: Vec<Notification>,
    pub total: i64,
    pub unread: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_scope_parsing() {
        assert_eq!("this_only".parse::<EditScope>(), Ok(EditScope::ThisOnly));
        assert_eq!("this".parse::<EditScope>(), Ok(EditScope::ThisOnly));
        assert_eq!("all_future".parse::<EditScope>(), Ok(EditScope::AllFuture));
        assert_eq!("future".parse::<EditScope>(), Ok(EditScope::AllFuture));
        assert!("sometimes".parse::<EditScope>().is_err());
    }

    #[test]
    fn test_status_parsing_roundtrip() {
        assert_eq!("pending".parse::<ReminderStatus>(), Ok(ReminderStatus::Pending));
        assert_eq!("SENT".parse::<ReminderStatus>(), Ok(ReminderStatus::Sent));
        assert_eq!("snoozed".parse::<ReminderStatus>(), Ok(ReminderStatus::Snoozed));
        assert_eq!("skipped".parse::<OccurrenceStatus>(), Ok(OccurrenceStatus::Skipped));
        assert_eq!(
            "daily_digest".parse::<NotificationKind>(),
            Ok(NotificationKind::DailyDigest)
        );
        assert!("nope".parse::<NotificationKind>().is_err());
    }
}
