//! # Tickler Core Library
//!
//! The engine behind the Tickler todo backend: recurring series with RFC 5545
//! rules, time-based reminders, an in-app notification center, and Web Push
//! delivery, driven by a single-process periodic scheduler.
//!
//! ## Features
//!
//! - **Recurring series**: todos carry an RRULE; future occurrences are
//!   materialized into a rolling window and topped up as they are consumed
//! - **Reminders**: absolute fire times or offsets from a due date, with
//!   snooze, and an at-most-once firing discipline
//! - **Notification center**: durable in-app notifications with read state,
//!   a daily digest, and 30-day retention
//! - **Web Push**: VAPID-signed encrypted payloads fanned out per browser
//!   subscription, best-effort, with automatic pruning of dead endpoints
//! - **Series edit semantics**: this-only edits split a single occurrence
//!   out of the series; all-future edits patch the series head
//!
//! ## Core Modules
//!
//! - [`db`]: Database connection and migration management
//! - [`models`]: Entities, status machines, and transfer objects
//! - [`recurrence`]: Pure RRULE formatting and occurrence enumeration
//! - [`repository`]: Data access layer with the Repository pattern
//! - [`push`]: Push payloads, the transport seam, and the web-push client
//! - [`jobs`]: The reminder dispatcher, daily digest, and retention sweep
//! - [`scheduler`]: Process-wide periodic job host
//! - [`timezone`]: IANA timezone utilities
//! - [`error`]: Error types and API error-code mapping
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tickler_core::{
//!     db,
//!     push::WebPushTransport,
//!     repository::SqliteRepository,
//!     scheduler::Scheduler,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = db::establish_connection("tickler.db").await?;
//!     let repo = Arc::new(SqliteRepository::with_defaults(pool));
//!     let transport = Arc::new(WebPushTransport::new(None));
//!
//!     let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!     let scheduler = Scheduler::new(repo, transport);
//!     tokio::spawn(scheduler.run(shutdown_rx));
//!
//!     tokio::signal::ctrl_c().await?;
//!     let _ = shutdown_tx.send(true);
//!     Ok(())
//! }
//! ```

pub mod db;
pub mod error;
pub mod jobs;
pub mod models;
pub mod push;
pub mod recurrence;
pub mod repository;
pub mod scheduler;
pub mod timezone;
