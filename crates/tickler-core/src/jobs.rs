//! Background jobs driven by the scheduler host: the reminder dispatcher,
//! the daily digest, and the notification retention sweep.
//!
//! Jobs never propagate errors past their own boundary when run by the
//! scheduler; a failing item is logged and the batch continues.

pub mod digest;
pub mod dispatcher;
pub mod retention;

pub use digest::DigestDispatcher;
pub use dispatcher::ReminderDispatcher;
pub use retention::RetentionSweeper;
