//! Medication reminders: one pending wake-up per medication, and the alert
//! shown when it fires.
//!
//! The host OS capabilities (timed callbacks, user alerts) sit behind the
//! `AlarmHost` and `AlertDisplay` traits. `TokioAlarmHost` and `AlertTray`
//! are the in-process implementations.

pub mod dispatcher;
pub mod host;
pub mod scheduler;

pub use dispatcher::*;
pub use host::*;
pub use scheduler::*;
