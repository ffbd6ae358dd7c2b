//! Form state controllers for the consultation and medication screens.
//!
//! Each controller owns one draft, published to the UI through a
//! `tokio::sync::watch` channel. `save()` validates, writes through the
//! repository, arms or disarms reminders, then flips `is_saved`.

pub mod consultation;
pub mod medication;

pub use consultation::*;
pub use medication::*;

use thiserror::Error;

use crate::db::DatabaseError;

pub const CONSULTATION_REQUIRED: &str = "Doctor name and diagnosis are required";
pub const MEDICATION_REQUIRED: &str = "Please fill in all required fields";
pub const SCHEDULE_NOT_POSITIVE: &str = "Frequency and duration must be greater than zero";

#[derive(Error, Debug)]
pub enum FormError {
    /// Shown to the user as-is.
    #[error("{0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Digits only. The empty string is accepted so a field can be cleared.
pub fn is_numeric_input(input: &str) -> bool {
    input.chars().all(|c| c.is_ascii_digit())
}
