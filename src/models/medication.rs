use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A prescribed drug with its dosing schedule.
///
/// `consultation_id` is optional: medications may be recorded on their own,
/// but when present it must reference an existing consultation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medication {
    pub id: i64,
    pub consultation_id: Option<i64>,
    pub name: String,
    pub dose: String,
    pub frequency_hours: u32,
    pub treatment_duration_days: u32,
    pub purpose: String,
    pub additional_notes: String,
    /// First dose.
    pub start_time: DateTime<Utc>,
}
