use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One dose-taken event for a medication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationHistory {
    pub id: i64,
    pub medication_id: i64,
    pub timestamp: DateTime<Utc>,
    pub notes: String,
}
