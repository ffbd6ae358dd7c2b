use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A medical visit. `id == 0` means not yet persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consultation {
    pub id: i64,
    pub doctor_name: String,
    pub diagnosis: String,
    pub date: DateTime<Utc>,
    pub notes: String,
}
