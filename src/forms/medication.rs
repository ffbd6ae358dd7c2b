use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use super::{is_numeric_input, FormError, MEDICATION_REQUIRED, SCHEDULE_NOT_POSITIVE};
use crate::models::{now_millis, Medication, MedicationHistory};
use crate::reminder::{ReminderScheduler, ScheduleOutcome};
use crate::repository::Repository;
use crate::store::LiveQuery;

/// Draft for the medication screen. Frequency and duration stay as typed
/// text until save.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MedicationUiState {
    pub id: i64,
    pub consultation_id: Option<i64>,
    pub name: String,
    pub dose: String,
    pub frequency: String,
    pub duration: String,
    pub purpose: String,
    pub notes: String,
    pub start_time: DateTime<Utc>,
    pub is_editing: bool,
    pub is_saved: bool,
    pub error_message: Option<String>,
}

impl Default for MedicationUiState {
    fn default() -> Self {
        Self {
            id: 0,
            consultation_id: None,
            name: String::new(),
            dose: String::new(),
            frequency: String::new(),
            duration: String::new(),
            purpose: String::new(),
            notes: String::new(),
            start_time: now_millis(),
            is_editing: false,
            is_saved: false,
            error_message: None,
        }
    }
}

impl MedicationUiState {
    fn has_blank_required_field(&self) -> bool {
        [&self.name, &self.dose, &self.frequency, &self.duration]
            .iter()
            .any(|field| field.trim().is_empty())
    }

    /// Parsed (frequency, duration), both strictly positive.
    fn schedule(&self) -> Option<(u32, u32)> {
        let frequency = self.frequency.parse::<u32>().ok().filter(|v| *v > 0)?;
        let duration = self.duration.parse::<u32>().ok().filter(|v| *v > 0)?;
        Some((frequency, duration))
    }
}

/// Drives the "new / edit medication" screen and keeps reminders in step
/// with what is persisted.
pub struct MedicationForm {
    repo: Repository,
    scheduler: ReminderScheduler,
    state: watch::Sender<MedicationUiState>,
}

impl MedicationForm {
    pub fn new(repo: Repository, scheduler: ReminderScheduler) -> Self {
        let (state, _) = watch::channel(MedicationUiState::default());
        Self {
            repo,
            scheduler,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<MedicationUiState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> MedicationUiState {
        self.state.borrow().clone()
    }

    pub fn all_medications(&self) -> LiveQuery<Medication> {
        self.repo.all_medications()
    }

    pub fn medications_for_consultation(&self, consultation_id: i64) -> LiveQuery<Medication> {
        self.repo.medications_for_consultation(consultation_id)
    }

    pub fn history(&self, medication_id: i64) -> LiveQuery<MedicationHistory> {
        self.repo.medication_history(medication_id)
    }

    // ── Field setters ───────────────────────────────────────

    pub fn set_name(&self, value: impl Into<String>) {
        let value = value.into();
        self.state.send_modify(|s| s.name = value);
    }

    pub fn set_dose(&self, value: impl Into<String>) {
        let value = value.into();
        self.state.send_modify(|s| s.dose = value);
    }

    /// Accepts digits only; anything else leaves the field unchanged.
    /// Returns whether the input was taken.
    pub fn set_frequency(&self, value: &str) -> bool {
        if !is_numeric_input(value) {
            return false;
        }
        let value = value.to_string();
        self.state.send_modify(|s| s.frequency = value);
        true
    }

    /// Accepts digits only; anything else leaves the field unchanged.
    pub fn set_duration(&self, value: &str) -> bool {
        if !is_numeric_input(value) {
            return false;
        }
        let value = value.to_string();
        self.state.send_modify(|s| s.duration = value);
        true
    }

    pub fn set_purpose(&self, value: impl Into<String>) {
        let value = value.into();
        self.state.send_modify(|s| s.purpose = value);
    }

    pub fn set_notes(&self, value: impl Into<String>) {
        let value = value.into();
        self.state.send_modify(|s| s.notes = value);
    }

    pub fn set_start_time(&self, value: DateTime<Utc>) {
        self.state.send_modify(|s| s.start_time = value);
    }

    // ── Lifecycle ───────────────────────────────────────────

    pub fn reset_state(&self) {
        self.state.send_replace(MedicationUiState::default());
    }

    /// Fresh draft owned by `consultation_id`.
    pub fn reset_state_for_consultation(&self, consultation_id: i64) {
        self.state.send_replace(MedicationUiState {
            consultation_id: Some(consultation_id),
            ..MedicationUiState::default()
        });
    }

    pub fn start_editing(&self, med: &Medication) {
        self.state.send_modify(|s| {
            s.id = med.id;
            s.consultation_id = med.consultation_id;
            s.name = med.name.clone();
            s.dose = med.dose.clone();
            s.frequency = med.frequency_hours.to_string();
            s.duration = med.treatment_duration_days.to_string();
            s.purpose = med.purpose.clone();
            s.notes = med.additional_notes.clone();
            s.start_time = med.start_time;
            s.is_editing = true;
            s.is_saved = false;
        });
    }

    pub fn error_message_shown(&self) {
        self.state.send_modify(|s| s.error_message = None);
    }

    pub fn saved_handled(&self) {
        self.state.send_modify(|s| s.is_saved = false);
    }

    fn reject(&self, message: &str) -> FormError {
        let owned = message.to_string();
        self.state.send_modify(|s| s.error_message = Some(owned));
        FormError::Validation(message.into())
    }

    /// Validate, persist, and arm the reminder. Returns the medication id.
    ///
    /// A reminder that cannot be armed is logged but does not fail the save.
    pub async fn save(&self) -> Result<i64, FormError> {
        let draft = self.state();
        if draft.has_blank_required_field() {
            return Err(self.reject(MEDICATION_REQUIRED));
        }
        let Some((frequency_hours, treatment_duration_days)) = draft.schedule() else {
            return Err(self.reject(SCHEDULE_NOT_POSITIVE));
        };

        let mut record = Medication {
            id: if draft.is_editing { draft.id } else { 0 },
            consultation_id: draft.consultation_id,
            name: draft.name,
            dose: draft.dose,
            frequency_hours,
            treatment_duration_days,
            purpose: draft.purpose,
            additional_notes: draft.notes,
            start_time: draft.start_time,
        };

        let result = if draft.is_editing {
            self.repo
                .update_medication(record.clone())
                .await
                .map(|found| (record.id, found))
        } else {
            self.repo
                .insert_medication(record.clone())
                .await
                .map(|id| (id, true))
        };

        match result {
            Ok((id, found)) => {
                record.id = id;
                if found {
                    if let ScheduleOutcome::Failed = self.scheduler.schedule(&record) {
                        // Drop any reminder left from before the edit.
                        self.scheduler.cancel(id);
                        tracing::warn!(medication_id = id, "Medication saved without a reminder");
                    }
                } else {
                    tracing::warn!(medication_id = id, "Edited medication no longer exists");
                    self.scheduler.cancel(id);
                }
                tracing::info!(medication_id = id, editing = draft.is_editing, "Medication saved");
                self.state.send_modify(|s| {
                    s.id = id;
                    s.is_saved = true;
                    s.error_message = None;
                });
                Ok(id)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to save medication");
                let message = format!("Could not save medication: {e}");
                self.state.send_modify(|s| s.error_message = Some(message));
                Err(e.into())
            }
        }
    }

    /// Delete the medication (and its history) and disarm its reminder.
    pub async fn delete(&self, med: &Medication) -> Result<(), FormError> {
        match self.repo.delete_medication(med.id).await {
            Ok(found) => {
                if !found {
                    tracing::warn!(medication_id = med.id, "Medication already deleted");
                }
                self.scheduler.cancel(med.id);
                tracing::info!(medication_id = med.id, "Medication deleted");
                Ok(())
            }
            Err(e) => {
                tracing::error!(medication_id = med.id, error = %e, "Failed to delete medication");
                let message = format!("Could not delete medication: {e}");
                self.state.send_modify(|s| s.error_message = Some(message));
                Err(e.into())
            }
        }
    }

    /// Log a dose as taken now.
    pub async fn record_dose(
        &self,
        medication_id: i64,
        notes: impl Into<String>,
    ) -> Result<i64, FormError> {
        let entry = MedicationHistory {
            id: 0,
            medication_id,
            timestamp: now_millis(),
            notes: notes.into(),
        };
        let id = self.repo.insert_history(entry).await?;
        tracing::debug!(medication_id, history_id = id, "Dose recorded");
        Ok(id)
    }
}
