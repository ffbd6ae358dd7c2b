use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use super::{FormError, CONSULTATION_REQUIRED};
use crate::models::{now_millis, Consultation};
use crate::reminder::ReminderScheduler;
use crate::repository::Repository;
use crate::store::LiveQuery;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsultationUiState {
    pub id: i64,
    pub doctor_name: String,
    pub diagnosis: String,
    pub date: DateTime<Utc>,
    pub notes: String,
    pub is_editing: bool,
    pub is_saved: bool,
    pub error_message: Option<String>,
}

impl Default for ConsultationUiState {
    fn default() -> Self {
        Self {
            id: 0,
            doctor_name: String::new(),
            diagnosis: String::new(),
            date: now_millis(),
            notes: String::new(),
            is_editing: false,
            is_saved: false,
            error_message: None,
        }
    }
}

/// Drives the "new / edit consultation" screen.
pub struct ConsultationForm {
    repo: Repository,
    scheduler: ReminderScheduler,
    state: watch::Sender<ConsultationUiState>,
}

impl ConsultationForm {
    pub fn new(repo: Repository, scheduler: ReminderScheduler) -> Self {
        let (state, _) = watch::channel(ConsultationUiState::default());
        Self {
            repo,
            scheduler,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConsultationUiState> {
        self.state.subscribe()
    }

    /// Snapshot of the current draft.
    pub fn state(&self) -> ConsultationUiState {
        self.state.borrow().clone()
    }

    /// Every consultation, most recent first.
    pub fn all_consultations(&self) -> LiveQuery<Consultation> {
        self.repo.all_consultations()
    }

    pub fn set_doctor_name(&self, value: impl Into<String>) {
        let value = value.into();
        self.state.send_modify(|s| s.doctor_name = value);
    }

    pub fn set_diagnosis(&self, value: impl Into<String>) {
        let value = value.into();
        self.state.send_modify(|s| s.diagnosis = value);
    }

    pub fn set_date(&self, value: DateTime<Utc>) {
        self.state.send_modify(|s| s.date = value);
    }

    pub fn set_notes(&self, value: impl Into<String>) {
        let value = value.into();
        self.state.send_modify(|s| s.notes = value);
    }

    pub fn reset_state(&self) {
        self.state.send_replace(ConsultationUiState::default());
    }

    pub fn start_editing(&self, consultation: &Consultation) {
        self.state.send_modify(|s| {
            s.id = consultation.id;
            s.doctor_name = consultation.doctor_name.clone();
            s.diagnosis = consultation.diagnosis.clone();
            s.date = consultation.date;
            s.notes = consultation.notes.clone();
            s.is_editing = true;
            s.is_saved = false;
        });
    }

    pub fn error_message_shown(&self) {
        self.state.send_modify(|s| s.error_message = None);
    }

    /// The UI has navigated away after a save.
    pub fn saved_handled(&self) {
        self.state.send_modify(|s| s.is_saved = false);
    }

    /// Validate and persist the draft. Returns the consultation id.
    pub async fn save(&self) -> Result<i64, FormError> {
        let draft = self.state();
        if draft.doctor_name.trim().is_empty() || draft.diagnosis.trim().is_empty() {
            self.state
                .send_modify(|s| s.error_message = Some(CONSULTATION_REQUIRED.into()));
            return Err(FormError::Validation(CONSULTATION_REQUIRED.into()));
        }

        let record = Consultation {
            id: if draft.is_editing { draft.id } else { 0 },
            doctor_name: draft.doctor_name,
            diagnosis: draft.diagnosis,
            date: draft.date,
            notes: draft.notes,
        };

        let result = if draft.is_editing {
            let id = record.id;
            self.repo.update_consultation(record).await.map(|found| {
                if !found {
                    tracing::warn!(consultation_id = id, "Edited consultation no longer exists");
                }
                id
            })
        } else {
            self.repo.insert_consultation(record).await
        };

        match result {
            Ok(id) => {
                tracing::info!(consultation_id = id, editing = draft.is_editing, "Consultation saved");
                self.state.send_modify(|s| {
                    s.id = id;
                    s.is_saved = true;
                    s.error_message = None;
                });
                Ok(id)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to save consultation");
                let message = format!("Could not save consultation: {e}");
                self.state.send_modify(|s| s.error_message = Some(message));
                Err(e.into())
            }
        }
    }

    /// Delete a consultation along with its medications, and disarm their
    /// reminders.
    pub async fn delete(&self, consultation: &Consultation) -> Result<(), FormError> {
        match self
            .repo
            .delete_consultation_with_medications(consultation.id)
            .await
        {
            Ok((found, medication_ids)) => {
                if !found {
                    tracing::warn!(consultation_id = consultation.id, "Consultation already deleted");
                }
                for id in &medication_ids {
                    self.scheduler.cancel(*id);
                }
                tracing::info!(
                    consultation_id = consultation.id,
                    medications = medication_ids.len(),
                    "Consultation deleted"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(consultation_id = consultation.id, error = %e, "Failed to delete consultation");
                let message = format!("Could not delete consultation: {e}");
                self.state.send_modify(|s| s.error_message = Some(message));
                Err(e.into())
            }
        }
    }
}
