//! Application services shared by every screen.
//!
//! `CoreState` is built once at startup and handed to the UI shell, which
//! creates form controllers from it. Nothing here is global.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::{ConfigError, Settings};
use crate::db::DatabaseError;
use crate::forms::{ConsultationForm, MedicationForm};
use crate::reminder::{
    spawn_dispatcher, AlarmHost, AlertDisplay, ReminderScheduler, SchedulerError, TokioAlarmHost,
};
use crate::repository::Repository;
use crate::store::Store;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

pub struct CoreState {
    settings: Settings,
    repo: Repository,
    host: Arc<TokioAlarmHost>,
    scheduler: ReminderScheduler,
    dispatcher: JoinHandle<()>,
}

impl CoreState {
    /// Wire the store, alarm host and alert dispatcher together, then
    /// re-arm reminders for persisted medications that are still upcoming.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start(
        settings: Settings,
        store: Store,
        display: Arc<dyn AlertDisplay>,
    ) -> Result<Self, CoreError> {
        let (host, fired) = TokioAlarmHost::new(
            settings.exact_alarms_allowed,
            Duration::from_secs(settings.inexact_slack_secs),
        )?;
        let host = Arc::new(host);
        let scheduler = ReminderScheduler::new(host.clone(), settings.trigger_policy);
        let dispatcher = spawn_dispatcher(display, fired);
        let repo = Repository::new(store);

        // A store that cannot be listed still opens; reminders stay disarmed.
        match repo.list_medications().await {
            Ok(medications) => {
                scheduler.rearm_all(&medications, Utc::now());
            }
            Err(e) => tracing::error!(error = %e, "Could not load medications, reminders not re-armed"),
        }

        Ok(Self {
            settings,
            repo,
            host,
            scheduler,
            dispatcher,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn scheduler(&self) -> &ReminderScheduler {
        &self.scheduler
    }

    /// Reflect a change of the exact-alarm permission made in system settings.
    pub fn set_exact_alarms_allowed(&mut self, allowed: bool) {
        self.settings.exact_alarms_allowed = allowed;
        self.host.set_exact_allowed(allowed);
    }

    /// Write the current settings, including any permission change, to `path`.
    pub fn save_settings(&self, path: &Path) -> Result<(), CoreError> {
        self.settings.save_to(path)?;
        tracing::debug!(path = %path.display(), "Settings saved");
        Ok(())
    }

    pub fn pending_reminders(&self) -> usize {
        self.host.pending_count()
    }

    pub fn consultation_form(&self) -> ConsultationForm {
        ConsultationForm::new(self.repo.clone(), self.scheduler.clone())
    }

    pub fn medication_form(&self) -> MedicationForm {
        MedicationForm::new(self.repo.clone(), self.scheduler.clone())
    }
}

impl Drop for CoreState {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}
