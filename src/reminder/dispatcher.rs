use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::host::ReminderEvent;

pub const ALERT_TITLE: &str = "Time for your medication!";
pub const FALLBACK_MEDICATION_NAME: &str = "Medication";
/// Five one-second pulses.
pub const VIBRATION_PATTERN_MS: [u64; 5] = [1000; 5];

/// Reminder alerts always interrupt at the highest level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPriority {
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    Alarm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSound {
    Alarm,
}

/// Where activating an alert takes the user. Always the same screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPoint {
    Home,
}

/// A user-visible alert, keyed by medication id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub key: i64,
    pub title: String,
    pub body: String,
    pub priority: AlertPriority,
    pub category: AlertCategory,
    pub sound: AlertSound,
    pub vibration_ms: Vec<u64>,
    /// Dismiss on activation.
    pub auto_cancel: bool,
    pub open_target: EntryPoint,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DisplayError {
    #[error("Notifications are disabled")]
    Disabled,

    #[error("Alert display unavailable: {0}")]
    Unavailable(String),
}

/// User-alert service provided by the host environment.
pub trait AlertDisplay: Send + Sync {
    /// Show `alert`, replacing any alert already shown under the same key.
    fn show(&self, alert: Alert) -> Result<(), DisplayError>;

    fn dismiss(&self, key: i64);
}

/// Build the alert for a fired reminder.
pub fn build_alert(event: &ReminderEvent) -> Alert {
    let name = match event.medication_name.trim() {
        "" => FALLBACK_MEDICATION_NAME,
        name => name,
    };
    Alert {
        key: event.medication_id,
        title: ALERT_TITLE.into(),
        body: format!("It's time to take: {name}"),
        priority: AlertPriority::Max,
        category: AlertCategory::Alarm,
        sound: AlertSound::Alarm,
        vibration_ms: VIBRATION_PATTERN_MS.to_vec(),
        auto_cancel: true,
        open_target: EntryPoint::Home,
    }
}

/// Receiving side of fired reminders. Display is best-effort: failures are
/// logged, never retried.
#[derive(Clone)]
pub struct AlertDispatcher {
    display: Arc<dyn AlertDisplay>,
}

impl AlertDispatcher {
    pub fn new(display: Arc<dyn AlertDisplay>) -> Self {
        Self { display }
    }

    pub fn handle(&self, event: &ReminderEvent) {
        let alert = build_alert(event);
        if let Err(e) = self.display.show(alert) {
            tracing::warn!(medication_id = event.medication_id, error = %e, "Reminder alert not shown");
        }
    }

    /// Drain fired reminders until every sender is gone.
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<ReminderEvent>) {
        while let Some(event) = rx.recv().await {
            self.handle(&event);
        }
        tracing::info!("Alert dispatcher stopped");
    }
}

/// Start the dispatcher loop on the current runtime.
pub fn spawn_dispatcher(
    display: Arc<dyn AlertDisplay>,
    rx: mpsc::UnboundedReceiver<ReminderEvent>,
) -> JoinHandle<()> {
    tokio::spawn(AlertDispatcher::new(display).run(rx))
}

/// In-memory notification shade: at most one alert per key.
#[derive(Default)]
pub struct AlertTray {
    shown: Mutex<HashMap<i64, Alert>>,
}

impl AlertTray {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alerts currently shown, ordered by key.
    pub fn active(&self) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self
            .shown
            .lock()
            .map(|shown| shown.values().cloned().collect())
            .unwrap_or_default();
        alerts.sort_by_key(|a| a.key);
        alerts
    }

    pub fn get(&self, key: i64) -> Option<Alert> {
        self.shown.lock().ok()?.get(&key).cloned()
    }

    /// The user tapped the alert. Returns where to navigate, removing the
    /// alert if it auto-cancels. `None` if nothing is shown under `key`.
    pub fn activate(&self, key: i64) -> Option<EntryPoint> {
        let mut shown = self.shown.lock().ok()?;
        let target = shown.get(&key)?.open_target;
        if shown.get(&key).is_some_and(|a| a.auto_cancel) {
            shown.remove(&key);
        }
        Some(target)
    }
}

impl AlertDisplay for AlertTray {
    fn show(&self, alert: Alert) -> Result<(), DisplayError> {
        let mut shown = self
            .shown
            .lock()
            .map_err(|_| DisplayError::Unavailable("alert tray poisoned".into()))?;
        shown.insert(alert.key, alert);
        Ok(())
    }

    fn dismiss(&self, key: i64) {
        if let Ok(mut shown) = self.shown.lock() {
            shown.remove(&key);
        }
    }
}

/// Writes alerts to the log. Used when no UI shell is attached.
pub struct TracingAlertDisplay;

impl AlertDisplay for TracingAlertDisplay {
    fn show(&self, alert: Alert) -> Result<(), DisplayError> {
        tracing::info!(
            medication_id = alert.key,
            title = %alert.title,
            body = %alert.body,
            "Medication reminder"
        );
        Ok(())
    }

    fn dismiss(&self, key: i64) {
        tracing::debug!(medication_id = key, "Reminder alert dismissed");
    }
}
