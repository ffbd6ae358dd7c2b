use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Payload delivered when a reminder fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderEvent {
    pub medication_id: i64,
    pub medication_name: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Exact alarm permission not granted")]
    PermissionDenied,

    #[error("Alarm host unavailable: {0}")]
    HostUnavailable(String),

    #[error("Trigger time out of range for medication {0}")]
    TimeOutOfRange(i64),
}

/// Timed-callback service provided by the host environment.
///
/// Registrations are keyed: registering a key that is already pending
/// replaces it.
pub trait AlarmHost: Send + Sync {
    /// Whether precise wake-ups are currently permitted.
    fn can_schedule_exact(&self) -> bool;

    fn set_exact(
        &self,
        key: i64,
        at: DateTime<Utc>,
        event: ReminderEvent,
    ) -> Result<(), SchedulerError>;

    /// Best-effort registration; the host may deliver late.
    fn set_inexact(
        &self,
        key: i64,
        at: DateTime<Utc>,
        event: ReminderEvent,
    ) -> Result<(), SchedulerError>;

    /// Drop the registration for `key`, if any.
    fn cancel(&self, key: i64);

    /// Trigger instant of the pending registration for `key`.
    fn pending(&self, key: i64) -> Option<DateTime<Utc>>;

    fn pending_count(&self) -> usize;
}

struct PendingAlarm {
    at: DateTime<Utc>,
    token: u64,
    task: JoinHandle<()>,
}

type AlarmTable = Arc<Mutex<HashMap<i64, PendingAlarm>>>;

/// In-process alarm host: each registration is a sleeping tokio task.
///
/// Fired reminders are delivered on the channel returned by [`TokioAlarmHost::new`].
pub struct TokioAlarmHost {
    exact_allowed: AtomicBool,
    inexact_slack: Duration,
    alarms: AlarmTable,
    fired: mpsc::UnboundedSender<ReminderEvent>,
    next_token: AtomicU64,
    runtime: Handle,
}

impl TokioAlarmHost {
    /// Must be called from within a tokio runtime.
    pub fn new(
        exact_allowed: bool,
        inexact_slack: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ReminderEvent>), SchedulerError> {
        let runtime =
            Handle::try_current().map_err(|e| SchedulerError::HostUnavailable(e.to_string()))?;
        let (fired, rx) = mpsc::unbounded_channel();
        let host = Self {
            exact_allowed: AtomicBool::new(exact_allowed),
            inexact_slack,
            alarms: Arc::new(Mutex::new(HashMap::new())),
            fired,
            next_token: AtomicU64::new(0),
            runtime,
        };
        Ok((host, rx))
    }

    /// Grant or revoke the exact-alarm permission.
    pub fn set_exact_allowed(&self, allowed: bool) {
        self.exact_allowed.store(allowed, Ordering::Relaxed);
    }

    fn register(
        &self,
        key: i64,
        at: DateTime<Utc>,
        slack: Duration,
        event: ReminderEvent,
    ) -> Result<(), SchedulerError> {
        // Past instants clamp to zero: already due.
        let delay = (at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
            .checked_add(slack)
            .ok_or(SchedulerError::TimeOutOfRange(key))?;
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);

        // Hold the table lock across spawn so a zero-delay task cannot
        // finish before its entry exists.
        let mut alarms = self
            .alarms
            .lock()
            .map_err(|_| SchedulerError::HostUnavailable("alarm table poisoned".into()))?;

        let table = Arc::clone(&self.alarms);
        let fired = self.fired.clone();
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Ok(mut alarms) = table.lock() {
                if alarms.get(&key).is_some_and(|a| a.token == token) {
                    alarms.remove(&key);
                }
            }
            tracing::debug!(medication_id = key, "Reminder fired");
            if fired.send(event).is_err() {
                tracing::warn!(medication_id = key, "Reminder fired with no dispatcher listening");
            }
        });

        if let Some(previous) = alarms.insert(key, PendingAlarm { at, token, task }) {
            previous.task.abort();
        }
        Ok(())
    }
}

impl AlarmHost for TokioAlarmHost {
    fn can_schedule_exact(&self) -> bool {
        self.exact_allowed.load(Ordering::Relaxed)
    }

    fn set_exact(
        &self,
        key: i64,
        at: DateTime<Utc>,
        event: ReminderEvent,
    ) -> Result<(), SchedulerError> {
        if !self.can_schedule_exact() {
            return Err(SchedulerError::PermissionDenied);
        }
        self.register(key, at, Duration::ZERO, event)
    }

    fn set_inexact(
        &self,
        key: i64,
        at: DateTime<Utc>,
        event: ReminderEvent,
    ) -> Result<(), SchedulerError> {
        self.register(key, at, self.inexact_slack, event)
    }

    fn cancel(&self, key: i64) {
        if let Ok(mut alarms) = self.alarms.lock() {
            if let Some(alarm) = alarms.remove(&key) {
                alarm.task.abort();
            }
        }
    }

    fn pending(&self, key: i64) -> Option<DateTime<Utc>> {
        self.alarms.lock().ok()?.get(&key).map(|a| a.at)
    }

    fn pending_count(&self) -> usize {
        self.alarms.lock().map(|a| a.len()).unwrap_or(0)
    }
}

impl Drop for TokioAlarmHost {
    fn drop(&mut self) {
        if let Ok(mut alarms) = self.alarms.lock() {
            for (_, alarm) in alarms.drain() {
                alarm.task.abort();
            }
        }
    }
}
