use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::host::{AlarmHost, ReminderEvent};
use crate::models::Medication;

/// How a medication's start time maps to the reminder instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerPolicy {
    /// Fire exactly at the first dose.
    #[default]
    AtStart,
    /// Fire this many minutes before the first dose.
    LeadMinutes(u32),
}

impl TriggerPolicy {
    pub fn trigger_time(&self, med: &Medication) -> Option<DateTime<Utc>> {
        match self {
            TriggerPolicy::AtStart => Some(med.start_time),
            TriggerPolicy::LeadMinutes(minutes) => med
                .start_time
                .checked_sub_signed(Duration::minutes(i64::from(*minutes))),
        }
    }
}

/// Result of arming a reminder. Never an error: a reminder that cannot be
/// registered must not block saving the medication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Exact(DateTime<Utc>),
    Inexact(DateTime<Utc>),
    Failed,
}

impl ScheduleOutcome {
    pub fn is_armed(&self) -> bool {
        !matches!(self, ScheduleOutcome::Failed)
    }
}

/// Arms and disarms one reminder per medication, keyed by medication id.
#[derive(Clone)]
pub struct ReminderScheduler {
    host: Arc<dyn AlarmHost>,
    policy: TriggerPolicy,
}

impl ReminderScheduler {
    pub fn new(host: Arc<dyn AlarmHost>, policy: TriggerPolicy) -> Self {
        Self { host, policy }
    }

    pub fn policy(&self) -> TriggerPolicy {
        self.policy
    }

    /// Register (or replace) the reminder for `med`.
    ///
    /// Prefers an exact wake-up; falls back to best-effort timing when the
    /// host withholds the permission or rejects the exact request.
    pub fn schedule(&self, med: &Medication) -> ScheduleOutcome {
        let Some(at) = self.policy.trigger_time(med) else {
            tracing::warn!(medication_id = med.id, "Reminder time out of range, not scheduled");
            return ScheduleOutcome::Failed;
        };

        let event = ReminderEvent {
            medication_id: med.id,
            medication_name: med.name.clone(),
        };

        if self.host.can_schedule_exact() {
            match self.host.set_exact(med.id, at, event.clone()) {
                Ok(()) => {
                    tracing::info!(medication_id = med.id, at = %at, "Reminder scheduled");
                    return ScheduleOutcome::Exact(at);
                }
                Err(e) => {
                    tracing::warn!(medication_id = med.id, error = %e, "Exact reminder rejected, falling back");
                }
            }
        } else {
            tracing::warn!(
                medication_id = med.id,
                "Exact alarm permission not granted, using inexact reminder"
            );
        }

        match self.host.set_inexact(med.id, at, event) {
            Ok(()) => {
                tracing::info!(medication_id = med.id, at = %at, "Inexact reminder scheduled");
                ScheduleOutcome::Inexact(at)
            }
            Err(e) => {
                tracing::error!(medication_id = med.id, error = %e, "Could not schedule reminder");
                ScheduleOutcome::Failed
            }
        }
    }

    /// Drop any pending reminder for the medication. Idempotent.
    pub fn cancel(&self, medication_id: i64) {
        self.host.cancel(medication_id);
        tracing::debug!(medication_id, "Reminder cancelled");
    }

    pub fn pending(&self, medication_id: i64) -> Option<DateTime<Utc>> {
        self.host.pending(medication_id)
    }

    /// Re-register reminders after a restart. Only reminders still in the
    /// future are armed; past ones already had their chance to fire.
    /// Medications without a usable schedule are skipped.
    pub fn rearm_all(&self, meds: &[Medication], now: DateTime<Utc>) -> usize {
        let mut armed = 0;
        for med in meds {
            if med.frequency_hours == 0 || med.treatment_duration_days == 0 {
                tracing::warn!(medication_id = med.id, "Invalid schedule, reminder not re-armed");
                continue;
            }
            let due = self.policy.trigger_time(med);
            if due.is_some_and(|at| at > now) && self.schedule(med).is_armed() {
                armed += 1;
            }
        }
        tracing::info!(armed, total = meds.len(), "Reminders re-armed");
        armed
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use chrono::TimeZone;

    use super::*;
    use crate::reminder::host::SchedulerError;

    /// Records registrations without any timers.
    #[derive(Default)]
    struct FakeHost {
        exact_allowed: AtomicBool,
        reject_exact: AtomicBool,
        reject_all: AtomicBool,
        pending: Mutex<HashMap<i64, (DateTime<Utc>, bool)>>,
    }

    impl FakeHost {
        fn allowing_exact() -> Self {
            let host = Self::default();
            host.exact_allowed.store(true, Ordering::Relaxed);
            host
        }
    }

    impl AlarmHost for FakeHost {
        fn can_schedule_exact(&self) -> bool {
            self.exact_allowed.load(Ordering::Relaxed)
        }

        fn set_exact(&self, key: i64, at: DateTime<Utc>, _: ReminderEvent) -> Result<(), SchedulerError> {
            if self.reject_exact.load(Ordering::Relaxed) {
                return Err(SchedulerError::PermissionDenied);
            }
            self.pending.lock().unwrap().insert(key, (at, true));
            Ok(())
        }

        fn set_inexact(&self, key: i64, at: DateTime<Utc>, _: ReminderEvent) -> Result<(), SchedulerError> {
            if self.reject_all.load(Ordering::Relaxed) {
                return Err(SchedulerError::HostUnavailable("offline".into()));
            }
            self.pending.lock().unwrap().insert(key, (at, false));
            Ok(())
        }

        fn cancel(&self, key: i64) {
            self.pending.lock().unwrap().remove(&key);
        }

        fn pending(&self, key: i64) -> Option<DateTime<Utc>> {
            self.pending.lock().unwrap().get(&key).map(|(at, _)| *at)
        }

        fn pending_count(&self) -> usize {
            self.pending.lock().unwrap().len()
        }
    }

    fn med(id: i64, start: DateTime<Utc>) -> Medication {
        Medication {
            id,
            consultation_id: Some(1),
            name: "Amoxicillin".into(),
            dose: "500mg".into(),
            frequency_hours: 8,
            treatment_duration_days: 7,
            purpose: String::new(),
            additional_notes: String::new(),
            start_time: start,
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 6, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn at_start_policy_uses_start_time() {
        assert_eq!(TriggerPolicy::AtStart.trigger_time(&med(1, start())), Some(start()));
    }

    #[test]
    fn lead_policy_fires_early() {
        let at = TriggerPolicy::LeadMinutes(5).trigger_time(&med(1, start()));
        assert_eq!(at, Some(Utc.with_ymd_and_hms(2030, 6, 1, 7, 55, 0).unwrap()));
    }

    #[test]
    fn schedules_exact_when_permitted() {
        let host = Arc::new(FakeHost::allowing_exact());
        let scheduler = ReminderScheduler::new(host.clone(), TriggerPolicy::AtStart);

        assert_eq!(scheduler.schedule(&med(1, start())), ScheduleOutcome::Exact(start()));
        assert_eq!(host.pending.lock().unwrap()[&1], (start(), true));
    }

    #[test]
    fn degrades_to_inexact_without_permission() {
        let host = Arc::new(FakeHost::default());
        let scheduler = ReminderScheduler::new(host.clone(), TriggerPolicy::AtStart);

        assert_eq!(scheduler.schedule(&med(1, start())), ScheduleOutcome::Inexact(start()));
        assert_eq!(host.pending.lock().unwrap()[&1], (start(), false));
    }

    #[test]
    fn degrades_to_inexact_when_exact_rejected() {
        let host = Arc::new(FakeHost::allowing_exact());
        host.reject_exact.store(true, Ordering::Relaxed);
        let scheduler = ReminderScheduler::new(host.clone(), TriggerPolicy::AtStart);

        assert_eq!(scheduler.schedule(&med(1, start())), ScheduleOutcome::Inexact(start()));
    }

    #[test]
    fn host_failure_reports_failed_without_panicking() {
        let host = Arc::new(FakeHost::default());
        host.reject_all.store(true, Ordering::Relaxed);
        let scheduler = ReminderScheduler::new(host.clone(), TriggerPolicy::AtStart);

        assert_eq!(scheduler.schedule(&med(1, start())), ScheduleOutcome::Failed);
        assert_eq!(host.pending_count(), 0);
    }

    #[test]
    fn scheduling_twice_keeps_one_pending() {
        let host = Arc::new(FakeHost::allowing_exact());
        let scheduler = ReminderScheduler::new(host.clone(), TriggerPolicy::AtStart);
        scheduler.schedule(&med(1, start()));
        scheduler.schedule(&med(1, start() + Duration::hours(1)));

        assert_eq!(host.pending_count(), 1);
        assert_eq!(scheduler.pending(1), Some(start() + Duration::hours(1)));
    }

    #[test]
    fn schedule_then_cancel_leaves_nothing_pending() {
        let host = Arc::new(FakeHost::allowing_exact());
        let scheduler = ReminderScheduler::new(host.clone(), TriggerPolicy::AtStart);
        scheduler.schedule(&med(1, start()));
        scheduler.cancel(1);
        scheduler.cancel(1);

        assert_eq!(scheduler.pending(1), None);
    }

    #[test]
    fn rearm_skips_past_reminders() {
        let host = Arc::new(FakeHost::allowing_exact());
        let scheduler = ReminderScheduler::new(host.clone(), TriggerPolicy::AtStart);
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let meds = vec![
            med(1, start()),
            med(2, now - Duration::days(1)),
            med(3, start() + Duration::days(1)),
        ];

        assert_eq!(scheduler.rearm_all(&meds, now), 2);
        assert_eq!(scheduler.pending(2), None);
        assert!(scheduler.pending(3).is_some());
    }

    #[test]
    fn rearm_skips_invalid_schedules() {
        let host = Arc::new(FakeHost::allowing_exact());
        let scheduler = ReminderScheduler::new(host.clone(), TriggerPolicy::AtStart);
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let broken = Medication {
            frequency_hours: 0,
            ..med(2, start())
        };

        assert_eq!(scheduler.rearm_all(&[med(1, start()), broken], now), 1);
        assert_eq!(scheduler.pending(2), None);
    }
}
