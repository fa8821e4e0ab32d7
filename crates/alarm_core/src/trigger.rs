use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::alarm::AlarmId;
use crate::error::ScheduleError;

/// A one-shot wake-up for `alarm_id` at an absolute instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRequest {
    pub alarm_id: AlarmId,
    pub fire_at_millis: i64,
}

impl TriggerRequest {
    pub fn new<Tz: TimeZone>(alarm_id: AlarmId, at: &DateTime<Tz>) -> Self {
        Self {
            alarm_id,
            fire_at_millis: at.timestamp_millis(),
        }
    }

    pub fn fire_at(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.fire_at_millis).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Platform facility that wakes the device for an alarm. At most one trigger per alarm id:
/// arming again replaces the previous one, disarming an unknown id does nothing.
pub trait TriggerScheduler: Send + Sync {
    fn arm(&self, request: TriggerRequest) -> Result<(), ScheduleError>;
    fn disarm(&self, alarm_id: AlarmId) -> Result<(), ScheduleError>;
}

/// Keeps armed triggers in a table. Backs tests and hosts without a native wake-up service.
#[derive(Debug, Default)]
pub struct InMemoryScheduler {
    armed: Mutex<BTreeMap<AlarmId, TriggerRequest>>,
    deny_exact: AtomicBool,
}

impl InMemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates a platform that has not granted exact-alarm scheduling.
    pub fn deny_exact_alarms(&self, deny: bool) {
        self.deny_exact.store(deny, Ordering::SeqCst);
    }

    pub fn armed(&self, alarm_id: AlarmId) -> Option<TriggerRequest> {
        self.armed.lock().get(&alarm_id).copied()
    }

    pub fn snapshot(&self) -> Vec<TriggerRequest> {
        self.armed.lock().values().copied().collect()
    }

    /// Earliest armed trigger, if any.
    pub fn next_due(&self) -> Option<TriggerRequest> {
        self.armed
            .lock()
            .values()
            .min_by_key(|request| request.fire_at_millis)
            .copied()
    }
}

impl TriggerScheduler for InMemoryScheduler {
    fn arm(&self, request: TriggerRequest) -> Result<(), ScheduleError> {
        if self.deny_exact.load(Ordering::SeqCst) {
            return Err(ScheduleError::ExactAlarmDenied);
        }
        self.armed.lock().insert(request.alarm_id, request);
        Ok(())
    }

    fn disarm(&self, alarm_id: AlarmId) -> Result<(), ScheduleError> {
        self.armed.lock().remove(&alarm_id);
        Ok(())
    }
}
