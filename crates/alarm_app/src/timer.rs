use std::collections::HashMap;

use alarm_core::{AlarmId, ScheduleError, TriggerRequest, TriggerScheduler};
use chrono::Utc;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Wakes the process for each armed alarm with one tokio timer task per alarm id.
/// Expired alarm ids are delivered on the channel returned by [`TimerScheduler::new`].
pub struct TimerScheduler {
    tasks: Mutex<HashMap<AlarmId, JoinHandle<()>>>,
    fired: mpsc::UnboundedSender<AlarmId>,
}

impl TimerScheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AlarmId>) {
        let (fired, rx) = mpsc::unbounded_channel();
        (
            Self {
                tasks: Mutex::new(HashMap::new()),
                fired,
            },
            rx,
        )
    }

    pub fn is_armed(&self, alarm_id: AlarmId) -> bool {
        self.tasks
            .lock()
            .get(&alarm_id)
            .is_some_and(|task| !task.is_finished())
    }
}

impl TriggerScheduler for TimerScheduler {
    fn arm(&self, request: TriggerRequest) -> Result<(), ScheduleError> {
        let runtime = Handle::try_current().map_err(|err| ScheduleError::Platform {
            alarm_id: request.alarm_id,
            reason: err.to_string(),
        })?;
        let delay = (request.fire_at() - Utc::now()).to_std().unwrap_or_default();
        let fired = self.fired.clone();
        let alarm_id = request.alarm_id;
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if fired.send(alarm_id).is_err() {
                debug!(alarm_id, "alarm fired with nobody listening");
            }
        });

        if let Some(previous) = self.tasks.lock().insert(alarm_id, task) {
            previous.abort();
        }
        debug!(alarm_id, delay_secs = delay.as_secs(), "timer armed");
        Ok(())
    }

    fn disarm(&self, alarm_id: AlarmId) -> Result<(), ScheduleError> {
        if let Some(task) = self.tasks.lock().remove(&alarm_id) {
            task.abort();
            debug!(alarm_id, "timer disarmed");
        }
        Ok(())
    }
}

impl Drop for TimerScheduler {
    fn drop(&mut self) {
        for (_, task) in self.tasks.get_mut().drain() {
            task.abort();
        }
    }
}
