use crate::alarm::{Alarm, AlarmId};
use crate::service::AlarmService;
use tracing::info;

/// The alarm that is ringing right now, as seen by the ringing screen.
#[derive(Clone)]
pub struct RingSession {
    alarm_id: AlarmId,
    service: AlarmService,
}

impl RingSession {
    pub fn new(alarm_id: AlarmId, service: AlarmService) -> Self {
        info!(alarm_id, "alarm ringing");
        Self { alarm_id, service }
    }

    pub fn alarm_id(&self) -> AlarmId {
        self.alarm_id
    }

    pub async fn alarm(&self) -> Option<Alarm> {
        self.service.get_alarm(self.alarm_id).await
    }

    /// Dismiss.
    pub fn cancel(&self) {
        self.service.disable_alarm(self.alarm_id);
    }

    pub fn snooze(&self) {
        self.service.snooze(self.alarm_id);
    }
}
