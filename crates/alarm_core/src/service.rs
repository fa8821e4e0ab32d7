use std::sync::Arc;

use chrono::{Duration, Timelike};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::{
    alarm::{Alarm, AlarmId, AlarmTime, DaySet},
    error::{AlarmError, ScheduleError},
    messages::{MessageBus, SettingsTarget, SnackbarAction},
    permissions::SettingsLauncher,
    ringing::RingSession,
    schedule::{next_trigger, Clock, SystemClock},
    store::{AlarmStore, AlarmTable},
    trigger::{InMemoryScheduler, TriggerRequest, TriggerScheduler},
};

pub const DEFAULT_SNOOZE_MINUTES: i64 = 5;

const MSG_UPDATED_EXISTING: &str = "Alarm for this time updated";
const MSG_DELETED: &str = "Alarm deleted";
const MSG_UNDO: &str = "Undo";
const MSG_STORAGE_FAILED: &str = "Could not save the alarm";
const MSG_EXACT_DENIED: &str = "Allow exact alarms so the alarm rings on time";
const MSG_SETTINGS: &str = "Settings";

enum Command {
    Create { time: AlarmTime, days: DaySet },
    Update { id: AlarmId, time: AlarmTime, days: DaySet },
    Toggle(AlarmId),
    SoftDelete(AlarmId),
    UndoDelete(Alarm),
    HardDelete(Alarm),
    PurgeDeleted,
    Snooze(AlarmId),
    Disable(AlarmId),
    RestoreTriggers,
    Get { id: AlarmId, reply: oneshot::Sender<Option<Alarm>> },
    Flush(oneshot::Sender<()>),
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Create { .. } => "create",
            Command::Update { .. } => "update",
            Command::Toggle(_) => "toggle",
            Command::SoftDelete(_) => "soft_delete",
            Command::UndoDelete(_) => "undo_delete",
            Command::HardDelete(_) => "hard_delete",
            Command::PurgeDeleted => "purge_deleted",
            Command::Snooze(_) => "snooze",
            Command::Disable(_) => "disable",
            Command::RestoreTriggers => "restore_triggers",
            Command::Get { .. } => "get",
            Command::Flush(_) => "flush",
        }
    }
}

/// Handle to the alarm orchestrator. Every mutation is queued and applied in order by a single
/// worker task; callers never wait for persistence or scheduling to finish.
#[derive(Clone)]
pub struct AlarmService {
    commands: mpsc::UnboundedSender<Command>,
    store: Arc<dyn AlarmStore>,
    messages: MessageBus,
    launcher: Option<Arc<dyn SettingsLauncher>>,
}

pub struct AlarmServiceBuilder<C = SystemClock> {
    store: Option<Arc<dyn AlarmStore>>,
    scheduler: Option<Arc<dyn TriggerScheduler>>,
    messages: Option<MessageBus>,
    launcher: Option<Arc<dyn SettingsLauncher>>,
    clock: C,
    snooze: Duration,
}

impl AlarmServiceBuilder<SystemClock> {
    pub fn new() -> Self {
        Self {
            store: None,
            scheduler: None,
            messages: None,
            launcher: None,
            clock: SystemClock,
            snooze: Duration::minutes(DEFAULT_SNOOZE_MINUTES),
        }
    }
}

impl Default for AlarmServiceBuilder<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> AlarmServiceBuilder<C> {
    pub fn with_store(mut self, store: Arc<dyn AlarmStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn TriggerScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_messages(mut self, messages: MessageBus) -> Self {
        self.messages = Some(messages);
        self
    }

    pub fn with_settings_launcher(mut self, launcher: Arc<dyn SettingsLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn with_clock<C2: Clock>(self, clock: C2) -> AlarmServiceBuilder<C2> {
        AlarmServiceBuilder {
            store: self.store,
            scheduler: self.scheduler,
            messages: self.messages,
            launcher: self.launcher,
            clock,
            snooze: self.snooze,
        }
    }

    pub fn snooze_for(mut self, snooze: Duration) -> Self {
        self.snooze = snooze;
        self
    }

    /// Starts the worker on the current tokio runtime. Missing collaborators fall back to the
    /// in-memory table and scheduler.
    pub fn spawn(self) -> AlarmService {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(AlarmTable::in_memory()) as Arc<dyn AlarmStore>);
        let scheduler = self
            .scheduler
            .unwrap_or_else(|| Arc::new(InMemoryScheduler::new()) as Arc<dyn TriggerScheduler>);
        let messages = self.messages.unwrap_or_default();
        let (commands, rx) = mpsc::unbounded_channel();

        let worker = Worker {
            store: store.clone(),
            scheduler,
            messages: messages.clone(),
            clock: self.clock,
            snooze: self.snooze,
        };
        tokio::spawn(worker.run(rx));

        AlarmService {
            commands,
            store,
            messages,
            launcher: self.launcher,
        }
    }
}

impl AlarmService {
    pub fn builder() -> AlarmServiceBuilder {
        AlarmServiceBuilder::new()
    }

    /// Live list of active alarms, refreshed on every store write.
    pub fn alarms(&self) -> watch::Receiver<Vec<Alarm>> {
        self.store.subscribe_active()
    }

    pub fn messages(&self) -> &MessageBus {
        &self.messages
    }

    pub fn create_alarm(&self, time: AlarmTime, days: DaySet) {
        self.enqueue(Command::Create { time, days });
    }

    pub fn update_alarm(&self, alarm: &Alarm, time: AlarmTime, days: DaySet) {
        self.enqueue(Command::Update {
            id: alarm.id,
            time,
            days,
        });
    }

    pub fn toggle_alarm(&self, alarm: &Alarm) {
        self.enqueue(Command::Toggle(alarm.id));
    }

    pub fn soft_delete_alarm(&self, alarm: &Alarm) {
        self.enqueue(Command::SoftDelete(alarm.id));
    }

    /// Restores `alarm` (the pre-delete snapshot) and re-arms it when it was enabled.
    pub fn undo_soft_delete_alarm(&self, alarm: Alarm) {
        self.enqueue(Command::UndoDelete(alarm));
    }

    pub fn hard_delete_alarm(&self, alarm: &Alarm) {
        self.enqueue(Command::HardDelete(alarm.clone()));
    }

    pub fn delete_all_deleted_alarms(&self) {
        self.enqueue(Command::PurgeDeleted);
    }

    pub fn snooze(&self, alarm_id: AlarmId) {
        self.enqueue(Command::Snooze(alarm_id));
    }

    /// Called once an alarm has rung: one-shot alarms switch off, recurring ones re-arm.
    pub fn disable_alarm(&self, alarm_id: AlarmId) {
        self.enqueue(Command::Disable(alarm_id));
    }

    /// Re-arms every enabled alarm. Platform wake-ups do not outlive a restart.
    pub fn restore_triggers(&self) {
        self.enqueue(Command::RestoreTriggers);
    }

    /// Runs the action bound to a message the user tapped.
    pub fn perform(&self, action: SnackbarAction) {
        match action {
            SnackbarAction::UndoDelete(alarm) => self.undo_soft_delete_alarm(alarm),
            SnackbarAction::OpenSettings(target) => self.open_settings(target),
        }
    }

    pub fn ring(&self, alarm_id: AlarmId) -> RingSession {
        RingSession::new(alarm_id, self.clone())
    }

    pub async fn get_alarm(&self, alarm_id: AlarmId) -> Option<Alarm> {
        let (reply, rx) = oneshot::channel();
        self.enqueue(Command::Get { id: alarm_id, reply });
        rx.await.ok().flatten()
    }

    /// Resolves once everything queued before this call has been applied.
    pub async fn flush(&self) {
        let (reply, rx) = oneshot::channel();
        self.enqueue(Command::Flush(reply));
        let _ = rx.await;
    }

    fn open_settings(&self, target: SettingsTarget) {
        match &self.launcher {
            Some(launcher) => launcher.open_settings(target),
            None => debug!(?target, "no settings launcher registered"),
        }
    }

    fn enqueue(&self, command: Command) {
        let name = command.name();
        if self.commands.send(command).is_err() {
            warn!(operation = name, "alarm worker stopped, command dropped");
        }
    }
}

struct Worker<C> {
    store: Arc<dyn AlarmStore>,
    scheduler: Arc<dyn TriggerScheduler>,
    messages: MessageBus,
    clock: C,
    snooze: Duration,
}

impl<C: Clock> Worker<C> {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<Command>) {
        let worker = Arc::new(self);
        while let Some(command) = rx.recv().await {
            let name = command.name();
            let job = Arc::clone(&worker);
            // Store writes touch the filesystem, keep them off the async threads.
            let outcome = tokio::task::spawn_blocking(move || {
                if let Err(err) = job.handle(command) {
                    job.report(name, err);
                }
            })
            .await;
            if let Err(err) = outcome {
                error!(operation = name, error = %err, "alarm operation aborted");
            }
        }
        debug!("alarm worker finished");
    }

    fn handle(&self, command: Command) -> Result<(), AlarmError> {
        match command {
            Command::Create { time, days } => self.create(time, days),
            Command::Update { id, time, days } => self.update(id, time, days),
            Command::Toggle(id) => self.toggle(id),
            Command::SoftDelete(id) => self.soft_delete(id),
            Command::UndoDelete(alarm) => self.undo_delete(alarm),
            Command::HardDelete(alarm) => {
                self.store.delete(&alarm)?;
                info!(id = alarm.id, "alarm removed permanently");
                Ok(())
            }
            Command::PurgeDeleted => {
                let purged = self.store.purge_deleted()?;
                info!(purged, "soft-deleted alarms purged");
                Ok(())
            }
            Command::Snooze(id) => self.snooze(id),
            Command::Disable(id) => self.disable(id),
            Command::RestoreTriggers => self.restore_triggers(),
            Command::Get { id, reply } => {
                let alarm = self.store.get(id);
                let found = alarm.as_ref().ok().cloned().flatten();
                let _ = reply.send(found);
                alarm.map(|_| ()).map_err(AlarmError::from)
            }
            Command::Flush(reply) => {
                let _ = reply.send(());
                Ok(())
            }
        }
    }

    fn create(&self, time: AlarmTime, days: DaySet) -> Result<(), AlarmError> {
        let existing = self
            .store
            .list_active()?
            .into_iter()
            .find(|alarm| alarm.matches(time, &days));

        let (alarm, merged) = match existing {
            Some(mut alarm) => {
                alarm.enabled = true;
                alarm.deleted = false;
                self.store.update(&alarm)?;
                (alarm, true)
            }
            None => {
                let mut alarm = Alarm::new(time, days);
                alarm.id = self.store.insert(alarm.clone())?;
                (alarm, false)
            }
        };

        self.arm(&alarm)?;
        if merged {
            info!(id = alarm.id, %time, "existing alarm re-enabled");
            self.messages.publish(MSG_UPDATED_EXISTING);
        } else {
            info!(id = alarm.id, %time, %days, "alarm created");
            self.messages.publish(format!("Alarm set for {time}"));
        }
        Ok(())
    }

    fn update(&self, id: AlarmId, time: AlarmTime, days: DaySet) -> Result<(), AlarmError> {
        let Some(mut alarm) = self.store.get(id)? else {
            return Ok(());
        };
        alarm.time = time;
        alarm.days = days;
        alarm.enabled = true;
        alarm.deleted = false;
        self.store.update(&alarm)?;
        self.arm(&alarm)?;
        info!(id, %time, %days, "alarm updated");
        Ok(())
    }

    fn toggle(&self, id: AlarmId) -> Result<(), AlarmError> {
        let Some(mut alarm) = self.live(id)? else {
            return Ok(());
        };
        alarm.enabled = !alarm.enabled;
        self.store.update(&alarm)?;
        if alarm.enabled {
            self.arm(&alarm)?;
            info!(id, "alarm switched on");
        } else {
            self.scheduler.disarm(id)?;
            info!(id, "alarm switched off");
        }
        Ok(())
    }

    fn soft_delete(&self, id: AlarmId) -> Result<(), AlarmError> {
        let Some(snapshot) = self.store.get(id)? else {
            return Ok(());
        };
        if snapshot.deleted {
            return Ok(());
        }
        self.scheduler.disarm(id)?;
        let mut deleted = snapshot.clone();
        deleted.deleted = true;
        self.store.update(&deleted)?;
        info!(id, "alarm marked deleted");
        self.messages
            .publish_with_action(MSG_DELETED, MSG_UNDO, SnackbarAction::UndoDelete(snapshot));
        Ok(())
    }

    fn undo_delete(&self, snapshot: Alarm) -> Result<(), AlarmError> {
        if self.store.get(snapshot.id)?.is_none() {
            return Ok(());
        }
        let mut restored = snapshot;
        restored.deleted = false;
        self.store.update(&restored)?;
        if restored.enabled {
            self.arm(&restored)?;
        }
        info!(id = restored.id, enabled = restored.enabled, "alarm restored");
        Ok(())
    }

    fn snooze(&self, id: AlarmId) -> Result<(), AlarmError> {
        let Some(alarm) = self.live(id)? else {
            return Ok(());
        };
        let fire_at = self.clock.now() + self.snooze;
        let snoozed_time = AlarmTime::new(fire_at.hour(), fire_at.minute())?;

        let conflict = self
            .store
            .list_active()?
            .into_iter()
            .any(|other| other.id != id && other.time == snoozed_time);
        if conflict {
            info!(id, %snoozed_time, "snooze rejected, slot taken");
            self.messages.publish(format!(
                "Can't snooze: another alarm is already set for {snoozed_time}"
            ));
            return Ok(());
        }

        let mut snoozed = alarm;
        snoozed.time = snoozed_time;
        snoozed.enabled = true;
        self.store.update(&snoozed)?;
        self.scheduler.arm(TriggerRequest::new(id, &fire_at))?;
        info!(id, %snoozed_time, "alarm snoozed");
        Ok(())
    }

    fn disable(&self, id: AlarmId) -> Result<(), AlarmError> {
        let Some(mut alarm) = self.live(id)? else {
            return Ok(());
        };
        if alarm.is_recurring() {
            self.arm(&alarm)?;
            info!(id, "recurring alarm re-armed");
        } else {
            alarm.enabled = false;
            self.store.update(&alarm)?;
            self.scheduler.disarm(id)?;
            info!(id, "one-shot alarm switched off");
        }
        Ok(())
    }

    fn restore_triggers(&self) -> Result<(), AlarmError> {
        let enabled: Vec<Alarm> = self
            .store
            .list_active()?
            .into_iter()
            .filter(|alarm| alarm.enabled)
            .collect();
        for alarm in &enabled {
            self.arm(alarm)?;
        }
        info!(count = enabled.len(), "triggers restored");
        Ok(())
    }

    /// The stored row for `id` unless it is absent or sitting in the trash.
    fn live(&self, id: AlarmId) -> Result<Option<Alarm>, AlarmError> {
        Ok(self.store.get(id)?.filter(|alarm| !alarm.deleted))
    }

    fn arm(&self, alarm: &Alarm) -> Result<(), ScheduleError> {
        let fire_at = next_trigger(alarm.time, &alarm.days, &self.clock.now());
        let request = TriggerRequest::new(alarm.id, &fire_at);
        self.scheduler.arm(request)?;
        debug!(id = alarm.id, fire_at = %request.fire_at(), "trigger armed");
        Ok(())
    }

    fn report(&self, operation: &'static str, err: AlarmError) {
        match err {
            AlarmError::Schedule(ScheduleError::ExactAlarmDenied) => {
                warn!(operation, "exact alarm capability missing");
                self.messages.publish_with_action(
                    MSG_EXACT_DENIED,
                    MSG_SETTINGS,
                    SnackbarAction::OpenSettings(SettingsTarget::ExactAlarmSettings),
                );
            }
            err => {
                error!(operation, error = %err, "alarm operation failed");
                self.messages.publish(MSG_STORAGE_FAILED);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StoreError, StoreResult};
    use crate::messages::SnackbarMessage;
    use crate::schedule::ManualClock;
    use chrono::{DateTime, TimeZone, Utc};
    use tokio::sync::broadcast;

    struct Harness {
        service: AlarmService,
        table: Arc<AlarmTable>,
        scheduler: Arc<InMemoryScheduler>,
        clock: Arc<ManualClock>,
        inbox: broadcast::Receiver<SnackbarMessage>,
    }

    // 2025-06-02 is a Monday.
    fn monday(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, h, m, 0).unwrap()
    }

    fn time(h: u32, m: u32) -> AlarmTime {
        AlarmTime::new(h, m).unwrap()
    }

    fn harness(now: DateTime<Utc>) -> Harness {
        let table = Arc::new(AlarmTable::in_memory());
        let scheduler = Arc::new(InMemoryScheduler::new());
        let clock = Arc::new(ManualClock::new(now));
        let messages = MessageBus::new();
        let inbox = messages.subscribe();
        let service = AlarmService::builder()
            .with_store(table.clone())
            .with_scheduler(scheduler.clone())
            .with_messages(messages)
            .with_clock(clock.clone())
            .spawn();
        Harness {
            service,
            table,
            scheduler,
            clock,
            inbox,
        }
    }

    fn drain(inbox: &mut broadcast::Receiver<SnackbarMessage>) -> Vec<SnackbarMessage> {
        let mut out = Vec::new();
        while let Ok(message) = inbox.try_recv() {
            out.push(message);
        }
        out
    }

    impl Harness {
        async fn only_alarm(&self) -> Alarm {
            self.service.flush().await;
            let active = self.table.list_active().unwrap();
            assert_eq!(active.len(), 1, "expected exactly one active alarm");
            active[0].clone()
        }
    }

    #[tokio::test]
    async fn create_persists_and_arms_next_trigger() {
        let mut h = harness(monday(6, 0));
        h.service.create_alarm(time(7, 0), DaySet::EMPTY);
        let alarm = h.only_alarm().await;

        assert!(alarm.enabled && !alarm.deleted);
        let armed = h.scheduler.armed(alarm.id).expect("trigger armed");
        assert_eq!(armed.fire_at(), monday(7, 0));
        assert_eq!(drain(&mut h.inbox)[0].text, "Alarm set for 07:00");
    }

    #[tokio::test]
    async fn creating_same_alarm_twice_keeps_one_record() {
        let mut h = harness(monday(6, 0));
        let days = DaySet::parse("mon,wed").unwrap();
        h.service.create_alarm(time(7, 0), days);
        h.service.create_alarm(time(7, 0), DaySet::parse("wed,mon").unwrap());
        let alarm = h.only_alarm().await;

        assert_eq!(h.table.all().len(), 1);
        assert_eq!(h.scheduler.snapshot().len(), 1);
        let texts: Vec<String> = drain(&mut h.inbox).into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["Alarm set for 07:00".to_string(), MSG_UPDATED_EXISTING.to_string()]);
        assert_eq!(alarm.days, days);
    }

    #[tokio::test]
    async fn create_reenables_disabled_duplicate() {
        let h = harness(monday(6, 0));
        h.service.create_alarm(time(7, 0), DaySet::EMPTY);
        let alarm = h.only_alarm().await;
        h.service.toggle_alarm(&alarm);
        h.service.create_alarm(time(7, 0), DaySet::EMPTY);
        let again = h.only_alarm().await;

        assert_eq!(again.id, alarm.id);
        assert!(again.enabled);
        assert!(h.scheduler.armed(alarm.id).is_some());
    }

    #[tokio::test]
    async fn update_rewrites_time_and_rearms() {
        let h = harness(monday(6, 0));
        h.service.create_alarm(time(7, 0), DaySet::EMPTY);
        let alarm = h.only_alarm().await;
        h.service.toggle_alarm(&alarm);
        h.service
            .update_alarm(&alarm, time(5, 30), DaySet::parse("tue").unwrap());
        let updated = h.only_alarm().await;

        assert_eq!(updated.id, alarm.id);
        assert_eq!(updated.time, time(5, 30));
        assert!(updated.enabled);
        let armed = h.scheduler.armed(alarm.id).unwrap();
        assert_eq!(armed.fire_at(), Utc.with_ymd_and_hms(2025, 6, 3, 5, 30, 0).unwrap());
    }

    #[tokio::test]
    async fn toggling_twice_restores_state_and_trigger() {
        let h = harness(monday(6, 0));
        h.service.create_alarm(time(7, 0), DaySet::EMPTY);
        let alarm = h.only_alarm().await;
        let original = h.scheduler.armed(alarm.id).unwrap();

        h.service.toggle_alarm(&alarm);
        let off = h.only_alarm().await;
        assert!(!off.enabled);
        assert!(h.scheduler.armed(alarm.id).is_none());

        // Same stale snapshot on purpose: the worker reads the stored row.
        h.service.toggle_alarm(&alarm);
        let on = h.only_alarm().await;
        assert!(on.enabled);
        assert_eq!(h.scheduler.armed(alarm.id), Some(original));
    }

    #[tokio::test]
    async fn soft_delete_then_undo_restores_enabled_alarm() {
        let mut h = harness(monday(6, 0));
        h.service.create_alarm(time(7, 0), DaySet::EMPTY);
        let alarm = h.only_alarm().await;
        drain(&mut h.inbox);

        h.service.soft_delete_alarm(&alarm);
        h.service.flush().await;
        assert!(h.table.list_active().unwrap().is_empty());
        assert!(h.table.get(alarm.id).unwrap().unwrap().deleted);
        assert!(h.scheduler.armed(alarm.id).is_none());

        let notice = drain(&mut h.inbox).pop().expect("undo notice");
        assert_eq!(notice.text, MSG_DELETED);
        let action = notice.action.expect("undo action");
        assert_eq!(action, SnackbarAction::UndoDelete(alarm.clone()));

        h.service.perform(action);
        let restored = h.only_alarm().await;
        assert_eq!(restored, alarm);
        assert!(h.scheduler.armed(alarm.id).is_some());
    }

    #[tokio::test]
    async fn undo_keeps_disabled_alarm_disarmed() {
        let mut h = harness(monday(6, 0));
        h.service.create_alarm(time(7, 0), DaySet::EMPTY);
        let alarm = h.only_alarm().await;
        h.service.toggle_alarm(&alarm);
        h.service.soft_delete_alarm(&alarm);
        h.service.flush().await;

        let action = drain(&mut h.inbox)
            .into_iter()
            .find_map(|m| m.action)
            .expect("undo action");
        h.service.perform(action);
        let restored = h.only_alarm().await;
        assert!(!restored.enabled);
        assert!(h.scheduler.armed(alarm.id).is_none());
    }

    #[tokio::test]
    async fn purge_removes_only_soft_deleted_rows() {
        let h = harness(monday(6, 0));
        h.service.create_alarm(time(7, 0), DaySet::EMPTY);
        h.service.create_alarm(time(8, 0), DaySet::EMPTY);
        h.service.flush().await;
        let first = h.table.list_active().unwrap()[0].clone();
        h.service.soft_delete_alarm(&first);
        h.service.delete_all_deleted_alarms();
        h.service.flush().await;

        assert_eq!(h.table.all().len(), 1);
        assert!(h.table.get(first.id).unwrap().is_none());

        let remaining = h.only_alarm().await;
        h.service.hard_delete_alarm(&remaining);
        h.service.flush().await;
        assert!(h.table.all().is_empty());
        // Hard delete leaves scheduling to whoever cancelled the alarm.
        assert!(h.scheduler.armed(remaining.id).is_some());
    }

    #[tokio::test]
    async fn snooze_moves_alarm_five_minutes_ahead() {
        let h = harness(monday(7, 0));
        h.service.create_alarm(time(7, 0), DaySet::EMPTY);
        let alarm = h.only_alarm().await;
        h.clock.set(monday(7, 0) + Duration::seconds(20));

        let session = h.service.ring(alarm.id);
        session.snooze();
        let snoozed = h.only_alarm().await;

        assert_eq!(snoozed.time, time(7, 5));
        assert!(snoozed.enabled);
        let armed = h.scheduler.armed(alarm.id).unwrap();
        assert_eq!(armed.fire_at(), monday(7, 5) + Duration::seconds(20));
    }

    #[tokio::test]
    async fn snooze_conflict_changes_nothing() {
        let mut h = harness(monday(6, 0));
        h.service.create_alarm(time(7, 0), DaySet::EMPTY);
        h.service.create_alarm(time(7, 5), DaySet::parse("fri").unwrap());
        h.service.flush().await;
        let ringing = h.table.list_active().unwrap()[0].clone();
        h.clock.set(monday(7, 0));
        let rows_before = h.table.all();
        let triggers_before = h.scheduler.snapshot();
        drain(&mut h.inbox);

        h.service.snooze(ringing.id);
        h.service.flush().await;

        assert_eq!(h.table.all(), rows_before);
        assert_eq!(h.scheduler.snapshot(), triggers_before);
        let notices = drain(&mut h.inbox);
        assert_eq!(notices.len(), 1);
        assert!(notices[0].text.starts_with("Can't snooze"));
    }

    #[tokio::test]
    async fn snooze_of_unknown_alarm_is_silent() {
        let mut h = harness(monday(6, 0));
        h.service.snooze(99);
        h.service.disable_alarm(99);
        h.service.toggle_alarm(&Alarm::new(time(1, 0), DaySet::EMPTY));
        h.service.flush().await;
        assert!(h.table.all().is_empty());
        assert!(drain(&mut h.inbox).is_empty());
    }

    #[tokio::test]
    async fn trashed_alarm_ignores_ring_toggle_and_snooze() {
        let mut h = harness(monday(6, 0));
        h.service
            .create_alarm(time(7, 0), DaySet::parse("mon").unwrap());
        let alarm = h.only_alarm().await;
        h.service.soft_delete_alarm(&alarm);
        h.service.flush().await;
        let trashed = h.table.get(alarm.id).unwrap().unwrap();
        drain(&mut h.inbox);

        h.clock.set(monday(7, 0));
        h.service.disable_alarm(alarm.id);
        h.service.snooze(alarm.id);
        h.service.toggle_alarm(&alarm);
        h.service.flush().await;

        assert_eq!(h.table.get(alarm.id).unwrap().unwrap(), trashed);
        assert!(h.scheduler.armed(alarm.id).is_none());
        assert!(drain(&mut h.inbox).is_empty());
    }

    #[tokio::test]
    async fn dismissing_one_shot_switches_it_off() {
        let h = harness(monday(6, 0));
        h.service.create_alarm(time(7, 0), DaySet::EMPTY);
        let alarm = h.only_alarm().await;
        h.clock.set(monday(7, 0));

        h.service.ring(alarm.id).cancel();
        let dismissed = h.only_alarm().await;
        assert!(!dismissed.enabled);
        assert!(h.scheduler.armed(alarm.id).is_none());
    }

    #[tokio::test]
    async fn dismissing_recurring_rearms_next_weekday() {
        let h = harness(monday(6, 0));
        h.service
            .create_alarm(time(7, 0), DaySet::parse("mon,wed").unwrap());
        let alarm = h.only_alarm().await;
        assert_eq!(h.scheduler.armed(alarm.id).unwrap().fire_at(), monday(7, 0));

        h.clock.set(monday(7, 1));
        h.service.disable_alarm(alarm.id);
        let after = h.only_alarm().await;
        assert!(after.enabled);
        assert_eq!(
            h.scheduler.armed(alarm.id).unwrap().fire_at(),
            Utc.with_ymd_and_hms(2025, 6, 4, 7, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn missing_exact_alarm_capability_points_to_settings() {
        let mut h = harness(monday(6, 0));
        h.scheduler.deny_exact_alarms(true);
        h.service.create_alarm(time(7, 0), DaySet::EMPTY);
        h.service.flush().await;

        let notice = drain(&mut h.inbox).pop().expect("notice");
        assert_eq!(notice.text, MSG_EXACT_DENIED);
        assert_eq!(
            notice.action,
            Some(SnackbarAction::OpenSettings(SettingsTarget::ExactAlarmSettings))
        );
    }

    #[tokio::test]
    async fn restore_triggers_arms_enabled_alarms_only() {
        let h = harness(monday(6, 0));
        h.service.create_alarm(time(7, 0), DaySet::EMPTY);
        h.service.create_alarm(time(8, 0), DaySet::EMPTY);
        h.service.flush().await;
        let second = h.table.list_active().unwrap()[1].clone();
        h.service.toggle_alarm(&second);
        h.service.flush().await;

        let first = h.table.list_active().unwrap()[0].clone();
        let fresh = Arc::new(InMemoryScheduler::new());
        let rebooted = AlarmService::builder()
            .with_store(h.table.clone())
            .with_scheduler(fresh.clone())
            .with_clock(h.clock.clone())
            .spawn();
        rebooted.restore_triggers();
        rebooted.flush().await;

        assert_eq!(fresh.armed(first.id).unwrap().fire_at(), monday(7, 0));
        assert!(fresh.armed(second.id).is_none());
        assert!(!rebooted.get_alarm(second.id).await.unwrap().enabled);
    }

    struct BrokenStore;

    impl AlarmStore for BrokenStore {
        fn subscribe_active(&self) -> watch::Receiver<Vec<Alarm>> {
            watch::channel(Vec::new()).1
        }
        fn list_active(&self) -> StoreResult<Vec<Alarm>> {
            Err(StoreError::Unavailable("disk gone".into()))
        }
        fn get(&self, _id: AlarmId) -> StoreResult<Option<Alarm>> {
            Err(StoreError::Unavailable("disk gone".into()))
        }
        fn insert(&self, _alarm: Alarm) -> StoreResult<AlarmId> {
            Err(StoreError::Unavailable("disk gone".into()))
        }
        fn update(&self, _alarm: &Alarm) -> StoreResult<()> {
            Err(StoreError::Unavailable("disk gone".into()))
        }
        fn delete_by_id(&self, _id: AlarmId) -> StoreResult<()> {
            Err(StoreError::Unavailable("disk gone".into()))
        }
        fn purge_deleted(&self) -> StoreResult<usize> {
            Err(StoreError::Unavailable("disk gone".into()))
        }
    }

    #[tokio::test]
    async fn store_failures_become_generic_notices() {
        let messages = MessageBus::new();
        let mut inbox = messages.subscribe();
        let service = AlarmService::builder()
            .with_store(Arc::new(BrokenStore))
            .with_messages(messages)
            .spawn();

        service.create_alarm(time(7, 0), DaySet::EMPTY);
        service.delete_all_deleted_alarms();
        assert!(service.get_alarm(1).await.is_none());
        service.flush().await;

        let texts: Vec<String> = drain(&mut inbox).into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec![MSG_STORAGE_FAILED.to_string(); 3]);
    }
}
