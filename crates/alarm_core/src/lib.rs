pub mod alarm;
pub mod error;
pub mod messages;
pub mod permissions;
pub mod ringing;
pub mod schedule;
pub mod service;
pub mod store;
pub mod trigger;

pub use crate::alarm::{Alarm, AlarmId, AlarmTime, DaySet};
pub use crate::error::{AlarmError, InvalidDays, InvalidTime, ScheduleError, StoreError};
pub use crate::messages::{MessageBus, SettingsTarget, SnackbarAction, SnackbarMessage};
pub use crate::permissions::{PermissionRequirement, PermissionState, PlatformCapabilities, SettingsLauncher};
pub use crate::ringing::RingSession;
pub use crate::schedule::{next_trigger, Clock, ManualClock, SystemClock};
pub use crate::service::{AlarmService, AlarmServiceBuilder};
pub use crate::store::{AlarmStore, AlarmTable};
pub use crate::trigger::{InMemoryScheduler, TriggerRequest, TriggerScheduler};
