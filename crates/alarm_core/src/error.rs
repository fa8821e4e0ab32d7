use thiserror::Error;

use crate::alarm::AlarmId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidTime {
    #[error("{hour:02}:{minute:02} is not a valid time of day")]
    OutOfRange { hour: u32, minute: u32 },
    #[error("`{0}` is not a HH:MM time")]
    Unparseable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown weekday `{0}`")]
pub struct InvalidDays(pub String);

/// Failures of the persisted alarm table.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("alarm store unavailable: {0}")]
    Unavailable(String),
    #[error("alarm store i/o failed")]
    Io(#[from] std::io::Error),
    #[error("alarm store contents are corrupt")]
    Corrupt(#[from] serde_json::Error),
}

/// Failures reported by the platform wake-up scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// The platform refuses precise wake-ups until the user grants the capability.
    #[error("exact alarm scheduling is not permitted")]
    ExactAlarmDenied,
    #[error("platform scheduler rejected alarm {alarm_id}: {reason}")]
    Platform { alarm_id: AlarmId, reason: String },
}

#[derive(Debug, Error)]
pub enum AlarmError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    InvalidTime(#[from] InvalidTime),
}

pub type StoreResult<T> = Result<T, StoreError>;
