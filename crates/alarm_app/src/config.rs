use std::path::PathBuf;

use anyhow::Result;
use tracing::warn;

pub const DEFAULT_STORE_FILE: &str = "alarms.json";
pub const DEFAULT_PLATFORM_VERSION: u32 = 34;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub store_path: PathBuf,
    pub snooze_minutes: i64,
    pub manufacturer: String,
    pub platform_version: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self::from_lookup(|key| std::env::var(key).ok()))
    }

    /// Same rules as [`AppConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(path) = lookup("ALARMCLOCK_STORE") {
            if !path.trim().is_empty() {
                config.store_path = PathBuf::from(path.trim());
            }
        }
        if let Some(minutes) = lookup("ALARMCLOCK_SNOOZE_MINUTES") {
            match minutes.trim().parse::<i64>() {
                Ok(value) if value > 0 => config.snooze_minutes = value,
                _ => warn!(value = %minutes, "ignoring invalid ALARMCLOCK_SNOOZE_MINUTES"),
            }
        }
        if let Some(manufacturer) = lookup("ALARMCLOCK_MANUFACTURER") {
            config.manufacturer = manufacturer.trim().to_string();
        }
        if let Some(version) = lookup("ALARMCLOCK_PLATFORM_VERSION") {
            match version.trim().parse::<u32>() {
                Ok(value) => config.platform_version = value,
                Err(_) => warn!(value = %version, "ignoring invalid ALARMCLOCK_PLATFORM_VERSION"),
            }
        }
        config
    }

    /// Command-line flags win over the environment.
    pub fn with_overrides(mut self, overrides: &ConfigOverrides) -> Self {
        if let Some(path) = &overrides.store {
            self.store_path = path.clone();
        }
        if let Some(minutes) = overrides.snooze_minutes.filter(|m| *m > 0) {
            self.snooze_minutes = minutes;
        }
        if let Some(manufacturer) = &overrides.manufacturer {
            self.manufacturer = manufacturer.clone();
        }
        if let Some(version) = overrides.platform_version {
            self.platform_version = version;
        }
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from(DEFAULT_STORE_FILE),
            snooze_minutes: alarm_core::service::DEFAULT_SNOOZE_MINUTES,
            manufacturer: String::new(),
            platform_version: DEFAULT_PLATFORM_VERSION,
        }
    }
}

#[derive(Debug, Clone, Default, clap::Args)]
pub struct ConfigOverrides {
    /// Alarm table file.
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,
    /// Snooze length in minutes.
    #[arg(long, global = true)]
    pub snooze_minutes: Option<i64>,
    /// Device manufacturer reported to the permission checks.
    #[arg(long, global = true)]
    pub manufacturer: Option<String>,
    /// Platform API level reported to the permission checks.
    #[arg(long, global = true)]
    pub platform_version: Option<u32>,
}
