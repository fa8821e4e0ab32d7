//! Host-side stand-ins for the phone platform: capabilities come from configuration and settings
//! screens are only logged.

use alarm_core::{PlatformCapabilities, SettingsLauncher, SettingsTarget};
use tracing::info;

use crate::config::AppConfig;

#[derive(Debug, Clone)]
pub struct DesktopPlatform {
    version: u32,
    manufacturer: String,
}

impl DesktopPlatform {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            version: config.platform_version,
            manufacturer: config.manufacturer.clone(),
        }
    }
}

impl PlatformCapabilities for DesktopPlatform {
    fn platform_version(&self) -> u32 {
        self.version
    }

    fn manufacturer(&self) -> String {
        self.manufacturer.clone()
    }

    fn notifications_granted(&self) -> bool {
        true
    }

    fn can_schedule_exact_alarms(&self) -> bool {
        true
    }

    fn ignoring_battery_optimizations(&self) -> bool {
        true
    }
}

#[derive(Debug, Default)]
pub struct LoggingLauncher;

impl SettingsLauncher for LoggingLauncher {
    fn open_settings(&self, target: SettingsTarget) {
        info!(?target, "settings screen requested");
    }

    fn request_permission(&self, permission: &str) {
        info!(permission, "permission prompt requested");
    }
}
