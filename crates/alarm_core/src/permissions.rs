//! Platform capabilities the app depends on, flattened into a list the onboarding screen can
//! render and gate on.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use crate::messages::SettingsTarget;

pub const PLATFORM_BASE: u32 = 1;
/// First platform level that gates exact alarms behind a user grant.
pub const PLATFORM_EXACT_ALARM_GATE: u32 = 31;
/// First platform level that requires a runtime grant to post notifications.
pub const PLATFORM_NOTIFICATION_GATE: u32 = 33;

pub const POST_NOTIFICATIONS: &str = "android.permission.POST_NOTIFICATIONS";

pub const NOTIFICATIONS: &str = "notifications";
pub const EXACT_ALARM: &str = "exact_alarm";
pub const BATTERY: &str = "battery";
pub const MIUI_LOCK_SCREEN: &str = "miui_lock_screen";
pub const MIUI_BACKGROUND_START: &str = "miui_bg_start";

const MIUI_OP_LOCK_SCREEN: u32 = 10020;
const MIUI_OP_BACKGROUND_START: u32 = 10021;

/// Live answers from the host platform.
pub trait PlatformCapabilities: Send + Sync {
    fn platform_version(&self) -> u32;
    fn manufacturer(&self) -> String;
    fn notifications_granted(&self) -> bool;
    fn should_show_notification_rationale(&self) -> bool {
        false
    }
    fn can_schedule_exact_alarms(&self) -> bool;
    fn ignoring_battery_optimizations(&self) -> bool;
    /// Vendor-specific app-op check. `None` when the platform cannot answer.
    fn check_vendor_op(&self, _op: u32) -> Option<bool> {
        None
    }
}

/// Opens settings screens and system permission prompts.
pub trait SettingsLauncher: Send + Sync {
    fn open_settings(&self, target: SettingsTarget);
    fn request_permission(&self, permission: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequirementAction {
    /// Prompt for the notification permission, or fall back to its settings screen.
    Notifications,
    Open(SettingsTarget),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRequirement {
    pub id: String,
    pub title: String,
    pub description: String,
    pub permission: Option<String>,
    pub min_platform: u32,
    pub granted: bool,
    pub action: RequirementAction,
}

impl PermissionRequirement {
    fn new(id: &str, title: &str, description: &str, action: RequirementAction, granted: bool) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            permission: None,
            min_platform: PLATFORM_BASE,
            granted,
            action,
        }
    }

    fn since(mut self, platform: u32) -> Self {
        self.min_platform = platform;
        self
    }

    fn permission(mut self, permission: &str) -> Self {
        self.permission = Some(permission.to_string());
        self
    }

    /// Battery exemption is best effort; everything else blocks.
    pub fn is_critical(&self) -> bool {
        self.id != BATTERY
    }
}

/// Extra requirements a manufacturer's firmware imposes.
pub trait VendorProbe: Send + Sync {
    fn requirements(&self, platform: &dyn PlatformCapabilities) -> Vec<PermissionRequirement>;
}

#[derive(Debug, Default)]
pub struct NoVendorProbe;

impl VendorProbe for NoVendorProbe {
    fn requirements(&self, _platform: &dyn PlatformCapabilities) -> Vec<PermissionRequirement> {
        Vec::new()
    }
}

/// MIUI hides lock-screen display and background activity starts behind its own app-ops.
#[derive(Debug, Default)]
pub struct XiaomiProbe;

impl VendorProbe for XiaomiProbe {
    fn requirements(&self, platform: &dyn PlatformCapabilities) -> Vec<PermissionRequirement> {
        let op = |code| platform.check_vendor_op(code).unwrap_or(false);
        vec![
            PermissionRequirement::new(
                MIUI_LOCK_SCREEN,
                "Lock screen (Xiaomi)",
                "Allow \"Show on lock screen\"",
                RequirementAction::Open(SettingsTarget::VendorPermissions),
                op(MIUI_OP_LOCK_SCREEN),
            ),
            PermissionRequirement::new(
                MIUI_BACKGROUND_START,
                "Background start (Xiaomi)",
                "Allow \"Display pop-up windows while running in the background\"",
                RequirementAction::Open(SettingsTarget::VendorPermissions),
                op(MIUI_OP_BACKGROUND_START),
            ),
        ]
    }
}

pub fn vendor_probe_for(manufacturer: &str) -> Box<dyn VendorProbe> {
    if manufacturer.trim().eq_ignore_ascii_case("xiaomi") {
        Box::new(XiaomiProbe)
    } else {
        Box::new(NoVendorProbe)
    }
}

pub struct PermissionState {
    platform: Arc<dyn PlatformCapabilities>,
    launcher: Arc<dyn SettingsLauncher>,
    vendor: Box<dyn VendorProbe>,
    notification_prompts: AtomicU32,
    requirements: watch::Sender<Vec<PermissionRequirement>>,
}

impl PermissionState {
    /// Picks the vendor probe from the reported manufacturer and computes the first list.
    pub fn new(platform: Arc<dyn PlatformCapabilities>, launcher: Arc<dyn SettingsLauncher>) -> Self {
        let vendor = vendor_probe_for(&platform.manufacturer());
        let initial = fetch_requirements(platform.as_ref(), vendor.as_ref());
        let (requirements, _) = watch::channel(initial);
        Self {
            platform,
            launcher,
            vendor,
            notification_prompts: AtomicU32::new(0),
            requirements,
        }
    }

    pub fn with_vendor_probe(mut self, vendor: Box<dyn VendorProbe>) -> Self {
        self.vendor = vendor;
        self.refresh();
        self
    }

    /// Re-queries the platform and swaps in the new list as a whole.
    pub fn refresh(&self) {
        let fresh = fetch_requirements(self.platform.as_ref(), self.vendor.as_ref());
        debug!(
            total = fresh.len(),
            missing = fresh.iter().filter(|r| !r.granted).count(),
            "permission requirements refreshed"
        );
        self.requirements.send_replace(fresh);
    }

    pub fn requirements(&self) -> Vec<PermissionRequirement> {
        self.requirements.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<PermissionRequirement>> {
        self.requirements.subscribe()
    }

    /// Asks the platform directly rather than trusting the last published list.
    pub fn is_all_critical_granted(&self) -> bool {
        fetch_requirements(self.platform.as_ref(), self.vendor.as_ref())
            .iter()
            .filter(|requirement| requirement.is_critical())
            .all(|requirement| requirement.granted)
    }

    /// Runs the action for requirement `id`. Returns `false` for an unknown id.
    pub fn resolve(&self, id: &str) -> bool {
        let Some(requirement) = self
            .requirements
            .borrow()
            .iter()
            .find(|requirement| requirement.id == id)
            .cloned()
        else {
            return false;
        };

        match requirement.action {
            RequirementAction::Open(target) => self.launcher.open_settings(target),
            RequirementAction::Notifications => self.resolve_notifications(&requirement),
        }
        true
    }

    fn resolve_notifications(&self, requirement: &PermissionRequirement) {
        let granted = self.platform.notifications_granted();
        let permission = requirement.permission.as_deref().unwrap_or(POST_NOTIFICATIONS);
        if granted {
            self.launcher.open_settings(SettingsTarget::NotificationSettings);
            return;
        }
        // The system prompt only appears while the platform still allows asking.
        let first_ask = self.notification_prompts.load(Ordering::SeqCst) == 0;
        if self.platform.should_show_notification_rationale() || first_ask {
            self.notification_prompts.fetch_add(1, Ordering::SeqCst);
            self.launcher.request_permission(permission);
        } else {
            self.launcher.open_settings(SettingsTarget::NotificationSettings);
        }
    }
}

fn fetch_requirements(platform: &dyn PlatformCapabilities, vendor: &dyn VendorProbe) -> Vec<PermissionRequirement> {
    let version = platform.platform_version();
    let mut list = Vec::new();

    if version >= PLATFORM_NOTIFICATION_GATE {
        list.push(
            PermissionRequirement::new(
                NOTIFICATIONS,
                "Notifications",
                "Shows the ringing alarm in the notification shade",
                RequirementAction::Notifications,
                platform.notifications_granted(),
            )
            .permission(POST_NOTIFICATIONS)
            .since(PLATFORM_NOTIFICATION_GATE),
        );
    }

    if version >= PLATFORM_EXACT_ALARM_GATE {
        list.push(
            PermissionRequirement::new(
                EXACT_ALARM,
                "Exact alarms",
                "Makes sure alarms ring on time",
                RequirementAction::Open(SettingsTarget::ExactAlarmSettings),
                platform.can_schedule_exact_alarms(),
            )
            .since(PLATFORM_EXACT_ALARM_GATE),
        );
    }

    list.push(PermissionRequirement::new(
        BATTERY,
        "Background work",
        "Keeps the alarm from being put to sleep overnight",
        RequirementAction::Open(SettingsTarget::BatteryOptimization),
        platform.ignoring_battery_optimizations(),
    ));

    list.extend(vendor.requirements(platform));
    list
}
