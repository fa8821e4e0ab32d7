use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::alarm::Alarm;

/// Platform settings screens a message or requirement can send the user to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingsTarget {
    NotificationSettings,
    ExactAlarmSettings,
    BatteryOptimization,
    VendorPermissions,
    AppDetails,
}

/// What happens when the user taps a message's action button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnackbarAction {
    /// Restore the alarm exactly as it was before it was soft-deleted.
    UndoDelete(Alarm),
    OpenSettings(SettingsTarget),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnackbarMessage {
    pub text: String,
    pub action_label: Option<String>,
    pub action: Option<SnackbarAction>,
}

impl SnackbarMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            action_label: None,
            action: None,
        }
    }

    pub fn with_action(text: impl Into<String>, label: impl Into<String>, action: SnackbarAction) -> Self {
        Self {
            text: text.into(),
            action_label: Some(label.into()),
            action: Some(action),
        }
    }
}

const BUS_CAPACITY: usize = 32;

/// Fan-out of transient user notices. Nothing is queued for absent listeners: a message
/// published while nobody is subscribed is gone, and new subscribers never see old messages.
#[derive(Debug, Clone)]
pub struct MessageBus {
    sender: broadcast::Sender<SnackbarMessage>,
}

impl MessageBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, text: impl Into<String>) {
        self.emit(SnackbarMessage::text(text));
    }

    pub fn publish_with_action(&self, text: impl Into<String>, label: impl Into<String>, action: SnackbarAction) {
        self.emit(SnackbarMessage::with_action(text, label, action));
    }

    pub fn emit(&self, message: SnackbarMessage) {
        if self.sender.send(message).is_err() {
            trace!("message dropped, no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SnackbarMessage> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
