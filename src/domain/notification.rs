//! Outbound registry notifications for external controllers.

use serde::Serialize;
use utoipa::ToSchema;

use super::RegistrySnapshot;

/// Message type tag of a [`Notification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// Full registry state.
    Register,
}

/// Why a [`Notification`] was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum NotificationOrigin {
    /// Sent once when the core starts, and to each controller on connect.
    Initialization,
    /// Sent after every registry change.
    OnUpdate,
}

/// `{ "type": "register", "origin": ..., "data": RegistrySnapshot }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Notification {
    /// Always [`NotificationKind::Register`].
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Trigger of this notification.
    pub origin: NotificationOrigin,
    /// Registry state at the time of the trigger.
    pub data: RegistrySnapshot,
}

impl Notification {
    /// Builds a `register` notification.
    #[must_use]
    pub const fn register(origin: NotificationOrigin, data: RegistrySnapshot) -> Self {
        Self {
            kind: NotificationKind::Register,
            origin,
            data,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::GlobalPlugState;

    #[test]
    fn serializes_wire_shape() {
        let notification = Notification::register(
            NotificationOrigin::OnUpdate,
            RegistrySnapshot {
                global_state: GlobalPlugState::None,
                sockets: Vec::new(),
            },
        );
        let Ok(json) = serde_json::to_value(&notification) else {
            panic!("notification serializes");
        };
        assert_eq!(
            json,
            serde_json::json!({
                "type": "register",
                "origin": "onUpdate",
                "data": { "globalState": "none", "sockets": [] }
            })
        );
    }
}
