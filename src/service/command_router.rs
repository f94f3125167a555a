//! Decodes controller instructions into registry operations.

use std::rc::Rc;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{BulkPlugReport, ConnectionRegistry};

/// Scope addressing every live connection.
pub const SCOPE_ALL_CONNECTIONS: &str = "all-connections";
/// Scope reserved for per-connection commands.
pub const SCOPE_CONNECTION: &str = "connection";
/// Command toggling delivery.
pub const COMMAND_SET_PLUGGED: &str = "setPlugged";

/// Instruction sent by an external controller.
///
/// ```json
/// { "scope": "all-connections", "command": "setPlugged", "value": false }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CommandMessage {
    /// Target of the command.
    pub scope: String,
    /// Operation name.
    pub command: String,
    /// Operation argument.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub value: serde_json::Value,
}

impl CommandMessage {
    /// Builds the bulk `setPlugged` command.
    #[must_use]
    pub fn set_plugged_all(plug: bool) -> Self {
        Self {
            scope: SCOPE_ALL_CONNECTIONS.to_string(),
            command: COMMAND_SET_PLUGGED.to_string(),
            value: serde_json::Value::Bool(plug),
        }
    }

    /// Maps the raw message onto a supported operation.
    ///
    /// # Errors
    ///
    /// - [`RouteError::Unsupported`] for the reserved per-connection scope.
    /// - [`RouteError::InvalidValue`] when `setPlugged` has no boolean value.
    /// - [`RouteError::UnknownCommand`] for any other scope/command pair.
    pub fn decode(&self) -> Result<RoutedCommand, RouteError> {
        match (self.scope.as_str(), self.command.as_str()) {
            (SCOPE_ALL_CONNECTIONS, COMMAND_SET_PLUGGED) => self
                .value
                .as_bool()
                .map(RoutedCommand::SetPluggedAll)
                .ok_or_else(|| RouteError::InvalidValue {
                    command: self.command.clone(),
                    value: self.value.to_string(),
                }),
            (SCOPE_CONNECTION, _) => Err(RouteError::Unsupported {
                command: self.command.clone(),
            }),
            _ => Err(RouteError::UnknownCommand {
                scope: self.scope.clone(),
                command: self.command.clone(),
            }),
        }
    }
}

/// Operation decoded from a [`CommandMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutedCommand {
    /// Plug (`true`) or unplug (`false`) every live connection.
    SetPluggedAll(bool),
}

/// Why a [`CommandMessage`] was discarded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    /// No operation matches the scope/command pair.
    #[error("unknown command `{command}` for scope `{scope}`")]
    UnknownCommand {
        /// Scope as received.
        scope: String,
        /// Command as received.
        command: String,
    },

    /// The command exists but its value has the wrong type.
    #[error("command `{command}` expects a boolean value, got {value}")]
    InvalidValue {
        /// Command as received.
        command: String,
        /// Value as received (JSON).
        value: String,
    },

    /// Per-connection commands are not implemented.
    #[error("per-connection command `{command}` is not supported")]
    Unsupported {
        /// Command as received.
        command: String,
    },
}

/// Applies controller instructions to the registry.
///
/// Produces no events itself; effects surface as registry `update` events.
#[derive(Debug, Clone)]
pub struct CommandRouter {
    registry: Rc<ConnectionRegistry>,
}

impl CommandRouter {
    /// Creates a router bound to `registry`.
    #[must_use]
    pub fn new(registry: Rc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Executes `message`, returning the bulk report when it was applied.
    ///
    /// Unrecognized messages are logged and discarded.
    pub fn route(&self, message: &CommandMessage) -> Option<BulkPlugReport> {
        match message.decode() {
            Ok(RoutedCommand::SetPluggedAll(plug)) => Some(self.registry.set_plugged_all(plug)),
            Err(err) => {
                tracing::warn!(error = %err, scope = %message.scope, "command discarded");
                None
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::GlobalPlugState;
    use crate::domain::testing::open_recorded;

    fn parse(json: &str) -> CommandMessage {
        let Ok(message) = serde_json::from_str(json) else {
            panic!("command json parses");
        };
        message
    }

    #[test]
    fn set_plugged_false_unplugs_everything() {
        let registry = Rc::new(ConnectionRegistry::new());
        let (connection, _) = open_recorded(&registry);
        let router = CommandRouter::new(Rc::clone(&registry));

        let report = router.route(&parse(
            r#"{"scope":"all-connections","command":"setPlugged","value":false}"#,
        ));
        let Some(report) = report else {
            panic!("command should apply");
        };
        assert_eq!(report.was_plugged, 1);
        assert!(!connection.is_plugged());
        assert_eq!(registry.global_state(), GlobalPlugState::None);
    }

    #[test]
    fn unknown_pair_is_ignored() {
        let registry = Rc::new(ConnectionRegistry::new());
        let router = CommandRouter::new(Rc::clone(&registry));

        assert!(
            router
                .route(&parse(r#"{"scope":"all-connections","command":"reload"}"#))
                .is_none()
        );
        assert_eq!(registry.global_state(), GlobalPlugState::All);
    }

    #[test]
    fn per_connection_scope_is_reserved() {
        let message = parse(r#"{"scope":"connection","command":"setPlugged","value":true}"#);
        assert_eq!(
            message.decode(),
            Err(RouteError::Unsupported {
                command: "setPlugged".to_string()
            })
        );
    }

    #[test]
    fn non_boolean_value_rejected() {
        let message = parse(r#"{"scope":"all-connections","command":"setPlugged","value":"no"}"#);
        assert!(matches!(
            message.decode(),
            Err(RouteError::InvalidValue { .. })
        ));
    }

    #[test]
    fn builder_round_trips_through_decode() {
        assert_eq!(
            CommandMessage::set_plugged_all(true).decode(),
            Ok(RoutedCommand::SetPluggedAll(true))
        );
    }
}
