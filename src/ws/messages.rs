//! Control socket replies.
//!
//! Notifications travel in their own `{type: "register", ...}` shape; this
//! envelope only answers commands sent over the control socket.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::BulkPlugReport;
use crate::error::GatewayError;

/// Reply to one control-socket frame.
#[derive(Debug, Clone, Serialize)]
pub struct ControlReply {
    /// Reply type discriminator.
    #[serde(rename = "type")]
    pub msg_type: ControlReplyType,
    /// ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    pub payload: serde_json::Value,
}

/// Discriminator for [`ControlReply`].
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ControlReplyType {
    /// The command was decoded and routed.
    Response,
    /// The frame could not be handled.
    Error,
}

impl ControlReply {
    /// Reply for a routed command; `report` is `None` when it was ignored.
    #[must_use]
    pub fn routed(report: Option<BulkPlugReport>) -> Self {
        Self {
            msg_type: ControlReplyType::Response,
            timestamp: Utc::now(),
            payload: serde_json::json!({
                "applied": report.is_some(),
                "report": report,
            }),
        }
    }

    /// Error reply carrying the gateway error code and message.
    #[must_use]
    pub fn error(err: &GatewayError) -> Self {
        Self {
            msg_type: ControlReplyType::Error,
            timestamp: Utc::now(),
            payload: serde_json::json!({
                "code": err.error_code(),
                "message": err.to_string(),
            }),
        }
    }

    /// Serializes the reply for a text frame.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
