//! Command endpoint DTOs.

use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::BulkPlugReport;

/// Response body for `POST /api/v1/commands`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CommandResponse {
    /// `false` when the command was discarded by the router.
    pub applied: bool,
    /// Bulk plug report for applied `setPlugged` commands.
    pub report: Option<BulkPlugReport>,
}

impl From<Option<BulkPlugReport>> for CommandResponse {
    fn from(report: Option<BulkPlugReport>) -> Self {
        Self {
            applied: report.is_some(),
            report,
        }
    }
}
