use serde::{Deserialize, Serialize};

use crate::conflict::ConflictReport;
use crate::error::{ConfigError, ErrorKind};
use crate::model::WorkloadRecord;

pub const VALIDATION_OK: &str = "Deployment validation successful";
pub const VALIDATION_CONFLICT: &str = "Deployment would conflict with existing configuration";

/// Dry-run result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "ConflictReport::is_empty")]
    pub conflicts: ConflictReport,
}

impl ValidationOutcome {
    pub(crate) fn from_report(conflicts: ConflictReport) -> Self {
        if conflicts.is_empty() {
            Self {
                valid: true,
                message: VALIDATION_OK.to_string(),
                conflicts,
            }
        } else {
            Self {
                valid: false,
                message: VALIDATION_CONFLICT.to_string(),
                conflicts,
            }
        }
    }
}

/// Successful deployment or update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deployment {
    pub workload: WorkloadRecord,
    /// Steps skipped because the backend does not implement them.
    pub warnings: Vec<String>,
    /// Follow-up work the operator has to do by hand.
    pub notes: Vec<String>,
}

/// Successful removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Removal {
    pub name: String,
    pub deleted: Vec<String>,
    pub warnings: Vec<String>,
}

/// Wire shape returned for deploy and update requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<ConflictReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload: Option<WorkloadRecord>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl DeploymentResponse {
    pub fn from_result(result: &Result<Deployment, ConfigError>) -> Self {
        match result {
            Ok(done) => Self {
                success: true,
                message: format!("Workload '{}' deployed", done.workload.name()),
                error: None,
                conflicts: None,
                workload: Some(done.workload.clone()),
                warnings: done.warnings.clone(),
                notes: done.notes.clone(),
            },
            Err(err) => Self {
                success: false,
                message: match err.conflicts() {
                    Some(_) => VALIDATION_CONFLICT.to_string(),
                    None => err.to_string(),
                },
                error: Some(err.kind()),
                conflicts: err.conflicts().cloned(),
                workload: None,
                warnings: Vec::new(),
                notes: Vec::new(),
            },
        }
    }
}
