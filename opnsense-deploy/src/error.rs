//! Error taxonomy shared by the backends, the configuration service and the
//! deployment orchestrator.
//!
//! Every failure carries a machine-readable [`ErrorKind`] alongside its message.
//! Conflict failures additionally carry the category-keyed report so callers can
//! point at the exact field that collided.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::conflict::ConflictReport;
use crate::model::ResourceKind;
use crate::runtime::RuntimeError;
use crate::store::StoreError;

/// Machine-readable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationFailed,
    AlreadyExists,
    NotFound,
    BackendUnavailable,
    RemoteRejected,
    NotConfigured,
    ConflictDetected,
    NotImplementedOnBackend,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ValidationFailed => "validation_failed",
            Self::AlreadyExists => "already_exists",
            Self::NotFound => "not_found",
            Self::BackendUnavailable => "backend_unavailable",
            Self::RemoteRejected => "remote_rejected",
            Self::NotConfigured => "not_configured",
            Self::ConflictDetected => "conflict_detected",
            Self::NotImplementedOnBackend => "not_implemented_on_backend",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Input failed a shape or range check.
    #[error("invalid {field}: {reason}")]
    ValidationFailed { field: String, reason: String },

    /// A resource with the same logical key is already present.
    #[error("{kind} '{key}' already exists")]
    AlreadyExists { kind: ResourceKind, key: String },

    #[error("{kind} '{key}' not found")]
    NotFound { kind: ResourceKind, key: String },

    /// Transport failure, timeout, or unreadable local storage.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The remote API answered but reported failure.
    #[error("remote rejected request: {message}")]
    RemoteRejected { message: String },

    #[error("no configuration backend is configured (set a document path or API credentials)")]
    NotConfigured,

    #[error("deployment conflicts with existing configuration: {0}")]
    ConflictDetected(ConflictReport),

    #[error("{operation} is not implemented on the {backend} backend")]
    NotImplementedOnBackend {
        backend: &'static str,
        operation: &'static str,
    },

    #[error("failed to read configuration document {path}: {source}")]
    DocumentRead {
        path: String,
        source: xml_tree_core::ParseError,
    },

    #[error("failed to save configuration document {path}: {source}")]
    DocumentWrite {
        path: String,
        source: xml_tree_core::WriteError,
    },

    #[error("failed to back up configuration document {path}: {source}")]
    DocumentBackup {
        path: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl ConfigError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ValidationFailed {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(kind: ResourceKind, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }

    pub fn already_exists(kind: ResourceKind, key: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind,
            key: key.into(),
        }
    }

    pub fn not_implemented(backend: &'static str, operation: &'static str) -> Self {
        Self::NotImplementedOnBackend { backend, operation }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ValidationFailed { .. } => ErrorKind::ValidationFailed,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::RemoteRejected { .. } => ErrorKind::RemoteRejected,
            Self::NotConfigured => ErrorKind::NotConfigured,
            Self::ConflictDetected(_) => ErrorKind::ConflictDetected,
            Self::NotImplementedOnBackend { .. } => ErrorKind::NotImplementedOnBackend,
            Self::Runtime(RuntimeError::NotFound(_)) => ErrorKind::NotFound,
            Self::Runtime(RuntimeError::Rejected { .. }) => ErrorKind::RemoteRejected,
            Self::BackendUnavailable(_)
            | Self::DocumentRead { .. }
            | Self::DocumentWrite { .. }
            | Self::DocumentBackup { .. }
            | Self::Store(_)
            | Self::Runtime(_) => ErrorKind::BackendUnavailable,
        }
    }

    /// Only a missing backend capability may be skipped by the orchestrator.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotImplementedOnBackend { .. })
    }

    /// The conflict report carried by [`ConfigError::ConflictDetected`].
    pub fn conflicts(&self) -> Option<&ConflictReport> {
        match self {
            Self::ConflictDetected(report) => Some(report),
            _ => None,
        }
    }
}

pub type Result<T, E = ConfigError> = std::result::Result<T, E>;
