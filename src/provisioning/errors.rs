//! # Provisioning Errors
//!
//! Error types for principal and tenancy provisioning runs.

use serde::Serialize;
use thiserror::Error;

use super::compiler::Diagnostic;
use crate::connection::{ConnectionError, ConnectionResult};

/// Result type for provisioning operations
pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Broad error category, one process exit code each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Configuration,
    Connectivity,
    Precondition,
    LengthViolation,
    Server,
    ArtifactInvalid,
    PostCondition,
    Cancelled,
}

/// Provisioning error types
#[derive(Debug, Clone, Error)]
pub enum ProvisionError {
    /// Missing or malformed configuration
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Connection could not be established or was lost
    #[error("Connectivity error: {message}")]
    Connectivity { message: String },

    /// The session is not operating in the root container
    #[error("Not connected to the root container (current container: {container})")]
    NotRootContainer { container: String },

    /// Switching containers did not land where requested
    #[error("Container mismatch: expected {expected}, session reports {actual}")]
    ContainerMismatch { expected: String, actual: String },

    /// A storage directory query returned nothing usable
    #[error("Cannot determine the {what}")]
    PathUndetermined { what: &'static str },

    /// Derived and reported seed directories disagree
    #[error("Seed directory mismatch: expected {expected}, server reports {actual}")]
    PathMismatch { expected: String, actual: String },

    /// Generated tenancy name already exists
    #[error("Name collision: {name} already exists (after {attempts} attempt(s))")]
    NameCollision { name: String, attempts: u32 },

    /// Sanitization produced an unusable identifier
    #[error("Invalid identifier derived from '{input}'")]
    InvalidIdentifier { input: String },

    /// Identifier could not be shortened enough
    #[error("Identifier {identifier} is too long: {message}")]
    IdentifierTooLong { identifier: String, message: String },

    /// Unclassified server error at a named step
    #[error("{step} failed: {message}")]
    Server { step: String, message: String },

    /// The compiled object is missing from the catalog
    #[error("Artifact {owner}.{name} not found after compilation")]
    ArtifactNotFound { owner: String, name: String },

    /// The compiled object is INVALID
    #[error("Artifact {name} is INVALID ({} diagnostic(s))", diagnostics.len())]
    ArtifactInvalid {
        name: String,
        diagnostics: Vec<Diagnostic>,
    },

    /// Smoke test query failed or returned nothing
    #[error("Smoke test for {name} failed: {message}")]
    SmokeTestFailed { name: String, message: String },

    /// Open mode confirmation failed
    #[error("Activation of {name} not confirmed (open mode: {})", open_mode.as_deref().unwrap_or("none"))]
    ActivationNotConfirmed {
        name: String,
        open_mode: Option<String>,
    },

    /// Drop accepted but the object is still present
    #[error("Drop not confirmed: {name} still present ({remaining} row(s))")]
    DropNotConfirmed { name: String, remaining: i64 },

    /// Lifecycle operation called from the wrong state
    #[error("Cannot {operation} from state {state}")]
    InvalidTransition {
        state: String,
        operation: &'static str,
    },

    /// The run was cancelled
    #[error("Run cancelled")]
    Cancelled,
}

impl ProvisionError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Wrap a connection error raised while executing `step`
    pub fn at_step(step: &str, err: ConnectionError) -> Self {
        if err.is_connectivity() {
            Self::Connectivity {
                message: err.to_string(),
            }
        } else {
            Self::Server {
                step: step.to_string(),
                message: err.to_string(),
            }
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config { .. } => ErrorCategory::Configuration,
            Self::Connectivity { .. } => ErrorCategory::Connectivity,
            Self::NotRootContainer { .. }
            | Self::ContainerMismatch { .. }
            | Self::PathUndetermined { .. }
            | Self::PathMismatch { .. }
            | Self::NameCollision { .. }
            | Self::InvalidIdentifier { .. }
            | Self::InvalidTransition { .. } => ErrorCategory::Precondition,
            Self::IdentifierTooLong { .. } => ErrorCategory::LengthViolation,
            Self::Server { .. } => ErrorCategory::Server,
            Self::ArtifactNotFound { .. }
            | Self::ArtifactInvalid { .. }
            | Self::SmokeTestFailed { .. } => ErrorCategory::ArtifactInvalid,
            Self::ActivationNotConfirmed { .. } | Self::DropNotConfirmed { .. } => {
                ErrorCategory::PostCondition
            }
            Self::Cancelled => ErrorCategory::Cancelled,
        }
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self.category() {
            ErrorCategory::Configuration => 2,
            ErrorCategory::Connectivity => 3,
            ErrorCategory::Precondition => 4,
            ErrorCategory::LengthViolation => 5,
            ErrorCategory::Server => 6,
            ErrorCategory::ArtifactInvalid => 7,
            ErrorCategory::PostCondition => 8,
            ErrorCategory::Cancelled => 9,
        }
    }

    /// Stable code for reports
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Connectivity { .. } => "CONNECTIVITY_ERROR",
            Self::NotRootContainer { .. } => "NOT_ROOT_CONTAINER",
            Self::ContainerMismatch { .. } => "CONTAINER_MISMATCH",
            Self::PathUndetermined { .. } => "PATH_UNDETERMINED",
            Self::PathMismatch { .. } => "PATH_MISMATCH",
            Self::NameCollision { .. } => "NAME_COLLISION",
            Self::InvalidIdentifier { .. } => "INVALID_IDENTIFIER",
            Self::IdentifierTooLong { .. } => "IDENTIFIER_TOO_LONG",
            Self::Server { .. } => "SERVER_ERROR",
            Self::ArtifactNotFound { .. } => "ARTIFACT_NOT_FOUND",
            Self::ArtifactInvalid { .. } => "ARTIFACT_INVALID",
            Self::SmokeTestFailed { .. } => "SMOKE_TEST_FAILED",
            Self::ActivationNotConfirmed { .. } => "ACTIVATION_NOT_CONFIRMED",
            Self::DropNotConfirmed { .. } => "DROP_NOT_CONFIRMED",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::Cancelled => "CANCELLED",
        }
    }
}

/// Attach the failing step to connection errors
pub trait StepContext<T> {
    fn step(self, step: &str) -> ProvisionResult<T>;
}

impl<T> StepContext<T> for ConnectionResult<T> {
    fn step(self, step: &str) -> ProvisionResult<T> {
        self.map_err(|e| ProvisionError::at_step(step, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_and_nonzero() {
        let errors = [
            ProvisionError::config("bad"),
            ProvisionError::Connectivity {
                message: "down".to_string(),
            },
            ProvisionError::PathMismatch {
                expected: "a".to_string(),
                actual: "b".to_string(),
            },
            ProvisionError::IdentifierTooLong {
                identifier: "X".to_string(),
                message: "ORA-00972".to_string(),
            },
            ProvisionError::Server {
                step: "create".to_string(),
                message: "ORA-01031".to_string(),
            },
            ProvisionError::ArtifactInvalid {
                name: "F".to_string(),
                diagnostics: Vec::new(),
            },
            ProvisionError::DropNotConfirmed {
                name: "P".to_string(),
                remaining: 1,
            },
            ProvisionError::Cancelled,
        ];

        let mut codes: Vec<i32> = errors.iter().map(|e| e.exit_code()).collect();
        assert!(codes.iter().all(|c| *c > 1));
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_at_step_keeps_server_text() {
        let err = ProvisionError::at_step(
            "open tenancy",
            ConnectionError::server("ORA-65019: pluggable database P already open"),
        );
        assert_eq!(err.category(), ErrorCategory::Server);
        assert_eq!(
            err.to_string(),
            "open tenancy failed: ORA-65019: pluggable database P already open"
        );
    }

    #[test]
    fn test_at_step_connectivity() {
        let err = ProvisionError::at_step("create user", ConnectionError::Closed);
        assert_eq!(err.category(), ErrorCategory::Connectivity);
        assert_eq!(err.error_code(), "CONNECTIVITY_ERROR");
    }

    #[test]
    fn test_drop_not_confirmed_is_post_condition() {
        let err = ProvisionError::DropNotConfirmed {
            name: "PDB_X".to_string(),
            remaining: 1,
        };
        assert_eq!(err.category(), ErrorCategory::PostCondition);
        assert!(err.to_string().contains("Drop not confirmed"));
    }
}
