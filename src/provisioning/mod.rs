//! # Provisioning Module
//!
//! Creation, verification and teardown of ephemeral accounts (principals)
//! and pluggable databases (tenancies).
//!
//! ## Components
//!
//! - `identifier` + `ladder`: object names and the length-cap retry ladder
//! - `grants`: per-item tolerant grant batches
//! - `compiler`: artifact compilation with status and diagnostics
//! - `paths`: seed directory equivalence check
//! - `tenancy`: pluggable database lifecycle state machine
//! - `principal`: account provisioning run
//! - `guard`: rollback of half-provisioned objects
//!
//! Every run is sequential over a single connection. Cancellation is checked
//! between steps through `RunContext`.

pub mod compiler;
pub mod context;
pub mod errors;
pub mod grants;
pub mod guard;
pub mod identifier;
pub mod ladder;
pub mod names;
pub mod paths;
pub mod principal;
pub mod report;
pub mod reporter;
pub mod tenancy;

pub use compiler::{ArtifactCompiler, ArtifactKind, ArtifactStatus, CompileRequest, CompiledArtifact, Diagnostic};
pub use context::{CancelHandle, RunContext};
pub use errors::{ErrorCategory, ProvisionError, ProvisionResult};
pub use grants::{GrantApplier, GrantBatchResult, GrantKind, GrantScope};
pub use identifier::{sanitize, IdentifierLimits};
pub use ladder::{ErrorClass, ErrorClassifier, PatternClassifier, RetryLadder};
pub use names::{NameGenerator, SequenceNameGenerator, TimestampNameGenerator};
pub use paths::{PathVerifier, SeedLayout, SeedPaths};
pub use principal::{PrincipalRun, PrincipalSettings};
pub use report::{ProvisionReport, RunKind};
pub use reporter::{ConsoleReporter, Marker, RecordingReporter, Reporter};
pub use tenancy::{CollisionPolicy, TenancyLifecycle, TenancySettings, TenancyState};

use crate::connection::Connection;
use errors::StepContext;

/// Container name of the root administrative context
pub const ROOT_CONTAINER: &str = "CDB$ROOT";

const CON_NAME_SQL: &str = "SELECT SYS_CONTEXT('USERENV','CON_NAME') FROM dual";

/// Container the session currently operates in
pub fn current_container(conn: &dyn Connection) -> ProvisionResult<String> {
    let value = conn
        .query_scalar(CON_NAME_SQL, &[])
        .step("read current container")?;
    match value {
        Some(v) if !v.is_null() => Ok(v.to_string()),
        _ => Err(ProvisionError::Server {
            step: "read current container".to_string(),
            message: "no container reported".to_string(),
        }),
    }
}
