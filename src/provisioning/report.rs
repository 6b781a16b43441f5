//! # Run Report
//!
//! Machine-readable summary of one run, written as JSON on request.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

use super::compiler::CompiledArtifact;
use super::context::RunContext;
use super::errors::{ErrorCategory, ProvisionError, ProvisionResult};
use super::grants::GrantBatchResult;
use super::paths::SeedPaths;
use super::principal::PrincipalOutcome;
use super::tenancy::{SavedState, TenancyLifecycle, TenancyState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    Principal,
    Tenancy,
    #[serde(rename = "check-seed")]
    CheckSeed,
}

/// Failure recorded in a report
#[derive(Debug, Clone, Serialize)]
pub struct ReportError {
    pub code: &'static str,
    pub category: ErrorCategory,
    pub message: String,
}

impl From<&ProvisionError> for ReportError {
    fn from(err: &ProvisionError) -> Self {
        Self {
            code: err.error_code(),
            category: err.category(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    pub run_id: Uuid,
    pub kind: RunKind,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub states: Vec<TenancyState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_paths: Option<SeedPaths>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_state: Option<SavedState>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub grants: Vec<GrantBatchResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<CompiledArtifact>,
    pub torn_down: bool,
    /// Created objects were removed by the rollback guard
    pub rolled_back: bool,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ReportError>,
}

impl ProvisionReport {
    pub fn new(ctx: &RunContext, kind: RunKind) -> Self {
        Self {
            run_id: ctx.run_id(),
            kind,
            started_at: Utc::now(),
            finished_at: None,
            object_name: None,
            database: None,
            container: None,
            states: Vec::new(),
            seed_paths: None,
            saved_state: None,
            grants: Vec::new(),
            artifacts: Vec::new(),
            torn_down: false,
            rolled_back: false,
            success: false,
            error: None,
        }
    }

    pub fn record_principal(&mut self, outcome: &PrincipalOutcome) {
        self.object_name = outcome.identifier.clone();
        self.database = outcome.database.clone();
        self.container = outcome.container.clone();
        self.grants = outcome.grants.clone();
        self.artifacts = outcome.artifacts.clone();
        self.torn_down = outcome.torn_down;
    }

    pub fn record_tenancy(&mut self, lifecycle: &TenancyLifecycle<'_>) {
        self.object_name = lifecycle.name().map(str::to_string);
        self.states = lifecycle.history().to_vec();
        self.seed_paths = lifecycle.paths().cloned();
        self.saved_state = lifecycle.saved_state().cloned();
        self.torn_down = lifecycle.state() == TenancyState::Dropped;
        self.rolled_back = lifecycle.rolled_back();
    }

    /// Stamp completion and the run's result
    pub fn finish<T>(&mut self, result: &ProvisionResult<T>) {
        self.finished_at = Some(Utc::now());
        self.success = result.is_ok();
        self.error = result.as_ref().err().map(ReportError::from);
    }

    pub fn to_json(&self) -> ProvisionResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ProvisionError::config(format!("cannot serialize report: {}", e)))
    }

    /// Write the report as pretty JSON
    pub fn write_to(&self, path: &Path) -> ProvisionResult<()> {
        std::fs::write(path, self.to_json()?).map_err(|e| {
            ProvisionError::config(format!("cannot write report {}: {}", path.display(), e))
        })
    }
}
