//! # Artifact Compiler
//!
//! Submits a compilable unit under an owner's schema, reads back its
//! validity from the catalog, and either smoke-tests it (VALID) or surfaces
//! its compile diagnostics (INVALID).

use serde::{Deserialize, Serialize};

use super::errors::{ProvisionError, ProvisionResult, StepContext};
use super::reporter::{Marker, Reporter};
use crate::connection::{Connection, Value};

const STATUS_SQL: &str = "SELECT status FROM all_objects \
     WHERE owner = :1 AND object_type = :2 AND UPPER(object_name) = :3";

const DIAGNOSTICS_SQL: &str = "SELECT line, position, text FROM all_errors \
     WHERE owner = :1 AND type = :2 AND UPPER(name) = :3 ORDER BY sequence";

/// Kind of server-side executable unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Function,
    Procedure,
    JavaSource,
}

impl ArtifactKind {
    /// Catalog object type
    pub fn object_type(&self) -> &'static str {
        match self {
            Self::Function => "FUNCTION",
            Self::Procedure => "PROCEDURE",
            Self::JavaSource => "JAVA SOURCE",
        }
    }
}

/// Validity reported by the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ArtifactStatus {
    Valid,
    Invalid,
}

/// One compile error entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub line: i64,
    pub position: i64,
    pub text: String,
}

/// A unit to compile
#[derive(Debug, Clone)]
pub struct CompileRequest {
    pub kind: ArtifactKind,
    pub name: String,
    /// Complete creation statement
    pub statement: String,
    /// Scalar query run once the unit is VALID
    pub smoke_test: Option<String>,
}

impl CompileRequest {
    /// Wrap a Java class body in its creation statement
    pub fn java_source(name: &str, source: &str) -> Self {
        Self {
            kind: ArtifactKind::JavaSource,
            name: name.to_string(),
            statement: format!(
                "CREATE OR REPLACE AND COMPILE JAVA SOURCE NAMED \"{}\" AS\n{}",
                name, source
            ),
            smoke_test: None,
        }
    }
}

/// Compiled artifact as recorded in the run report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledArtifact {
    pub name: String,
    pub kind: ArtifactKind,
    pub status: ArtifactStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smoke_test_result: Option<String>,
}

/// Append `;` unless the statement already ends with one
pub fn ensure_terminated(statement: &str) -> String {
    let trimmed = statement.trim_end();
    if trimmed.ends_with(';') {
        trimmed.to_string()
    } else {
        format!("{};", trimmed)
    }
}

pub struct ArtifactCompiler<'a> {
    conn: &'a dyn Connection,
    reporter: &'a dyn Reporter,
}

impl<'a> ArtifactCompiler<'a> {
    pub fn new(conn: &'a dyn Connection, reporter: &'a dyn Reporter) -> Self {
        Self { conn, reporter }
    }

    /// Compile `request` under `owner` and check the outcome
    pub fn compile(&self, owner: &str, request: &CompileRequest) -> ProvisionResult<CompiledArtifact> {
        let object_type = request.kind.object_type();

        self.conn
            .execute(&format!("ALTER SESSION SET CURRENT_SCHEMA = {}", owner), &[])
            .step("switch schema")?;

        let statement = ensure_terminated(&request.statement);
        tracing::debug!(step = "compile", owner, name = %request.name, object_type);
        self.conn
            .execute(&statement, &[])
            .step(&format!("create {} {}", object_type.to_lowercase(), request.name))?;

        let status = self.status(owner, request)?;
        if status == ArtifactStatus::Invalid {
            self.reporter.fail(&format!(
                "{} {} compiled with errors",
                object_type.to_lowercase(),
                request.name
            ));
            let diagnostics = self.diagnostics(owner, request)?;
            if diagnostics.is_empty() {
                self.reporter
                    .info(&format!("no entries in ALL_ERRORS for {}", request.name));
            }
            for d in &diagnostics {
                self.reporter
                    .fail(&format!("line {}, col {}: {}", d.line, d.position, d.text));
            }
            return Err(ProvisionError::ArtifactInvalid {
                name: request.name.clone(),
                diagnostics,
            });
        }

        self.reporter.ok(&format!(
            "{} {} is VALID",
            object_type.to_lowercase(),
            request.name
        ));

        let smoke_test_result = match &request.smoke_test {
            Some(query) => Some(self.smoke_test(&request.name, query)?),
            None => None,
        };

        Ok(CompiledArtifact {
            name: request.name.clone(),
            kind: request.kind,
            status,
            smoke_test_result,
        })
    }

    fn catalog_params(owner: &str, request: &CompileRequest) -> [Value; 3] {
        [
            Value::from(owner.to_uppercase()),
            Value::from(request.kind.object_type()),
            Value::from(request.name.to_uppercase()),
        ]
    }

    fn status(&self, owner: &str, request: &CompileRequest) -> ProvisionResult<ArtifactStatus> {
        let status = self
            .conn
            .query_scalar(STATUS_SQL, &Self::catalog_params(owner, request))
            .step("read artifact status")?;

        match status.as_ref().and_then(Value::as_text) {
            Some(s) if s.eq_ignore_ascii_case("VALID") => Ok(ArtifactStatus::Valid),
            Some(_) => Ok(ArtifactStatus::Invalid),
            None => Err(ProvisionError::ArtifactNotFound {
                owner: owner.to_string(),
                name: request.name.clone(),
            }),
        }
    }

    fn diagnostics(&self, owner: &str, request: &CompileRequest) -> ProvisionResult<Vec<Diagnostic>> {
        let rows = self
            .conn
            .query_rows(DIAGNOSTICS_SQL, &Self::catalog_params(owner, request))
            .step("read compile errors")?;

        rows.iter()
            .map(|row| {
                Ok(Diagnostic {
                    line: row.get(0)?,
                    position: row.get(1)?,
                    text: row.get::<String>(2)?.trim_end().to_string(),
                })
            })
            .collect::<Result<Vec<_>, crate::connection::ConnectionError>>()
            .step("read compile errors")
    }

    fn smoke_test(&self, name: &str, query: &str) -> ProvisionResult<String> {
        let value = self
            .conn
            .query_scalar(query, &[])
            .map_err(|e| ProvisionError::SmokeTestFailed {
                name: name.to_string(),
                message: e.to_string(),
            })?
            .ok_or_else(|| ProvisionError::SmokeTestFailed {
                name: name.to_string(),
                message: "query returned no rows".to_string(),
            })?;

        let output = value.to_string();
        self.reporter
            .line(Marker::Test, &format!("test: {} -> {}", name, output));
        Ok(output)
    }
}
