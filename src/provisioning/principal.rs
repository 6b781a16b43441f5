//! # Principal Provisioning
//!
//! Creates a throwaway account, grants it roles and privileges, compiles
//! artifacts into its schema and optionally drops it again.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::compiler::{ArtifactCompiler, ArtifactKind, CompileRequest, CompiledArtifact};
use super::context::RunContext;
use super::errors::{ProvisionError, ProvisionResult, StepContext};
use super::grants::{GrantApplier, GrantBatchResult, GrantKind, GrantScope};
use super::guard::RollbackGuard;
use super::identifier::{sanitize, IdentifierLimits};
use super::ladder::{ErrorClassifier, RetryLadder};
use super::names::NameGenerator;
use super::reporter::{Marker, Reporter};
use super::current_container;
use crate::connection::{Connection, FromValue, Value};

const DB_NAME_SQL: &str = "SELECT name FROM v$database";
const USER_COUNT_SQL: &str = "SELECT COUNT(*) FROM all_users WHERE username = :1";

/// Granted before the configured batches; failure is tolerated
pub const SESSION_PRIVILEGE: &str = "CREATE SESSION";

/// Placeholder in smoke tests replaced by the principal's identifier
pub const OWNER_PLACEHOLDER: &str = "{owner}";

/// One artifact to compile into the principal's schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSettings {
    pub kind: ArtifactKind,
    pub name: String,
    /// Complete creation statement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ddl: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ddl_file: Option<PathBuf>,
    /// Java class text, wrapped into a creation statement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smoke_test: Option<String>,
}

impl ArtifactSettings {
    /// Build the compile request for `owner`. File bodies must already be
    /// resolved into `ddl`/`source`.
    pub fn to_request(&self, owner: &str) -> ProvisionResult<CompileRequest> {
        let mut request = match (&self.ddl, &self.source) {
            (Some(ddl), None) => CompileRequest {
                kind: self.kind,
                name: self.name.clone(),
                statement: ddl.clone(),
                smoke_test: None,
            },
            (None, Some(source)) if self.kind == ArtifactKind::JavaSource => {
                CompileRequest::java_source(&self.name, source)
            }
            _ => {
                return Err(ProvisionError::config(format!(
                    "artifact {} needs exactly one body (ddl, or source for java_source)",
                    self.name
                )))
            }
        };
        request.smoke_test = self
            .smoke_test
            .as_ref()
            .map(|q| q.replace(OWNER_PLACEHOLDER, owner));
        Ok(request)
    }
}

/// Principal provisioning settings
#[derive(Clone, Serialize, Deserialize)]
pub struct PrincipalSettings {
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
    pub password: String,
    #[serde(default)]
    pub target_container: Option<String>,
    #[serde(default)]
    pub grant_scope: GrantScope,
    #[serde(default)]
    pub granted_roles: Vec<String>,
    #[serde(default)]
    pub granted_roles_file: Option<PathBuf>,
    #[serde(default)]
    pub system_privileges: Vec<String>,
    #[serde(default)]
    pub system_privileges_file: Option<PathBuf>,
    #[serde(default)]
    pub artifacts: Vec<ArtifactSettings>,
    #[serde(default)]
    pub teardown: bool,
}

fn default_name_prefix() -> String {
    "user_slash_schema".to_string()
}

impl fmt::Debug for PrincipalSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrincipalSettings")
            .field("name_prefix", &self.name_prefix)
            .field("password", &"<redacted>")
            .field("target_container", &self.target_container)
            .field("grant_scope", &self.grant_scope)
            .field("granted_roles", &self.granted_roles)
            .field("system_privileges", &self.system_privileges)
            .field("artifacts", &self.artifacts.len())
            .field("teardown", &self.teardown)
            .finish()
    }
}

/// What a principal run established, filled in as it goes
#[derive(Debug, Clone, Default, Serialize)]
pub struct PrincipalOutcome {
    pub database: Option<String>,
    pub container: Option<String>,
    pub identifier: Option<String>,
    pub grants: Vec<GrantBatchResult>,
    pub artifacts: Vec<CompiledArtifact>,
    pub torn_down: bool,
}

pub struct PrincipalRun<'a> {
    conn: &'a dyn Connection,
    reporter: &'a dyn Reporter,
    names: &'a dyn NameGenerator,
    classifier: &'a dyn ErrorClassifier,
    ctx: &'a RunContext,
    settings: &'a PrincipalSettings,
    limits: IdentifierLimits,
    outcome: PrincipalOutcome,
}

impl<'a> PrincipalRun<'a> {
    pub fn new(
        conn: &'a dyn Connection,
        reporter: &'a dyn Reporter,
        names: &'a dyn NameGenerator,
        classifier: &'a dyn ErrorClassifier,
        ctx: &'a RunContext,
        settings: &'a PrincipalSettings,
    ) -> Self {
        Self {
            conn,
            reporter,
            names,
            classifier,
            ctx,
            settings,
            limits: IdentifierLimits::default(),
            outcome: PrincipalOutcome::default(),
        }
    }

    pub fn with_limits(mut self, limits: IdentifierLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn outcome(&self) -> &PrincipalOutcome {
        &self.outcome
    }

    pub fn into_outcome(self) -> PrincipalOutcome {
        self.outcome
    }

    fn exec(&self, sql: &str, step: &str) -> ProvisionResult<()> {
        tracing::debug!(step, %sql);
        self.conn.execute(sql, &[]).step(step).map(|_| ())
    }

    fn switch_container(&mut self, target: &str) -> ProvisionResult<()> {
        self.exec(&format!("ALTER SESSION SET CONTAINER = {}", target), "switch container")?;
        let actual = current_container(self.conn)?;
        if !actual.eq_ignore_ascii_case(target) {
            self.reporter
                .fail(&format!("expected container {}, session reports {}", target, actual));
            return Err(ProvisionError::ContainerMismatch {
                expected: target.to_string(),
                actual,
            });
        }
        self.reporter.ok(&format!("switched to container {}", actual));
        self.outcome.container = Some(actual);
        Ok(())
    }

    fn create_user(&mut self) -> ProvisionResult<String> {
        let generated = self.names.generate(&self.settings.name_prefix);
        let base = sanitize(&generated);
        if base.is_empty() {
            return Err(ProvisionError::InvalidIdentifier { input: generated });
        }

        let ladder = RetryLadder::new(self.limits, self.classifier);
        let password = &self.settings.password;
        let conn = self.conn;
        let outcome = ladder
            .create("create user", &base, |id| {
                let sql = format!("CREATE USER {} IDENTIFIED BY \"{}\"", id, password);
                tracing::debug!(step = "create user", user = id);
                conn.execute(&sql, &[]).map(|_| ())
            })
            .map_err(|err| {
                self.reporter.fail(&format!("create user {}: {}", base, err));
                err
            })?;

        if outcome.was_shortened() {
            self.reporter.warn(&format!(
                "identifier shortened to {} ({} chars) after {} attempt(s)",
                outcome.identifier,
                outcome.identifier.chars().count(),
                outcome.attempts
            ));
        }
        self.reporter.ok(&format!("created user {}", outcome.identifier));
        tracing::info!(run_id = %self.ctx.run_id(), user = %outcome.identifier, "principal created");
        self.outcome.identifier = Some(outcome.identifier.clone());
        Ok(outcome.identifier)
    }

    fn drop_user(&mut self, user: &str) -> ProvisionResult<()> {
        self.exec(&format!("DROP USER {} CASCADE", user), "drop user")?;

        let value = self
            .conn
            .query_scalar(USER_COUNT_SQL, &[Value::from(user)])
            .step("confirm user drop")?
            .unwrap_or(Value::Integer(0));
        let remaining = i64::from_value(&value, 0).step("confirm user drop")?;
        if remaining != 0 {
            self.reporter
                .fail(&format!("drop not confirmed: {} still listed", user));
            return Err(ProvisionError::DropNotConfirmed {
                name: user.to_string(),
                remaining,
            });
        }

        self.reporter
            .line(Marker::Dropped, &format!("dropped user {} (confirmed)", user));
        self.outcome.torn_down = true;
        Ok(())
    }

    /// Full run; drops the principal at the end when `teardown` is set
    pub fn run(&mut self, teardown: bool) -> ProvisionResult<()> {
        self.ctx.ensure_active()?;
        let database: Option<String> = self
            .conn
            .query_scalar(DB_NAME_SQL, &[])
            .step("read database name")?
            .map(|v| v.to_string());
        self.reporter.info(&format!(
            "database: {}",
            database.as_deref().unwrap_or("unknown")
        ));
        self.outcome.database = database;

        if let Some(target) = self.settings.target_container.as_deref() {
            self.ctx.ensure_active()?;
            self.switch_container(target)?;
        }

        self.ctx.ensure_active()?;
        self.reporter.step("creating user");
        let user = self.create_user()?;

        let mut guard = RollbackGuard::arm(
            self.conn,
            self.reporter,
            format!("user {}", user),
            vec![format!("DROP USER {} CASCADE", user)],
        );

        self.ctx.ensure_active()?;
        self.reporter.step("granting");
        let applier = GrantApplier::new(self.conn, self.reporter, self.settings.grant_scope);
        match applier.grant(SESSION_PRIVILEGE, &user) {
            Ok(()) => self
                .reporter
                .ok(&format!("grant {} -> {}", SESSION_PRIVILEGE, user)),
            Err(err) if err.is_connectivity() => {
                return Err(ProvisionError::at_step("grant", err));
            }
            Err(err) => {
                tracing::warn!(%user, error = %err, "session privilege not granted");
                self.reporter
                    .warn(&format!("grant {} -> {} (error: {})", SESSION_PRIVILEGE, user, err));
            }
        }
        let roles = applier.apply(GrantKind::Role, &self.settings.granted_roles, &user)?;
        self.outcome.grants.push(roles);
        self.ctx.ensure_active()?;
        let privileges = applier.apply(
            GrantKind::SystemPrivilege,
            &self.settings.system_privileges,
            &user,
        )?;
        self.outcome.grants.push(privileges);

        if !self.settings.artifacts.is_empty() {
            self.reporter.step("compiling artifacts");
        }
        let compiler = ArtifactCompiler::new(self.conn, self.reporter);
        for artifact in &self.settings.artifacts {
            self.ctx.ensure_active()?;
            let request = artifact.to_request(&user)?;
            let compiled = compiler.compile(&user, &request)?;
            self.outcome.artifacts.push(compiled);
        }

        self.ctx.ensure_active()?;
        guard.disarm();
        if teardown {
            self.reporter.step("tearing down");
            self.drop_user(&user)
        } else {
            self.reporter.ok(&format!("user {} kept", user));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::InMemoryServer;
    use crate::provisioning::ladder::PatternClassifier;
    use crate::provisioning::names::SequenceNameGenerator;
    use crate::provisioning::reporter::RecordingReporter;

    fn settings() -> PrincipalSettings {
        PrincipalSettings {
            name_prefix: "user_slash_schema".to_string(),
            password: "f".to_string(),
            target_container: None,
            grant_scope: GrantScope::Current,
            granted_roles: vec!["CONNECT".to_string(), "NOT_A_ROLE".to_string()],
            granted_roles_file: None,
            system_privileges: vec!["CREATE TABLE".to_string(), " ".to_string()],
            system_privileges_file: None,
            artifacts: vec![
                ArtifactSettings {
                    kind: ArtifactKind::JavaSource,
                    name: "get_lower_case_value".to_string(),
                    ddl: None,
                    ddl_file: None,
                    source: Some(
                        "public class get_lower_case_value { public static String run(String s) { return s.toLowerCase(); } }"
                            .to_string(),
                    ),
                    source_file: None,
                    smoke_test: None,
                },
                ArtifactSettings {
                    kind: ArtifactKind::Function,
                    name: "lower_fn".to_string(),
                    ddl: Some(
                        "CREATE OR REPLACE FUNCTION lower_fn(s VARCHAR2) RETURN VARCHAR2 AS LANGUAGE JAVA NAME 'get_lower_case_value.run(java.lang.String) return java.lang.String';"
                            .to_string(),
                    ),
                    ddl_file: None,
                    source: None,
                    source_file: None,
                    smoke_test: Some("SELECT {owner}.lower_fn('AbC') FROM dual".to_string()),
                },
            ],
            teardown: false,
        }
    }

    fn server() -> InMemoryServer {
        InMemoryServer::new().with_function("LOWER_FN", |arg| arg.unwrap_or_default().to_lowercase())
    }

    #[test]
    fn test_run_with_teardown() {
        let server = server();
        let reporter = RecordingReporter::new();
        let names = SequenceNameGenerator::new(["1"]);
        let classifier = PatternClassifier::default();
        let ctx = RunContext::new();
        let settings = settings();

        let mut run = PrincipalRun::new(&server, &reporter, &names, &classifier, &ctx, &settings);
        run.run(true).unwrap();
        let outcome = run.into_outcome();

        assert_eq!(outcome.database.as_deref(), Some("ORCLCDB"));
        assert_eq!(outcome.identifier.as_deref(), Some("USER_SLASH_SCHEMA_1"));
        assert_eq!(outcome.grants.len(), 2);
        assert_eq!((outcome.grants[0].succeeded, outcome.grants[0].failed), (1, 1));
        assert_eq!((outcome.grants[1].succeeded, outcome.grants[1].failed), (1, 0));
        assert_eq!(outcome.artifacts.len(), 2);
        assert_eq!(outcome.artifacts[1].smoke_test_result.as_deref(), Some("abc"));
        assert!(outcome.torn_down);
        assert!(!server.user_exists("USER_SLASH_SCHEMA_1"));
        assert!(reporter.contains(Marker::Dropped, "USER_SLASH_SCHEMA_1"));
    }

    #[test]
    fn test_run_keeps_user() {
        let server = server();
        let reporter = RecordingReporter::new();
        let names = SequenceNameGenerator::new(["2"]);
        let classifier = PatternClassifier::default();
        let ctx = RunContext::new();
        let settings = settings();

        PrincipalRun::new(&server, &reporter, &names, &classifier, &ctx, &settings)
            .run(false)
            .unwrap();

        assert!(server.user_exists("USER_SLASH_SCHEMA_2"));
        assert_eq!(
            server.grants_for("USER_SLASH_SCHEMA_2"),
            vec!["CREATE SESSION", "CONNECT", "CREATE TABLE"]
        );
    }

    #[test]
    fn test_identifier_shortened_on_legacy_server() {
        let server = server().with_identifier_limit(30);
        let reporter = RecordingReporter::new();
        let names = SequenceNameGenerator::new(["20250804_103319_123456"]);
        let classifier = PatternClassifier::default();
        let ctx = RunContext::new();
        let mut settings = settings();
        settings.artifacts.clear();

        let limits = IdentifierLimits {
            modern: 35,
            legacy: 30,
        };
        let mut run = PrincipalRun::new(&server, &reporter, &names, &classifier, &ctx, &settings)
            .with_limits(limits);
        run.run(false).unwrap();

        let id = run.outcome().identifier.clone().unwrap();
        assert_eq!(id, "USER_SLASH_SCHEMA_20250804_103");
        assert!(server.user_exists(&id));
        assert!(reporter.contains(Marker::Warn, "identifier shortened"));
        assert!(server
            .statements()
            .contains(&format!("GRANT CONNECT TO {} CONTAINER=CURRENT", id)));
    }

    #[test]
    fn test_unshortenable_identifier_escalates() {
        let server = server().with_identifier_limit(30);
        let reporter = RecordingReporter::new();
        let names = SequenceNameGenerator::new(["20250804_103319_123456"]);
        let classifier = PatternClassifier::default();
        let ctx = RunContext::new();
        let settings = settings();

        let err = PrincipalRun::new(&server, &reporter, &names, &classifier, &ctx, &settings)
            .run(false)
            .unwrap_err();

        assert!(matches!(err, ProvisionError::IdentifierTooLong { .. }));
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn test_invalid_artifact_rolls_back_user() {
        let server = server();
        let reporter = RecordingReporter::new();
        let names = SequenceNameGenerator::new(["3"]);
        let classifier = PatternClassifier::default();
        let ctx = RunContext::new();
        let mut settings = settings();
        settings.artifacts[0].source = Some("public class get_lower_case_value {".to_string());

        let err = PrincipalRun::new(&server, &reporter, &names, &classifier, &ctx, &settings)
            .run(false)
            .unwrap_err();

        assert!(matches!(err, ProvisionError::ArtifactInvalid { .. }));
        assert!(!server.user_exists("USER_SLASH_SCHEMA_3"));
        assert!(reporter.contains(Marker::Warn, "rolled back user USER_SLASH_SCHEMA_3"));
    }

    #[test]
    fn test_target_container() {
        let server = server().with_container("PDB_APP");
        let reporter = RecordingReporter::new();
        let names = SequenceNameGenerator::new(["4"]);
        let classifier = PatternClassifier::default();
        let ctx = RunContext::new();
        let mut settings = settings();
        settings.target_container = Some("pdb_app".to_string());
        settings.artifacts.clear();

        let mut run = PrincipalRun::new(&server, &reporter, &names, &classifier, &ctx, &settings);
        run.run(false).unwrap();

        assert_eq!(run.outcome().container.as_deref(), Some("PDB_APP"));
        assert_eq!(server.current_container(), "PDB_APP");
    }

    #[test]
    fn test_unknown_target_container() {
        let server = server();
        let reporter = RecordingReporter::new();
        let names = SequenceNameGenerator::new(["5"]);
        let classifier = PatternClassifier::default();
        let ctx = RunContext::new();
        let mut settings = settings();
        settings.target_container = Some("PDB_MISSING".to_string());

        let err = PrincipalRun::new(&server, &reporter, &names, &classifier, &ctx, &settings)
            .run(false)
            .unwrap_err();

        assert!(err.to_string().contains("ORA-65011"));
        assert!(!server
            .statements()
            .iter()
            .any(|s| s.starts_with("CREATE USER")));
    }

    #[test]
    fn test_session_privilege_failure_is_tolerated() {
        let server = server();
        server.inject_failure("GRANT CREATE SESSION", "ORA-01031: insufficient privileges");
        let reporter = RecordingReporter::new();
        let names = SequenceNameGenerator::new(["6"]);
        let classifier = PatternClassifier::default();
        let ctx = RunContext::new();
        let mut settings = settings();
        settings.artifacts.clear();

        PrincipalRun::new(&server, &reporter, &names, &classifier, &ctx, &settings)
            .run(false)
            .unwrap();

        assert!(reporter.contains(Marker::Warn, "CREATE SESSION"));
        assert!(server.user_exists("USER_SLASH_SCHEMA_6"));
    }

    #[test]
    fn test_non_length_create_failure_is_fatal() {
        let server = server();
        server.inject_failure("CREATE USER", "ORA-01031: insufficient privileges");
        let reporter = RecordingReporter::new();
        let names = SequenceNameGenerator::new(["7"]);
        let classifier = PatternClassifier::default();
        let ctx = RunContext::new();
        let settings = settings();

        let err = PrincipalRun::new(&server, &reporter, &names, &classifier, &ctx, &settings)
            .run(false)
            .unwrap_err();

        assert!(matches!(err, ProvisionError::Server { .. }));
        let creates = server
            .statements()
            .iter()
            .filter(|s| s.starts_with("CREATE USER"))
            .count();
        assert_eq!(creates, 1);
    }

    #[test]
    fn test_artifact_request_bodies() {
        let artifact = ArtifactSettings {
            kind: ArtifactKind::Function,
            name: "f".to_string(),
            ddl: None,
            ddl_file: None,
            source: Some("class f {}".to_string()),
            source_file: None,
            smoke_test: None,
        };
        assert!(matches!(
            artifact.to_request("OWNER"),
            Err(ProvisionError::Config { .. })
        ));
    }
}
