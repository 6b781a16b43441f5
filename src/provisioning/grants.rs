//! # Grant Applier
//!
//! Applies an ordered batch of role or privilege grants to one principal.
//! Each grant stands alone: failures are counted and reported, and the
//! batch always runs to the end.

use serde::{Deserialize, Serialize};

use super::errors::{ProvisionError, ProvisionResult};
use super::reporter::{Marker, Reporter};
use crate::connection::{Connection, ConnectionResult};

/// Container clause appended to grant statements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantScope {
    /// `CONTAINER=CURRENT`
    #[default]
    Current,
    /// No container clause
    None,
}

impl GrantScope {
    fn clause(&self) -> &'static str {
        match self {
            Self::Current => " CONTAINER=CURRENT",
            Self::None => "",
        }
    }
}

/// What a batch grants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantKind {
    Role,
    SystemPrivilege,
}

impl GrantKind {
    fn label(&self) -> &'static str {
        match self {
            Self::Role => "role",
            Self::SystemPrivilege => "privilege",
        }
    }

    fn plural(&self) -> &'static str {
        match self {
            Self::Role => "roles",
            Self::SystemPrivilege => "privileges",
        }
    }
}

/// Outcome of one grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrantOutcome {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate of one grant batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrantBatchResult {
    pub kind: GrantKind,
    pub succeeded: usize,
    pub failed: usize,
    pub outcomes: Vec<GrantOutcome>,
}

/// Issues grant statements against a connection
pub struct GrantApplier<'a> {
    conn: &'a dyn Connection,
    reporter: &'a dyn Reporter,
    scope: GrantScope,
}

impl<'a> GrantApplier<'a> {
    pub fn new(conn: &'a dyn Connection, reporter: &'a dyn Reporter, scope: GrantScope) -> Self {
        Self {
            conn,
            reporter,
            scope,
        }
    }

    /// `GRANT <name> TO <grantee>[ CONTAINER=CURRENT]`
    pub fn statement(&self, name: &str, grantee: &str) -> String {
        format!("GRANT {} TO {}{}", name, grantee, self.scope.clause())
    }

    /// Issue a single grant
    pub fn grant(&self, name: &str, grantee: &str) -> ConnectionResult<()> {
        let sql = self.statement(name, grantee);
        tracing::debug!(step = "grant", %sql);
        self.conn.execute(&sql, &[]).map(|_| ())
    }

    /// Apply every non-blank entry of `names` in order.
    ///
    /// Server rejections are recorded per item. A lost connection ends the
    /// batch with an error, since no further grant could succeed.
    pub fn apply(&self, kind: GrantKind, names: &[String], grantee: &str) -> ProvisionResult<GrantBatchResult> {
        let mut result = GrantBatchResult {
            kind,
            succeeded: 0,
            failed: 0,
            outcomes: Vec::new(),
        };

        for raw in names {
            let name = raw.trim();
            if name.is_empty() {
                continue;
            }

            match self.grant(name, grantee) {
                Ok(()) => {
                    result.succeeded += 1;
                    self.reporter.ok(&format!(
                        "grant {} {:<35} -> {}",
                        kind.label(),
                        name,
                        grantee
                    ));
                    result.outcomes.push(GrantOutcome {
                        name: name.to_string(),
                        error: None,
                    });
                }
                Err(err) if err.is_connectivity() => {
                    return Err(ProvisionError::at_step("grant", err));
                }
                Err(err) => {
                    result.failed += 1;
                    tracing::warn!(grant = name, %grantee, error = %err, "grant failed");
                    self.reporter.fail(&format!(
                        "grant {} {:<35} -> {} (error: {})",
                        kind.label(),
                        name,
                        grantee,
                        err
                    ));
                    result.outcomes.push(GrantOutcome {
                        name: name.to_string(),
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        self.reporter.line(
            Marker::Summary,
            &format!(
                "{} granted OK={}, failed={}",
                kind.plural(),
                result.succeeded,
                result.failed
            ),
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::InMemoryServer;
    use crate::provisioning::reporter::RecordingReporter;

    fn server_with_user() -> InMemoryServer {
        let server = InMemoryServer::new();
        server
            .execute("CREATE USER APP_USER IDENTIFIED BY \"f\"", &[])
            .unwrap();
        server
    }

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_partial_batch() {
        let server = server_with_user();
        let reporter = RecordingReporter::new();
        let applier = GrantApplier::new(&server, &reporter, GrantScope::Current);

        let result = applier
            .apply(
                GrantKind::Role,
                &names(&["CONNECT", "NO_SUCH_ROLE", "RESOURCE", "ALSO_MISSING", "DBA"]),
                "APP_USER",
            )
            .unwrap();

        assert_eq!(result.succeeded, 3);
        assert_eq!(result.failed, 2);
        assert_eq!(result.outcomes.len(), 5);
        assert_eq!(result.outcomes[4].name, "DBA");
        assert!(result.outcomes[1].error.as_deref().unwrap().contains("ORA-01919"));
        assert_eq!(server.grants_for("APP_USER"), names(&["CONNECT", "RESOURCE", "DBA"]));
        assert!(reporter.contains(Marker::Summary, "roles granted OK=3, failed=2"));
        assert_eq!(reporter.count(Marker::Fail), 2);
    }

    #[test]
    fn test_blank_entries_are_skipped() {
        let server = server_with_user();
        let reporter = RecordingReporter::new();
        let applier = GrantApplier::new(&server, &reporter, GrantScope::None);

        let result = applier
            .apply(
                GrantKind::SystemPrivilege,
                &names(&["  CREATE TABLE  ", "", "   "]),
                "APP_USER",
            )
            .unwrap();

        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failed, 0);
        assert!(server
            .statements()
            .contains(&"GRANT CREATE TABLE TO APP_USER".to_string()));
    }

    #[test]
    fn test_statement_scope() {
        let server = InMemoryServer::new();
        let reporter = RecordingReporter::new();
        let applier = GrantApplier::new(&server, &reporter, GrantScope::Current);
        assert_eq!(
            applier.statement("CONNECT", "U1"),
            "GRANT CONNECT TO U1 CONTAINER=CURRENT"
        );
    }
}
