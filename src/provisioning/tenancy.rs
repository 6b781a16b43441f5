//! # Pluggable Tenancy Lifecycle
//!
//! State machine that clones a pluggable database from the seed, opens it,
//! persists its open state and, when asked, tears it down again:
//!
//! ```text
//! UNVERIFIED -> VERIFIED -> NAME_RESERVED -> CREATED -> OPEN -> STATE_SAVED
//!     -> CLOSING -> STATE_DISCARDED -> DROPPED
//! ```
//!
//! Every transition is a separate method and refuses to run from any other
//! state than its predecessor. Nothing retries. From `CREATED` on, a rollback
//! guard removes the tenancy unless it is kept or its drop is confirmed.
//! Cancellation is honoured up to `close`; a started teardown runs to the end.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::context::RunContext;
use super::errors::{ProvisionError, ProvisionResult, StepContext};
use super::guard::RollbackGuard;
use super::identifier::sanitize;
use super::names::NameGenerator;
use super::paths::{child_dir, PathVerifier, SeedLayout, SeedPaths};
use super::reporter::{Marker, Reporter};
use super::{current_container, ROOT_CONTAINER};
use crate::connection::{Connection, FromValue, Value};

const COUNT_SQL: &str = "SELECT COUNT(*) FROM dba_pdbs WHERE pdb_name = UPPER(:1)";
const OPEN_MODE_SQL: &str = "SELECT name, open_mode FROM v$pdbs WHERE name = UPPER(:1)";
const SAVED_STATE_SQL: &str =
    "SELECT state, restricted FROM dba_pdb_saved_states WHERE con_name = UPPER(:1)";

/// Open mode a tenancy must report after activation
pub const READ_WRITE: &str = "READ WRITE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TenancyState {
    Unverified,
    Verified,
    NameReserved,
    Created,
    Open,
    StateSaved,
    Closing,
    StateDiscarded,
    Dropped,
}

impl fmt::Display for TenancyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unverified => "UNVERIFIED",
            Self::Verified => "VERIFIED",
            Self::NameReserved => "NAME_RESERVED",
            Self::Created => "CREATED",
            Self::Open => "OPEN",
            Self::StateSaved => "STATE_SAVED",
            Self::Closing => "CLOSING",
            Self::StateDiscarded => "STATE_DISCARDED",
            Self::Dropped => "DROPPED",
        };
        write!(f, "{}", s)
    }
}

/// What to do when a generated name already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Fail with `NameCollision`
    #[default]
    Abort,
    /// Ask the generator again, up to `max_name_attempts` names in total
    Regenerate,
}

/// Tenancy provisioning settings
#[derive(Clone, Serialize, Deserialize)]
pub struct TenancySettings {
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
    pub admin_user: String,
    pub admin_password: String,
    #[serde(default)]
    pub seed: SeedLayout,
    #[serde(default)]
    pub on_name_collision: CollisionPolicy,
    #[serde(default = "default_max_name_attempts")]
    pub max_name_attempts: u32,
    #[serde(default = "default_teardown")]
    pub teardown: bool,
}

fn default_name_prefix() -> String {
    "pdb".to_string()
}

fn default_max_name_attempts() -> u32 {
    3
}

fn default_teardown() -> bool {
    true
}

impl fmt::Debug for TenancySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenancySettings")
            .field("name_prefix", &self.name_prefix)
            .field("admin_user", &self.admin_user)
            .field("admin_password", &"<redacted>")
            .field("seed", &self.seed)
            .field("on_name_collision", &self.on_name_collision)
            .field("max_name_attempts", &self.max_name_attempts)
            .field("teardown", &self.teardown)
            .finish()
    }
}

/// Row of the saved-state catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedState {
    pub state: String,
    pub restricted: Option<String>,
}

/// Escape a string for use inside a single-quoted literal
fn quote_literal(s: &str) -> String {
    s.replace('\'', "''")
}

pub struct TenancyLifecycle<'a> {
    conn: &'a dyn Connection,
    reporter: &'a dyn Reporter,
    names: &'a dyn NameGenerator,
    ctx: &'a RunContext,
    settings: &'a TenancySettings,
    state: TenancyState,
    history: Vec<TenancyState>,
    paths: Option<SeedPaths>,
    name: Option<String>,
    saved_state: Option<SavedState>,
    guard: Option<RollbackGuard<'a>>,
    rolled_back: bool,
}

impl<'a> TenancyLifecycle<'a> {
    pub fn new(
        conn: &'a dyn Connection,
        reporter: &'a dyn Reporter,
        names: &'a dyn NameGenerator,
        ctx: &'a RunContext,
        settings: &'a TenancySettings,
    ) -> Self {
        Self {
            conn,
            reporter,
            names,
            ctx,
            settings,
            state: TenancyState::Unverified,
            history: vec![TenancyState::Unverified],
            paths: None,
            name: None,
            saved_state: None,
            guard: None,
            rolled_back: false,
        }
    }

    pub fn state(&self) -> TenancyState {
        self.state
    }

    /// States visited so far, in order
    pub fn history(&self) -> &[TenancyState] {
        &self.history
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn paths(&self) -> Option<&SeedPaths> {
        self.paths.as_ref()
    }

    pub fn saved_state(&self) -> Option<&SavedState> {
        self.saved_state.as_ref()
    }

    /// Whether the rollback guard has removed the tenancy
    pub fn rolled_back(&self) -> bool {
        self.rolled_back
    }

    /// Run the pending rollback now instead of on drop. Returns whether
    /// anything was rolled back.
    pub fn release(&mut self) -> bool {
        if let Some(guard) = self.guard.take() {
            if guard.is_armed() {
                self.rolled_back = true;
            }
        }
        self.rolled_back
    }

    fn require_state(&self, expected: TenancyState, operation: &'static str) -> ProvisionResult<()> {
        self.ctx.ensure_active()?;
        self.require_teardown_state(expected, operation)
    }

    /// Like `require_state`, without the cancellation check
    fn require_teardown_state(
        &self,
        expected: TenancyState,
        operation: &'static str,
    ) -> ProvisionResult<()> {
        if self.state != expected {
            return Err(ProvisionError::InvalidTransition {
                state: self.state.to_string(),
                operation,
            });
        }
        Ok(())
    }

    fn advance(&mut self, next: TenancyState) {
        tracing::info!(
            run_id = %self.ctx.run_id(),
            tenancy = self.name.as_deref().unwrap_or("-"),
            from = %self.state,
            to = %next,
            "tenancy transition"
        );
        self.state = next;
        self.history.push(next);
    }

    fn reserved_name(&self) -> ProvisionResult<&str> {
        self.name.as_deref().ok_or(ProvisionError::InvalidTransition {
            state: self.state.to_string(),
            operation: "use tenancy name",
        })
    }

    fn exec(&self, sql: &str, step: &str) -> ProvisionResult<()> {
        tracing::debug!(step, %sql);
        self.conn.execute(sql, &[]).step(step).map(|_| ())
    }

    fn count(&self, name: &str, step: &str) -> ProvisionResult<i64> {
        let value = self
            .conn
            .query_scalar(COUNT_SQL, &[Value::from(name)])
            .step(step)?
            .unwrap_or(Value::Integer(0));
        i64::from_value(&value, 0).step(step)
    }

    /// UNVERIFIED -> VERIFIED: root container, then seed path equivalence
    pub fn verify(&mut self) -> ProvisionResult<&SeedPaths> {
        self.require_state(TenancyState::Unverified, "verify")?;

        let container = current_container(self.conn)?;
        if !container.eq_ignore_ascii_case(ROOT_CONTAINER) {
            self.reporter
                .fail(&format!("not in {} (current container: {})", ROOT_CONTAINER, container));
            return Err(ProvisionError::NotRootContainer { container });
        }
        self.reporter.ok(&format!("connected to {}", container));

        let paths = PathVerifier::new(self.conn, self.reporter, &self.settings.seed)
            .excluding_tenancies(sanitize(&self.settings.name_prefix))
            .verify()?;
        self.advance(TenancyState::Verified);
        Ok(&*self.paths.insert(paths))
    }

    /// VERIFIED -> NAME_RESERVED: generate a name nobody uses yet
    pub fn reserve_name(&mut self) -> ProvisionResult<&str> {
        self.require_state(TenancyState::Verified, "reserve name")?;

        let allowed = match self.settings.on_name_collision {
            CollisionPolicy::Abort => 1,
            CollisionPolicy::Regenerate => self.settings.max_name_attempts.max(1),
        };

        let mut attempt = 0;
        let name = loop {
            attempt += 1;
            let generated = self.names.generate(&self.settings.name_prefix);
            let candidate = sanitize(&generated);
            if candidate.is_empty() {
                return Err(ProvisionError::InvalidIdentifier { input: generated });
            }

            let existing = self.count(&candidate, "check tenancy name")?;
            if existing == 0 {
                break candidate;
            }

            self.reporter
                .warn(&format!("tenancy {} already exists", candidate));
            tracing::warn!(tenancy = %candidate, attempt, "name collision");
            if attempt >= allowed {
                return Err(ProvisionError::NameCollision {
                    name: candidate,
                    attempts: attempt,
                });
            }
        };

        self.reporter.ok(&format!("tenancy name reserved: {}", name));
        self.name = Some(name);
        self.advance(TenancyState::NameReserved);
        self.reserved_name()
    }

    /// NAME_RESERVED -> CREATED: clone the seed into `<root><name><sep>`
    pub fn create(&mut self) -> ProvisionResult<()> {
        self.require_state(TenancyState::NameReserved, "create")?;
        let name = self.reserved_name()?.to_string();
        let paths = self.paths.clone().ok_or(ProvisionError::InvalidTransition {
            state: self.state.to_string(),
            operation: "create without verified paths",
        })?;

        let admin = sanitize(&self.settings.admin_user);
        if admin.is_empty() {
            return Err(ProvisionError::InvalidIdentifier {
                input: self.settings.admin_user.clone(),
            });
        }

        let destination = child_dir(&paths.root, &name);
        let sql = format!(
            "CREATE PLUGGABLE DATABASE {} ADMIN USER {} IDENTIFIED BY \"{}\" FILE_NAME_CONVERT = ('{}', '{}')",
            name,
            admin,
            self.settings.admin_password,
            quote_literal(&paths.actual_seed),
            quote_literal(&destination)
        );
        tracing::debug!(step = "create tenancy", tenancy = %name, %destination);
        if let Err(err) = self.conn.execute(&sql, &[]) {
            self.reporter
                .fail(&format!("create pluggable database {}: {}", name, err));
            return Err(ProvisionError::at_step("create tenancy", err));
        }

        self.guard = Some(RollbackGuard::arm(
            self.conn,
            self.reporter,
            name.clone(),
            vec![
                format!("ALTER PLUGGABLE DATABASE {} CLOSE IMMEDIATE", name),
                format!("ALTER PLUGGABLE DATABASE {} DISCARD STATE", name),
                format!("DROP PLUGGABLE DATABASE {} INCLUDING DATAFILES", name),
            ],
        ));
        self.reporter
            .ok(&format!("created pluggable database {} in {}", name, destination));
        self.advance(TenancyState::Created);
        Ok(())
    }

    /// CREATED -> OPEN
    pub fn open(&mut self) -> ProvisionResult<()> {
        self.require_state(TenancyState::Created, "open")?;
        let name = self.reserved_name()?.to_string();

        self.exec(
            &format!("ALTER PLUGGABLE DATABASE {} OPEN READ WRITE", name),
            "open tenancy",
        )?;
        self.reporter.ok(&format!("opened {} read write", name));
        self.advance(TenancyState::Open);
        Ok(())
    }

    /// OPEN -> STATE_SAVED: persist the open state and confirm the open mode
    pub fn save_state(&mut self) -> ProvisionResult<()> {
        self.require_state(TenancyState::Open, "save state")?;
        let name = self.reserved_name()?.to_string();

        self.exec(
            &format!("ALTER PLUGGABLE DATABASE {} SAVE STATE", name),
            "save tenancy state",
        )?;

        let row = self
            .conn
            .query_row(OPEN_MODE_SQL, &[Value::from(name.as_str())])
            .step("read open mode")?;
        let open_mode = match row {
            Some(row) => Some(row.get::<String>(1).step("read open mode")?),
            None => None,
        };
        if open_mode.as_deref() != Some(READ_WRITE) {
            self.reporter.fail(&format!(
                "{} open mode is {}",
                name,
                open_mode.as_deref().unwrap_or("unknown")
            ));
            return Err(ProvisionError::ActivationNotConfirmed { name, open_mode });
        }

        self.reporter
            .ok(&format!("{} state saved (open mode {})", name, READ_WRITE));
        self.advance(TenancyState::StateSaved);
        Ok(())
    }

    /// Read the saved-state catalog. Informational: a missing record or an
    /// unreadable catalog is reported, never fatal.
    pub fn inspect_saved_state(&mut self) -> ProvisionResult<Option<&SavedState>> {
        self.ctx.ensure_active()?;
        let name = self.reserved_name()?.to_string();

        let row = match self
            .conn
            .query_row(SAVED_STATE_SQL, &[Value::from(name.as_str())])
        {
            Ok(row) => row,
            Err(err) if err.is_connectivity() => {
                return Err(ProvisionError::at_step("read saved state", err))
            }
            Err(err) => {
                tracing::warn!(tenancy = %name, error = %err, "saved state catalog unavailable");
                self.reporter
                    .info(&format!("saved state catalog unavailable: {}", err));
                return Ok(None);
            }
        };

        let Some(row) = row else {
            self.reporter
                .info(&format!("no saved state record for {}", name));
            return Ok(None);
        };

        let saved = SavedState {
            state: row.get(0).step("read saved state")?,
            restricted: row.get(1).step("read saved state")?,
        };
        self.reporter.info(&format!(
            "saved state: {} (restricted: {})",
            saved.state,
            saved.restricted.as_deref().unwrap_or("-")
        ));
        Ok(Some(&*self.saved_state.insert(saved)))
    }

    /// Hand the tenancy over as long-lived: no rollback, no teardown
    pub fn keep(&mut self) -> ProvisionResult<()> {
        self.require_state(TenancyState::StateSaved, "keep")?;
        if let Some(guard) = self.guard.as_mut() {
            guard.disarm();
        }
        self.guard = None;
        self.reporter
            .ok(&format!("{} kept", self.reserved_name()?));
        Ok(())
    }

    /// STATE_SAVED -> CLOSING
    pub fn close(&mut self) -> ProvisionResult<()> {
        self.require_state(TenancyState::StateSaved, "close")?;
        let name = self.reserved_name()?.to_string();

        self.exec(
            &format!("ALTER PLUGGABLE DATABASE {} CLOSE IMMEDIATE", name),
            "close tenancy",
        )?;
        self.reporter.ok(&format!("closed {}", name));
        self.advance(TenancyState::Closing);
        Ok(())
    }

    /// CLOSING -> STATE_DISCARDED
    pub fn discard_state(&mut self) -> ProvisionResult<()> {
        self.require_teardown_state(TenancyState::Closing, "discard state")?;
        let name = self.reserved_name()?.to_string();

        self.exec(
            &format!("ALTER PLUGGABLE DATABASE {} DISCARD STATE", name),
            "discard tenancy state",
        )?;
        self.reporter.ok(&format!("discarded saved state of {}", name));
        self.advance(TenancyState::StateDiscarded);
        Ok(())
    }

    /// STATE_DISCARDED -> DROPPED, confirmed by an empty catalog lookup
    pub fn drop_tenancy(&mut self) -> ProvisionResult<()> {
        self.require_teardown_state(TenancyState::StateDiscarded, "drop")?;
        let name = self.reserved_name()?.to_string();

        self.exec(
            &format!("DROP PLUGGABLE DATABASE {} INCLUDING DATAFILES", name),
            "drop tenancy",
        )?;

        let remaining = self.count(&name, "confirm tenancy drop")?;
        if remaining != 0 {
            self.reporter
                .fail(&format!("drop not confirmed: {} still listed", name));
            return Err(ProvisionError::DropNotConfirmed { name, remaining });
        }

        if let Some(guard) = self.guard.as_mut() {
            guard.disarm();
        }
        self.guard = None;
        self.reporter
            .line(Marker::Dropped, &format!("dropped {} (confirmed)", name));
        self.advance(TenancyState::Dropped);
        Ok(())
    }

    /// Full run; tears down unless `teardown` is false
    pub fn run(&mut self, teardown: bool) -> ProvisionResult<()> {
        self.reporter.step("verifying seed layout");
        self.verify()?;
        self.reserve_name()?;
        self.reporter.step("creating tenancy");
        self.create()?;
        self.open()?;
        self.save_state()?;
        self.inspect_saved_state()?;

        if teardown {
            self.reporter.step("tearing down");
            self.close()?;
            self.discard_state()?;
            self.drop_tenancy()
        } else {
            self.keep()
        }
    }
}
