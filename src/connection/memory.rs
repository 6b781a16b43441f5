//! # In-Memory Server
//!
//! Deterministic emulation of the catalogs touched during provisioning:
//! containers, datafiles, pluggable databases and their saved states,
//! users, grants, compiled objects and their compile errors.
//!
//! Clones share state, so a test can keep a handle while the code under
//! test owns another. Statements are recognised by shape, not parsed.

use regex::{Regex, RegexBuilder};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use super::errors::{ConnectionError, ConnectionResult};
use super::{Connection, ConnectionDescriptor, Connector, Row, Value};

const ROOT_CONTAINER: &str = "CDB$ROOT";
const SEED_CONTAINER: &str = "PDB$SEED";
const DEFAULT_IDENTIFIER_LIMIT: usize = 128;

/// Smoke-test behaviour of a server-side function: argument -> result
pub type FunctionBehavior = Arc<dyn Fn(Option<&str>) -> String + Send + Sync>;

#[derive(Debug, Clone)]
struct PdbRecord {
    open_mode: String,
    saved_state: Option<String>,
    data_dir: String,
}

#[derive(Debug, Clone)]
struct ObjectRecord {
    owner: String,
    object_type: String,
    name: String,
    valid: bool,
}

#[derive(Debug, Clone)]
struct ErrorRecord {
    owner: String,
    object_type: String,
    name: String,
    line: i64,
    position: i64,
    text: String,
}

struct ServerState {
    db_name: String,
    current_container: String,
    current_schema: Option<String>,
    containers: BTreeSet<String>,
    datafiles: Vec<String>,
    pdbs: BTreeMap<String, PdbRecord>,
    users: BTreeSet<String>,
    grants: BTreeMap<String, Vec<String>>,
    grantable: BTreeSet<String>,
    objects: Vec<ObjectRecord>,
    errors: Vec<ErrorRecord>,
    silently_invalid: BTreeSet<String>,
    functions: HashMap<String, FunctionBehavior>,
    identifier_limit: usize,
    failures: Vec<(String, String)>,
    saved_states_visible: bool,
    retain_dropped: bool,
    logon_failure: Option<String>,
    statements: Vec<String>,
}

impl Default for ServerState {
    fn default() -> Self {
        let grantable = [
            "CONNECT",
            "RESOURCE",
            "DBA",
            "JAVAUSERPRIV",
            "SELECT_CATALOG_ROLE",
            "CREATE SESSION",
            "CREATE TABLE",
            "CREATE VIEW",
            "CREATE PROCEDURE",
            "CREATE SEQUENCE",
            "UNLIMITED TABLESPACE",
        ];
        Self {
            db_name: "ORCLCDB".to_string(),
            current_container: ROOT_CONTAINER.to_string(),
            current_schema: None,
            containers: [ROOT_CONTAINER, SEED_CONTAINER]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            datafiles: vec![
                r"C:\ORA\ORADATA\ORCLCDB\SYSTEM01.DBF".to_string(),
                r"C:\ORA\ORADATA\ORCLCDB\SYSAUX01.DBF".to_string(),
                r"C:\ORA\ORADATA\ORCLCDB\PDBSEED\SYSTEM01.DBF".to_string(),
                r"C:\ORA\ORADATA\ORCLCDB\PDBSEED\SYSAUX01.DBF".to_string(),
            ],
            pdbs: BTreeMap::new(),
            users: ["SYS", "SYSTEM"].iter().map(|s| s.to_string()).collect(),
            grants: BTreeMap::new(),
            grantable: grantable.iter().map(|s| s.to_string()).collect(),
            objects: Vec::new(),
            errors: Vec::new(),
            silently_invalid: BTreeSet::new(),
            functions: HashMap::new(),
            identifier_limit: DEFAULT_IDENTIFIER_LIMIT,
            failures: Vec::new(),
            saved_states_visible: true,
            retain_dropped: false,
            logon_failure: None,
            statements: Vec::new(),
        }
    }
}

/// In-memory server (for testing)
#[derive(Clone, Default)]
pub struct InMemoryServer {
    state: Arc<Mutex<ServerState>>,
}

fn normalize(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn pattern(re: &str) -> ConnectionResult<Regex> {
    RegexBuilder::new(re)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| server_err(format!("ORA-00600: internal error [{}]", e)))
}

fn server_err(message: impl Into<String>) -> ConnectionError {
    ConnectionError::server(message)
}

fn text_param(params: &[Value], idx: usize) -> ConnectionResult<String> {
    match params.get(idx) {
        Some(Value::Text(s)) => Ok(s.clone()),
        Some(Value::Integer(i)) => Ok(i.to_string()),
        _ => Err(server_err(format!(
            "ORA-01008: not all variables bound (:{})",
            idx + 1
        ))),
    }
}

fn unquote(ident: &str) -> String {
    ident.trim_matches('"').to_uppercase()
}

fn text_row(values: &[&str]) -> Row {
    Row::new(values.iter().map(|v| Value::Text(v.to_string())).collect())
}

impl InMemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reject identifiers longer than `limit` with ORA-00972
    pub fn with_identifier_limit(self, limit: usize) -> Self {
        self.lock().identifier_limit = limit;
        self
    }

    /// Replace the datafile paths reported by `V$DATAFILE`
    pub fn with_datafiles<I, S>(self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().datafiles = files.into_iter().map(Into::into).collect();
        self
    }

    /// Start the session inside `container` instead of the root
    pub fn with_current_container(self, container: &str) -> Self {
        {
            let mut state = self.lock();
            state.containers.insert(container.to_uppercase());
            state.current_container = container.to_uppercase();
        }
        self
    }

    /// Register an additional pluggable container that sessions may switch to
    pub fn with_container(self, container: &str) -> Self {
        self.lock().containers.insert(container.to_uppercase());
        self
    }

    /// Make a role or privilege grantable
    pub fn with_grantable(self, name: &str) -> Self {
        self.lock().grantable.insert(normalize(name).to_uppercase());
        self
    }

    /// Register the result of calling function `name` in a smoke test
    pub fn with_function<F>(self, name: &str, behavior: F) -> Self
    where
        F: Fn(Option<&str>) -> String + Send + Sync + 'static,
    {
        self.lock()
            .functions
            .insert(name.to_uppercase(), Arc::new(behavior));
        self
    }

    /// Compile unit `name` as INVALID without any ALL_ERRORS rows
    pub fn invalid_without_errors(self, name: &str) -> Self {
        self.lock().silently_invalid.insert(name.to_uppercase());
        self
    }

    /// Make the saved-state catalog unreadable (ORA-00942)
    pub fn hide_saved_states(self) -> Self {
        self.lock().saved_states_visible = false;
        self
    }

    /// Accept `DROP PLUGGABLE DATABASE` without removing the catalog row
    pub fn retain_dropped_pdbs(self) -> Self {
        self.lock().retain_dropped = true;
        self
    }

    /// Refuse every logon with `message`
    pub fn refuse_logon(self, message: &str) -> Self {
        self.lock().logon_failure = Some(message.to_string());
        self
    }

    /// Fail the next statement that starts with `prefix` (whitespace and case
    /// insensitive) with the given server message. One-shot.
    pub fn inject_failure(&self, prefix: &str, message: &str) {
        self.lock()
            .failures
            .push((normalize(prefix).to_uppercase(), message.to_string()));
    }

    /// Every statement and query received, whitespace-normalised
    pub fn statements(&self) -> Vec<String> {
        self.lock().statements.clone()
    }

    /// Number of `DBA_PDBS` rows for `name`
    pub fn pdb_count(&self, name: &str) -> usize {
        usize::from(self.lock().pdbs.contains_key(&name.to_uppercase()))
    }

    pub fn pdb_open_mode(&self, name: &str) -> Option<String> {
        self.lock()
            .pdbs
            .get(&name.to_uppercase())
            .map(|p| p.open_mode.clone())
    }

    pub fn pdb_saved_state(&self, name: &str) -> Option<String> {
        self.lock()
            .pdbs
            .get(&name.to_uppercase())
            .and_then(|p| p.saved_state.clone())
    }

    pub fn pdb_data_dir(&self, name: &str) -> Option<String> {
        self.lock()
            .pdbs
            .get(&name.to_uppercase())
            .map(|p| p.data_dir.clone())
    }

    pub fn user_exists(&self, name: &str) -> bool {
        self.lock().users.contains(&name.to_uppercase())
    }

    pub fn grants_for(&self, user: &str) -> Vec<String> {
        self.lock()
            .grants
            .get(&user.to_uppercase())
            .cloned()
            .unwrap_or_default()
    }

    pub fn current_container(&self) -> String {
        self.lock().current_container.clone()
    }

    /// `VALID`/`INVALID` status of a compiled object
    pub fn object_status(&self, owner: &str, name: &str) -> Option<String> {
        self.lock()
            .objects
            .iter()
            .find(|o| o.owner == owner.to_uppercase() && o.name.to_uppercase() == name.to_uppercase())
            .map(|o| if o.valid { "VALID" } else { "INVALID" }.to_string())
    }

    fn take_failure(state: &mut ServerState, normalized: &str) -> Option<String> {
        let upper = normalized.to_uppercase();
        let idx = state
            .failures
            .iter()
            .position(|(prefix, _)| upper.starts_with(prefix))?;
        Some(state.failures.remove(idx).1)
    }

    fn check_identifier(state: &ServerState, ident: &str) -> ConnectionResult<()> {
        if ident.trim_matches('"').chars().count() > state.identifier_limit {
            return Err(server_err("ORA-00972: identifier is too long"));
        }
        Ok(())
    }

    fn require_root(state: &ServerState) -> ConnectionResult<()> {
        if state.current_container != ROOT_CONTAINER {
            return Err(server_err(
                "ORA-65040: operation not allowed from within a pluggable database",
            ));
        }
        Ok(())
    }

    fn run_statement(state: &mut ServerState, raw: &str, sql: &str) -> ConnectionResult<u64> {
        if let Some(c) = pattern(r"^ALTER SESSION SET CONTAINER\s*=\s*(\S+)$")?.captures(sql) {
            let target = unquote(&c[1]);
            if !state.containers.contains(&target) {
                return Err(server_err(format!(
                    "ORA-65011: Pluggable database {} does not exist.",
                    target
                )));
            }
            state.current_container = target;
            state.current_schema = None;
            return Ok(0);
        }

        if let Some(c) = pattern(r"^ALTER SESSION SET CURRENT_SCHEMA\s*=\s*(\S+)$")?.captures(sql) {
            let schema = unquote(&c[1]);
            if !state.users.contains(&schema) {
                return Err(server_err(format!("ORA-01435: user does not exist ({})", schema)));
            }
            state.current_schema = Some(schema);
            return Ok(0);
        }

        if let Some(c) = pattern(r#"^CREATE USER (\S+) IDENTIFIED BY "(.*)"$"#)?.captures(sql) {
            Self::check_identifier(state, &c[1])?;
            let user = unquote(&c[1]);
            if state.users.contains(&user) {
                return Err(server_err(format!(
                    "ORA-01920: user name '{}' conflicts with another user or role name",
                    user
                )));
            }
            state.users.insert(user);
            return Ok(0);
        }

        if let Some(c) = pattern(r"^DROP USER (\S+)( CASCADE)?$")?.captures(sql) {
            let user = unquote(&c[1]);
            if !state.users.remove(&user) {
                return Err(server_err(format!("ORA-01918: user '{}' does not exist", user)));
            }
            state.grants.remove(&user);
            state.objects.retain(|o| o.owner != user);
            state.errors.retain(|e| e.owner != user);
            if state.current_schema.as_deref() == Some(user.as_str()) {
                state.current_schema = None;
            }
            return Ok(0);
        }

        if let Some(c) = pattern(r"^GRANT (.+) TO (\S+)( CONTAINER=CURRENT)?$")?.captures(sql) {
            let grant = normalize(&c[1]).to_uppercase();
            let grantee = unquote(&c[2]);
            if !state.grantable.contains(&grant) {
                return Err(if grant.contains(' ') {
                    server_err("ORA-00990: missing or invalid privilege")
                } else {
                    server_err(format!("ORA-01919: role '{}' does not exist", grant))
                });
            }
            if !state.users.contains(&grantee) {
                return Err(server_err(format!(
                    "ORA-01917: user or role '{}' does not exist",
                    grantee
                )));
            }
            state.grants.entry(grantee).or_default().push(grant);
            return Ok(0);
        }

        if let Some(c) = pattern(
            r#"^CREATE PLUGGABLE DATABASE (\S+) ADMIN USER (\S+) IDENTIFIED BY "(.*)" FILE_NAME_CONVERT = \('((?:[^']|'')*)', '((?:[^']|'')*)'\)$"#,
        )?
        .captures(sql)
        {
            Self::require_root(state)?;
            Self::check_identifier(state, &c[1])?;
            let name = unquote(&c[1]);
            if state.pdbs.contains_key(&name) {
                return Err(server_err(format!(
                    "ORA-65012: Pluggable database {} already exists",
                    name
                )));
            }
            let source = c[4].replace("''", "'");
            let dest = c[5].replace("''", "'");
            let source_upper = source.to_uppercase();
            let cloned: Vec<String> = state
                .datafiles
                .iter()
                .filter(|f| {
                    let upper = f.to_uppercase();
                    upper.starts_with(&source_upper)
                        && !upper[source_upper.len()..].contains(['\\', '/'])
                })
                .map(|f| format!("{}{}", dest, &f[source.len()..]))
                .collect();
            if cloned.is_empty() {
                return Err(server_err(format!(
                    "ORA-65005: missing or invalid file name pattern for file - {}",
                    source
                )));
            }
            state.datafiles.extend(cloned);
            state.containers.insert(name.clone());
            state.pdbs.insert(
                name,
                PdbRecord {
                    open_mode: "MOUNTED".to_string(),
                    saved_state: None,
                    data_dir: dest,
                },
            );
            return Ok(0);
        }

        if let Some(c) = pattern(
            r"^ALTER PLUGGABLE DATABASE (\S+) (OPEN READ WRITE|SAVE STATE|CLOSE IMMEDIATE|DISCARD STATE)$",
        )?
        .captures(sql)
        {
            Self::require_root(state)?;
            let name = unquote(&c[1]);
            let action = c[2].to_uppercase();
            let pdb = state.pdbs.get_mut(&name).ok_or_else(|| {
                server_err(format!("ORA-65011: Pluggable database {} does not exist.", name))
            })?;
            match action.as_str() {
                "OPEN READ WRITE" => {
                    if pdb.open_mode == "READ WRITE" {
                        return Err(server_err(format!(
                            "ORA-65019: pluggable database {} already open",
                            name
                        )));
                    }
                    pdb.open_mode = "READ WRITE".to_string();
                }
                "SAVE STATE" => pdb.saved_state = Some("OPEN".to_string()),
                "CLOSE IMMEDIATE" => pdb.open_mode = "MOUNTED".to_string(),
                _ => pdb.saved_state = None,
            }
            return Ok(0);
        }

        if let Some(c) = pattern(r"^DROP PLUGGABLE DATABASE (\S+) INCLUDING DATAFILES$")?.captures(sql) {
            Self::require_root(state)?;
            let name = unquote(&c[1]);
            let pdb = state.pdbs.get(&name).cloned().ok_or_else(|| {
                server_err(format!("ORA-65011: Pluggable database {} does not exist.", name))
            })?;
            if pdb.open_mode != "MOUNTED" {
                return Err(server_err(format!(
                    "ORA-65025: Pluggable database {} is not closed on all instances.",
                    name
                )));
            }
            let dir = pdb.data_dir.to_uppercase();
            state.datafiles.retain(|f| !f.to_uppercase().starts_with(&dir));
            if !state.retain_dropped {
                state.pdbs.remove(&name);
                state.containers.remove(&name);
            }
            return Ok(0);
        }

        if let Some(c) = pattern(
            r#"^CREATE OR REPLACE AND COMPILE JAVA SOURCE NAMED "([^"]+)" AS (.*)$"#,
        )?
        .captures(sql)
        {
            let owner = Self::compile_owner(state)?;
            let name = c[1].to_string();
            let source = pattern(r#"^CREATE\s+OR\s+REPLACE\s+AND\s+COMPILE\s+JAVA\s+SOURCE\s+NAMED\s+"[^"]+"\s+AS\s+(.*)$"#)?
                .captures(raw)
                .map(|body| body[1].to_string())
                .unwrap_or_default();
            let diagnostics = compile_java(&name, &source);
            Self::record_object(state, &owner, "JAVA SOURCE", &name, diagnostics);
            return Ok(0);
        }

        if let Some(c) =
            pattern(r"^CREATE OR REPLACE (FUNCTION|PROCEDURE) (?:(\w+)\.)?(\w+)")?.captures(sql)
        {
            let object_type = c[1].to_uppercase();
            let owner = match c.get(2) {
                Some(owner) => owner.as_str().to_uppercase(),
                None => Self::compile_owner(state)?,
            };
            let name = c[3].to_uppercase();
            let diagnostics = compile_plsql(&object_type, raw);
            Self::record_object(state, &owner, &object_type, &name, diagnostics);
            return Ok(0);
        }

        Err(server_err("ORA-00900: invalid SQL statement"))
    }

    fn compile_owner(state: &ServerState) -> ConnectionResult<String> {
        state
            .current_schema
            .clone()
            .ok_or_else(|| server_err("ORA-01031: insufficient privileges"))
    }

    fn record_object(
        state: &mut ServerState,
        owner: &str,
        object_type: &str,
        name: &str,
        diagnostics: Vec<(i64, i64, String)>,
    ) {
        state
            .objects
            .retain(|o| !(o.owner == owner && o.object_type == object_type && o.name == name));
        state
            .errors
            .retain(|e| !(e.owner == owner && e.object_type == object_type && e.name == name));
        if state.silently_invalid.contains(&name.to_uppercase()) {
            state.objects.push(ObjectRecord {
                owner: owner.to_string(),
                object_type: object_type.to_string(),
                name: name.to_string(),
                valid: false,
            });
            return;
        }
        state.objects.push(ObjectRecord {
            owner: owner.to_string(),
            object_type: object_type.to_string(),
            name: name.to_string(),
            valid: diagnostics.is_empty(),
        });
        for (line, position, text) in diagnostics {
            state.errors.push(ErrorRecord {
                owner: owner.to_string(),
                object_type: object_type.to_string(),
                name: name.to_string(),
                line,
                position,
                text,
            });
        }
    }

    fn run_query(state: &ServerState, sql: &str, params: &[Value]) -> ConnectionResult<Vec<Row>> {
        let upper = sql.to_uppercase();

        if upper.contains("SYS_CONTEXT('USERENV','CON_NAME')") {
            return Ok(vec![text_row(&[&state.current_container])]);
        }

        if upper.contains("FROM V$DATABASE") {
            return Ok(vec![text_row(&[&state.db_name])]);
        }

        if upper.contains("FROM V$DATAFILE") {
            return Self::datafile_dirs(state, params);
        }

        if upper.contains("FROM DBA_PDBS") {
            let name = text_param(params, 0)?.to_uppercase();
            let count = i64::from(state.pdbs.contains_key(&name));
            return Ok(vec![Row::new(vec![Value::Integer(count)])]);
        }

        if upper.contains("FROM V$PDBS") {
            let name = text_param(params, 0)?.to_uppercase();
            return Ok(state
                .pdbs
                .get(&name)
                .map(|p| text_row(&[&name, &p.open_mode]))
                .into_iter()
                .collect());
        }

        if upper.contains("FROM DBA_PDB_SAVED_STATES") {
            if !state.saved_states_visible {
                return Err(server_err("ORA-00942: table or view does not exist"));
            }
            let name = text_param(params, 0)?.to_uppercase();
            return Ok(state
                .pdbs
                .get(&name)
                .and_then(|p| p.saved_state.as_ref())
                .map(|s| text_row(&[s, "NO"]))
                .into_iter()
                .collect());
        }

        if upper.contains("FROM ALL_USERS") {
            let name = text_param(params, 0)?.to_uppercase();
            let count = i64::from(state.users.contains(&name));
            return Ok(vec![Row::new(vec![Value::Integer(count)])]);
        }

        if upper.contains("FROM ALL_OBJECTS") {
            let owner = text_param(params, 0)?;
            let object_type = text_param(params, 1)?;
            let name = text_param(params, 2)?;
            return Ok(state
                .objects
                .iter()
                .filter(|o| {
                    o.owner == owner && o.object_type == object_type && o.name.to_uppercase() == name
                })
                .map(|o| text_row(&[if o.valid { "VALID" } else { "INVALID" }]))
                .collect());
        }

        if upper.contains("FROM ALL_ERRORS") {
            let owner = text_param(params, 0)?;
            let object_type = text_param(params, 1)?;
            let name = text_param(params, 2)?;
            return Ok(state
                .errors
                .iter()
                .filter(|e| {
                    e.owner == owner && e.object_type == object_type && e.name.to_uppercase() == name
                })
                .map(|e| {
                    Row::new(vec![
                        Value::Integer(e.line),
                        Value::Integer(e.position),
                        Value::Text(e.text.clone()),
                    ])
                })
                .collect());
        }

        if let Some(c) =
            pattern(r"^SELECT (?:(\w+)\.)?(\w+)\s*(?:\((.*)\))? FROM dual$")?.captures(sql)
        {
            return Self::call_function(state, c.get(1).map(|m| m.as_str()), &c[2], c.get(3).map(|m| m.as_str()))
                .map(|out| vec![text_row(&[&out])]);
        }

        Err(server_err("ORA-00900: invalid SQL statement"))
    }

    fn datafile_dirs(state: &ServerState, params: &[Value]) -> ConnectionResult<Vec<Row>> {
        let build = |idx: usize| -> ConnectionResult<Regex> {
            let re = text_param(params, idx)?;
            RegexBuilder::new(&re)
                .case_insensitive(true)
                .build()
                .map_err(|e| server_err(format!("ORA-12726: unmatched bracket in regular expression: {}", e)))
        };
        let marker = build(0)?;
        let include = build(1)?;
        let exclude = if params.len() > 2 { Some(build(2)?) } else { None };

        let mut dirs: Vec<String> = Vec::new();
        for file in &state.datafiles {
            if !include.is_match(file) {
                continue;
            }
            if exclude.as_ref().map(|re| re.is_match(file)).unwrap_or(false) {
                continue;
            }
            if let Some(m) = marker.find(file) {
                let dir = file[..m.start()].to_string();
                if !dirs.contains(&dir) {
                    dirs.push(dir);
                }
            }
        }
        Ok(dirs.iter().map(|d| text_row(&[d])).collect())
    }

    fn call_function(
        state: &ServerState,
        qualifier: Option<&str>,
        name: &str,
        args: Option<&str>,
    ) -> ConnectionResult<String> {
        let name = name.to_uppercase();
        let owner = qualifier
            .map(|q| q.to_uppercase())
            .or_else(|| state.current_schema.clone());
        let object = state.objects.iter().find(|o| {
            o.object_type == "FUNCTION"
                && o.name == name
                && owner.as_ref().map(|w| *w == o.owner).unwrap_or(true)
        });
        match object {
            None => Err(server_err(format!("ORA-00904: \"{}\": invalid identifier", name))),
            Some(o) if !o.valid => Err(server_err(format!(
                "ORA-06575: Package or function {} is in an invalid state",
                name
            ))),
            Some(_) => {
                let arg = args
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(|a| a.trim_matches('\'').replace("''", "'"));
                Ok(match state.functions.get(&name) {
                    Some(behavior) => behavior(arg.as_deref()),
                    None => arg.unwrap_or(name),
                })
            }
        }
    }
}

/// PL/SQL check: functions need a RETURN clause; BEGIN blocks need an END.
fn compile_plsql(object_type: &str, source: &str) -> Vec<(i64, i64, String)> {
    let mut diagnostics = Vec::new();
    let lines: Vec<&str> = source.trim().lines().collect();
    let words: Vec<String> = source
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .map(str::to_uppercase)
        .collect();
    let word = |w: &str| words.iter().filter(|t| t.as_str() == w).count();

    if object_type == "FUNCTION" && word("RETURN") == 0 {
        diagnostics.push((
            1,
            1,
            "PLS-00103: Encountered the symbol \"AS\" when expecting one of the following: return"
                .to_string(),
        ));
    }
    if word("BEGIN") > word("END") {
        let last = lines.len().max(1) as i64;
        let column = lines.last().map(|l| l.len() as i64 + 1).unwrap_or(1);
        diagnostics.push((
            last,
            column,
            "PLS-00103: Encountered the symbol \"end-of-file\" when expecting one of the following: begin end"
                .to_string(),
        ));
    }
    diagnostics
}

/// Java check: a class declaration with balanced braces.
fn compile_java(name: &str, source: &str) -> Vec<(i64, i64, String)> {
    let opens = source.matches('{').count();
    let closes = source.matches('}').count();
    let declares_class = source
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .any(|t| t == "class");
    if !declares_class {
        return vec![(1, 1, format!("{}:1: class, interface, or enum expected", name))];
    }
    if opens != closes {
        let last = source.trim().lines().count().max(1) as i64;
        return vec![(
            last,
            1,
            format!("{}:{}: reached end of file while parsing", name, last),
        )];
    }
    Vec::new()
}

impl Connection for InMemoryServer {
    fn execute(&self, sql: &str, _params: &[Value]) -> ConnectionResult<u64> {
        let normalized = normalize(sql);
        let mut state = self.lock();
        state.statements.push(normalized.clone());
        if let Some(message) = Self::take_failure(&mut state, &normalized) {
            return Err(server_err(message));
        }
        Self::run_statement(&mut state, sql.trim(), normalized.trim_end_matches(';'))
    }

    fn query_rows(&self, sql: &str, params: &[Value]) -> ConnectionResult<Vec<Row>> {
        let normalized = normalize(sql);
        let mut state = self.lock();
        state.statements.push(normalized.clone());
        if let Some(message) = Self::take_failure(&mut state, &normalized) {
            return Err(server_err(message));
        }
        Self::run_query(&state, &normalized, params)
    }
}

impl Connector for InMemoryServer {
    fn connect(&self, descriptor: &ConnectionDescriptor) -> ConnectionResult<Box<dyn Connection>> {
        if let Some(message) = self.lock().logon_failure.clone() {
            return Err(ConnectionError::Connect {
                target: descriptor.connect_string(),
                message,
            });
        }
        Ok(Box::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_limit() {
        let server = InMemoryServer::new().with_identifier_limit(30);
        let long = "U".repeat(31);
        let err = server
            .execute(&format!("CREATE USER {} IDENTIFIED BY \"f\"", long), &[])
            .unwrap_err();
        assert!(err.to_string().contains("ORA-00972"));

        server
            .execute(&format!("CREATE USER {} IDENTIFIED BY \"f\"", &long[..30]), &[])
            .unwrap();
        assert!(server.user_exists(&long[..30]));
    }

    #[test]
    fn test_injected_failure_is_one_shot() {
        let server = InMemoryServer::new();
        server.inject_failure("create user", "ORA-01031: insufficient privileges");

        let first = server.execute("CREATE USER ALICE IDENTIFIED BY \"f\"", &[]);
        assert!(first.unwrap_err().to_string().contains("ORA-01031"));
        server
            .execute("CREATE USER ALICE IDENTIFIED BY \"f\"", &[])
            .unwrap();
    }

    #[test]
    fn test_unknown_grant() {
        let server = InMemoryServer::new();
        server.execute("CREATE USER BOB IDENTIFIED BY \"f\"", &[]).unwrap();

        let err = server.execute("GRANT NOT_A_ROLE TO BOB", &[]).unwrap_err();
        assert!(err.to_string().contains("ORA-01919"));
        let err = server.execute("GRANT CREATE NOTHING TO BOB", &[]).unwrap_err();
        assert!(err.to_string().contains("ORA-00990"));

        server.execute("GRANT connect TO BOB CONTAINER=CURRENT", &[]).unwrap();
        assert_eq!(server.grants_for("bob"), vec!["CONNECT".to_string()]);
    }

    #[test]
    fn test_datafile_dirs() {
        let server = InMemoryServer::new();
        let rows = server
            .query_rows(
                "SELECT DISTINCT x FROM v$datafile",
                &[
                    Value::from(r"SYSTEM01\.DBF"),
                    Value::from(r"SYSTEM01\.DBF"),
                    Value::from(r"[\\/]PDB[^\\/]*"),
                ],
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get::<String>(0).unwrap(), r"C:\ORA\ORADATA\ORCLCDB\");
    }

    #[test]
    fn test_drop_requires_closed_pdb() {
        let server = InMemoryServer::new();
        server
            .execute(
                r#"CREATE PLUGGABLE DATABASE PDB_X ADMIN USER adm IDENTIFIED BY "f" FILE_NAME_CONVERT = ('C:\ORA\ORADATA\ORCLCDB\PDBSEED\', 'C:\ORA\ORADATA\ORCLCDB\PDB_X\')"#,
                &[],
            )
            .unwrap();
        server.execute("ALTER PLUGGABLE DATABASE PDB_X OPEN READ WRITE", &[]).unwrap();

        let err = server
            .execute("DROP PLUGGABLE DATABASE PDB_X INCLUDING DATAFILES", &[])
            .unwrap_err();
        assert!(err.to_string().contains("ORA-65025"));

        server.execute("ALTER PLUGGABLE DATABASE PDB_X CLOSE IMMEDIATE", &[]).unwrap();
        server
            .execute("DROP PLUGGABLE DATABASE PDB_X INCLUDING DATAFILES", &[])
            .unwrap();
        assert_eq!(server.pdb_count("pdb_x"), 0);
    }

    #[test]
    fn test_compile_plsql_rules() {
        assert!(compile_plsql("FUNCTION", "CREATE OR REPLACE FUNCTION f RETURN NUMBER AS BEGIN RETURN 1; END;").is_empty());
        assert_eq!(compile_plsql("FUNCTION", "CREATE OR REPLACE FUNCTION f AS BEGIN NULL; END;").len(), 1);
        let diags = compile_plsql("PROCEDURE", "CREATE OR REPLACE PROCEDURE p AS\nBEGIN\n  NULL;");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].0, 3);
    }

    #[test]
    fn test_refused_logon() {
        let server = InMemoryServer::new().refuse_logon("ORA-01017: invalid username/password");
        let descriptor = ConnectionDescriptor {
            username: "sys".to_string(),
            password: "x".to_string(),
            host: "h".to_string(),
            port: 1521,
            service_name: "s".to_string(),
            admin_role: None,
        };
        let err = server.connect(&descriptor).err().unwrap();
        assert!(err.is_connectivity());
    }
}
