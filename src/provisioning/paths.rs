//! # Seed Path Verification
//!
//! Confirms that the seed storage directory reported by the server is the
//! one derived from the root storage directory, before anything is cloned.
//!
//! Both directories are read from `V$DATAFILE` by locating a marker file
//! (normally `SYSTEM01.DBF`). Comparison ignores separator style, case and
//! the trailing separator.

use serde::{Deserialize, Serialize};

use super::errors::{ProvisionError, ProvisionResult, StepContext};
use super::reporter::Reporter;
use crate::connection::{Connection, Value};

const ROOT_DIR_SQL: &str = "SELECT DISTINCT SUBSTR(name, 1, REGEXP_INSTR(name, :1, 1, 1, 0, 'i') - 1) \
     FROM v$datafile \
     WHERE REGEXP_LIKE(name, :2, 'i') AND NOT REGEXP_LIKE(name, :3, 'i')";

const SEED_DIR_SQL: &str = "SELECT DISTINCT SUBSTR(name, 1, REGEXP_INSTR(name, :1, 1, 1, 0, 'i') - 1) \
     FROM v$datafile \
     WHERE REGEXP_LIKE(name, :2, 'i')";

/// Where the seed lives relative to the root storage directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedLayout {
    /// File present in both the root and the seed directory
    pub marker_file: String,
    /// Seed subdirectory under the root directory
    pub seed_dir: String,
    /// Subdirectories starting with this prefix are not root storage
    pub exclude_dir_prefix: String,
}

impl Default for SeedLayout {
    fn default() -> Self {
        Self {
            marker_file: "SYSTEM01.DBF".to_string(),
            seed_dir: "PDBSEED".to_string(),
            exclude_dir_prefix: "PDB".to_string(),
        }
    }
}

impl SeedLayout {
    pub fn marker_pattern(&self) -> String {
        regex::escape(&self.marker_file)
    }

    pub fn seed_pattern(&self) -> String {
        format!(
            r"[\\/]{}[\\/]{}",
            regex::escape(&self.seed_dir),
            self.marker_pattern()
        )
    }

    /// Directories that are never root storage: the seed directory, the
    /// prefixed directories and, when given, tenancy copies named `tenancy_prefix*`
    pub fn exclude_pattern(&self, tenancy_prefix: Option<&str>) -> String {
        let mut branches = vec![regex::escape(&self.seed_dir)];
        let prefixes = [Some(self.exclude_dir_prefix.as_str()), tenancy_prefix];
        for prefix in prefixes.into_iter().flatten() {
            if !prefix.is_empty() {
                branches.push(format!(r"{}[^\\/]*", regex::escape(prefix)));
            }
        }
        format!(r"[\\/]({})[\\/]", branches.join("|"))
    }
}

/// Separator used by the server for `path`
pub fn native_separator(path: &str) -> char {
    let bytes = path.as_bytes();
    let drive = bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':';
    if drive || path.contains('\\') {
        '\\'
    } else {
        '/'
    }
}

/// `dir` joined with `child`, in `dir`'s separator style, ending in a separator
pub fn child_dir(dir: &str, child: &str) -> String {
    let sep = native_separator(dir);
    let mut out = dir.trim_end_matches(['\\', '/']).to_string();
    out.push(sep);
    out.push_str(child);
    out.push(sep);
    out
}

/// Comparison form: `/` separators, upper case, single trailing `/`
pub fn normalize(path: &str) -> String {
    let mut out = path.trim().replace('\\', "/").to_uppercase();
    while out.contains("//") {
        out = out.replace("//", "/");
    }
    if !out.ends_with('/') {
        out.push('/');
    }
    out
}

pub fn paths_equivalent(expected: &str, actual: &str) -> bool {
    normalize(expected) == normalize(actual)
}

/// Directories established by a successful verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedPaths {
    pub root: String,
    pub expected_seed: String,
    pub actual_seed: String,
}

pub struct PathVerifier<'a> {
    conn: &'a dyn Connection,
    reporter: &'a dyn Reporter,
    layout: &'a SeedLayout,
    tenancy_prefix: Option<String>,
}

impl<'a> PathVerifier<'a> {
    pub fn new(conn: &'a dyn Connection, reporter: &'a dyn Reporter, layout: &'a SeedLayout) -> Self {
        Self {
            conn,
            reporter,
            layout,
            tenancy_prefix: None,
        }
    }

    /// Also skip tenancy directories whose names start with `prefix`
    pub fn excluding_tenancies(mut self, prefix: impl Into<String>) -> Self {
        self.tenancy_prefix = Some(prefix.into());
        self
    }

    fn directories(&self, sql: &str, params: &[Value], step: &str) -> ProvisionResult<Vec<String>> {
        let rows = self.conn.query_rows(sql, params).step(step)?;
        let mut dirs = Vec::new();
        for row in rows {
            let dir: Option<String> = row.get(0).step(step)?;
            if let Some(dir) = dir.filter(|d| !d.trim().is_empty()) {
                dirs.push(dir);
            }
        }
        Ok(dirs)
    }

    /// Root storage directory, excluding seed and tenancy copies
    pub fn root_dir(&self) -> ProvisionResult<String> {
        let params = [
            Value::from(self.layout.marker_pattern()),
            Value::from(self.layout.marker_pattern()),
            Value::from(self.layout.exclude_pattern(self.tenancy_prefix.as_deref())),
        ];
        let dirs = self.directories(ROOT_DIR_SQL, &params, "read root storage directory")?;
        let mut iter = dirs.into_iter();
        let root = iter.next().ok_or(ProvisionError::PathUndetermined {
            what: "root storage directory",
        })?;

        let others: Vec<String> = iter.collect();
        if !others.is_empty() {
            tracing::warn!(%root, ?others, "several root storage directories, using the first");
            self.reporter.warn(&format!(
                "several root storage directories found, using {} (ignored: {})",
                root,
                others.join(", ")
            ));
        }
        Ok(root)
    }

    /// Seed storage directory as reported by the server
    pub fn seed_dir(&self) -> ProvisionResult<String> {
        let params = [
            Value::from(self.layout.marker_pattern()),
            Value::from(self.layout.seed_pattern()),
        ];
        self.directories(SEED_DIR_SQL, &params, "read seed storage directory")?
            .into_iter()
            .next()
            .ok_or(ProvisionError::PathUndetermined {
                what: "seed storage directory",
            })
    }

    /// Compare the derived and the reported seed directory
    pub fn verify(&self) -> ProvisionResult<SeedPaths> {
        let root = self.root_dir()?;
        let expected_seed = child_dir(&root, &self.layout.seed_dir);
        let actual_seed = self.seed_dir()?;

        self.reporter.info(&format!("root directory:          {}", root));
        self.reporter.info(&format!("expected seed directory: {}", expected_seed));
        self.reporter.info(&format!("actual seed directory:   {}", actual_seed));

        if !paths_equivalent(&expected_seed, &actual_seed) {
            self.reporter.fail("seed directory does not match the root directory");
            return Err(ProvisionError::PathMismatch {
                expected: expected_seed,
                actual: actual_seed,
            });
        }

        self.reporter.ok("seed directory matches");
        Ok(SeedPaths {
            root,
            expected_seed,
            actual_seed,
        })
    }
}
