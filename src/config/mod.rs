//! # Configuration
//!
//! One document per run, in YAML, TOML or JSON chosen by file extension.
//! Role and privilege lists may live in separate files next to it.
//!
//! Loading is parse, then validate (every problem collected), then resolve
//! referenced files. Nothing here talks to a server.

pub mod errors;
pub mod validator;

pub use errors::ConfigError;
pub use validator::{format_validation_errors, ConfigValidationError, ConfigValidator};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::connection::ConnectionDescriptor;
use crate::provisioning::compiler::ArtifactKind;
use crate::provisioning::ladder::LENGTH_VIOLATION_PATTERN;
use crate::provisioning::{IdentifierLimits, PatternClassifier, PrincipalSettings, TenancySettings};

/// Supported document formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
    Json,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(Self::Yaml),
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            _ => Err(ConfigError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    pub fn parse<T: DeserializeOwned>(&self, text: &str, path: &Path) -> Result<T, ConfigError> {
        let parsed = match self {
            Self::Yaml => serde_yaml::from_str(text).map_err(|e| e.to_string()),
            Self::Toml => toml::from_str(text).map_err(|e| e.to_string()),
            Self::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
        };
        parsed.map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }
}

/// Server error classification settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierSettings {
    #[serde(default = "default_length_violation_pattern")]
    pub length_violation_pattern: String,
}

fn default_length_violation_pattern() -> String {
    LENGTH_VIOLATION_PATTERN.to_string()
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            length_violation_pattern: default_length_violation_pattern(),
        }
    }
}

impl ClassifierSettings {
    pub fn classifier(&self) -> Result<PatternClassifier, ConfigError> {
        PatternClassifier::new(&self.length_violation_pattern).map_err(|e| {
            ConfigError::Invalid(vec![ConfigValidationError {
                field: "classifier.length_violation_pattern".to_string(),
                value: self.length_violation_pattern.clone(),
                message: format!("Invalid pattern: {}", e),
            }])
        })
    }
}

/// Root configuration document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub oracle_connection: ConnectionDescriptor,
    #[serde(default)]
    pub limits: IdentifierLimits,
    #[serde(default)]
    pub classifier: ClassifierSettings,
    #[serde(default)]
    pub principal: Option<PrincipalSettings>,
    #[serde(default)]
    pub tenancy: Option<TenancySettings>,
}

impl Config {
    /// Load, validate and resolve a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let format = ConfigFormat::from_path(path)?;
        let text = read_file(path)?;
        let mut config: Config = format.parse(&text, path)?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.validate(base)?;
        config.resolve(base)?;

        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Check every setting; file references are resolved against `base`
    pub fn validate(&self, base: &Path) -> Result<(), ConfigError> {
        let mut v = ConfigValidator::new();

        let conn = &self.oracle_connection;
        v.validate_port("oracle_connection.port", conn.port)
            .validate_non_empty("oracle_connection.host", &conn.host)
            .validate_non_empty("oracle_connection.service_name", &conn.service_name)
            .validate_non_empty("oracle_connection.username", &conn.username);

        v.validate_positive("limits.legacy", self.limits.legacy as i64)
            .validate_less_than(
                "limits.legacy",
                self.limits.legacy as i64,
                "limits.modern",
                self.limits.modern as i64,
            )
            .validate_regex(
                "classifier.length_violation_pattern",
                &self.classifier.length_violation_pattern,
            );

        if let Some(principal) = &self.principal {
            validate_principal(&mut v, principal, base);
        }
        if let Some(tenancy) = &self.tenancy {
            validate_tenancy(&mut v, tenancy);
        }

        v.finish().map_err(ConfigError::from)
    }

    /// Read list files and artifact bodies into the inline settings
    fn resolve(&mut self, base: &Path) -> Result<(), ConfigError> {
        let Some(principal) = self.principal.as_mut() else {
            return Ok(());
        };

        if let Some(file) = principal.granted_roles_file.take() {
            let roles = read_list(&base.join(file), "granted_roles")?;
            principal.granted_roles.extend(roles);
        }
        if let Some(file) = principal.system_privileges_file.take() {
            let privileges = read_list(&base.join(file), "system_privileges")?;
            principal.system_privileges.extend(privileges);
        }

        for artifact in &mut principal.artifacts {
            if let Some(file) = artifact.ddl_file.take() {
                artifact.ddl = Some(read_file(&base.join(file))?);
            }
            if let Some(file) = artifact.source_file.take() {
                artifact.source = Some(read_file(&base.join(file))?);
            }
        }
        Ok(())
    }

    pub fn principal(&self) -> Result<&PrincipalSettings, ConfigError> {
        self.principal
            .as_ref()
            .ok_or(ConfigError::MissingSection("principal"))
    }

    pub fn tenancy(&self) -> Result<&TenancySettings, ConfigError> {
        self.tenancy
            .as_ref()
            .ok_or(ConfigError::MissingSection("tenancy"))
    }
}

fn validate_principal(v: &mut ConfigValidator, principal: &PrincipalSettings, base: &Path) {
    v.validate_identifier_source("principal.name_prefix", &principal.name_prefix)
        .validate_secret("principal.password", &principal.password);

    if let Some(container) = &principal.target_container {
        v.validate_identifier_source("principal.target_container", container);
    }
    if let Some(file) = &principal.granted_roles_file {
        v.validate_path_exists("principal.granted_roles_file", &base.join(file));
    }
    if let Some(file) = &principal.system_privileges_file {
        v.validate_path_exists("principal.system_privileges_file", &base.join(file));
    }

    for (i, artifact) in principal.artifacts.iter().enumerate() {
        let field = format!("principal.artifacts[{}]", i);
        v.validate_non_empty(&format!("{}.name", field), &artifact.name)
            .validate_exactly_one(
                &field,
                &[
                    ("ddl", artifact.ddl.is_some()),
                    ("ddl_file", artifact.ddl_file.is_some()),
                    ("source", artifact.source.is_some()),
                    ("source_file", artifact.source_file.is_some()),
                ],
            );

        let has_source = artifact.source.is_some() || artifact.source_file.is_some();
        if has_source && artifact.kind != ArtifactKind::JavaSource {
            v.error(
                &format!("{}.source", field),
                &artifact.name,
                "source is only valid for java_source artifacts",
            );
        }
        if let Some(file) = &artifact.ddl_file {
            v.validate_path_exists(&format!("{}.ddl_file", field), &base.join(file));
        }
        if let Some(file) = &artifact.source_file {
            v.validate_path_exists(&format!("{}.source_file", field), &base.join(file));
        }
    }
}

fn validate_tenancy(v: &mut ConfigValidator, tenancy: &TenancySettings) {
    v.validate_identifier_source("tenancy.name_prefix", &tenancy.name_prefix)
        .validate_identifier_source("tenancy.admin_user", &tenancy.admin_user)
        .validate_secret("tenancy.admin_password", &tenancy.admin_password)
        .validate_non_empty("tenancy.seed.marker_file", &tenancy.seed.marker_file)
        .validate_non_empty("tenancy.seed.seed_dir", &tenancy.seed.seed_dir)
        .validate_positive("tenancy.max_name_attempts", tenancy.max_name_attempts as i64);
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Read the string list stored under `key` in a YAML/TOML/JSON list file
pub fn read_list(path: &Path, key: &str) -> Result<Vec<String>, ConfigError> {
    let format = ConfigFormat::from_path(path)?;
    let doc: serde_json::Value = format.parse(&read_file(path)?, path)?;

    let malformed = |message: String| ConfigError::Parse {
        path: PathBuf::from(path),
        message,
    };
    let items = doc
        .get(key)
        .and_then(|v| v.as_array())
        .ok_or_else(|| malformed(format!("expected a list under key '{}'", key)))?;

    let mut names = Vec::with_capacity(items.len());
    for item in items {
        let name = item
            .as_str()
            .ok_or_else(|| malformed(format!("'{}' entries must be strings", key)))?;
        let name = name.trim();
        if !name.is_empty() {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provisioning::{CollisionPolicy, GrantScope};

    const YAML: &str = r#"
oracle_connection:
  username: sys
  password: secret
  host: localhost
  port: 1521
  service_name: ORCLCDB
  admin_role: sysdba
principal:
  password: f
  granted_roles: [CONNECT]
  granted_roles_file: roles.yaml
  system_privileges: [CREATE TABLE]
  artifacts:
    - kind: java_source
      name: get_lower_case_value
      source_file: Lower.java
    - kind: function
      name: get_lower_case_value_pl
      ddl: "CREATE OR REPLACE FUNCTION get_lower_case_value_pl(p IN VARCHAR2) RETURN VARCHAR2 AS BEGIN RETURN LOWER(p); END;"
      smoke_test: "SELECT {owner}.get_lower_case_value_pl('AbC') FROM dual"
tenancy:
  admin_user: pdb_admin
  admin_password: f
"#;

    fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_load_yaml_with_list_and_source_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "roles.yaml", "granted_roles:\n  - RESOURCE\n  - ' DBA '\n");
        write(dir.path(), "Lower.java", "public class Lower { }");
        let path = write(dir.path(), "oraprov.yaml", YAML);

        let config = Config::load(&path).unwrap();
        assert_eq!(config.oracle_connection.connect_string(), "localhost:1521/ORCLCDB");
        assert_eq!(config.limits, IdentifierLimits::default());

        let principal = config.principal().unwrap();
        assert_eq!(principal.name_prefix, "user_slash_schema");
        assert_eq!(principal.grant_scope, GrantScope::Current);
        assert_eq!(principal.granted_roles, vec!["CONNECT", "RESOURCE", "DBA"]);
        assert!(principal.granted_roles_file.is_none());
        assert_eq!(
            principal.artifacts[0].source.as_deref(),
            Some("public class Lower { }")
        );

        let tenancy = config.tenancy().unwrap();
        assert_eq!(tenancy.name_prefix, "pdb");
        assert_eq!(tenancy.on_name_collision, CollisionPolicy::Abort);
        assert!(tenancy.teardown);
    }

    #[test]
    fn test_load_toml() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "privs.toml",
            "system_privileges = [\"CREATE VIEW\"]\n",
        );
        let path = write(
            dir.path(),
            "oraprov.toml",
            r#"
[oracle_connection]
username = "sys"
password = "secret"
host = "db"
port = 1521
service_name = "ORCLCDB"

[limits]
modern = 64

[principal]
password = "f"
grant_scope = "none"
system_privileges_file = "privs.toml"
"#,
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.limits.modern, 64);
        assert_eq!(config.limits.legacy, 30);
        let principal = config.principal().unwrap();
        assert_eq!(principal.grant_scope, GrantScope::None);
        assert_eq!(principal.system_privileges, vec!["CREATE VIEW"]);
        assert!(matches!(
            config.tenancy(),
            Err(ConfigError::MissingSection("tenancy"))
        ));
    }

    #[test]
    fn test_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "oraprov.json",
            r#"{
  "oracle_connection": {"username": "sys", "password": "s", "host": "db", "port": 1521, "service_name": "ORCLCDB"},
  "tenancy": {"admin_user": "pdb_admin", "admin_password": "f", "on_name_collision": "regenerate", "max_name_attempts": 5}
}"#,
        );

        let config = Config::load(&path).unwrap();
        let tenancy = config.tenancy().unwrap();
        assert_eq!(tenancy.on_name_collision, CollisionPolicy::Regenerate);
        assert_eq!(tenancy.max_name_attempts, 5);
        assert!(config.principal.is_none());
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "oraprov.ini", "x=1");
        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_missing_file_and_malformed_document() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Config::load(&dir.path().join("absent.yaml")),
            Err(ConfigError::Read { .. })
        ));

        let path = write(dir.path(), "bad.yaml", "oracle_connection: [1, 2\n");
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "oraprov.yaml",
            r#"
oracle_connection:
  username: ""
  password: s
  host: db
  port: 0
  service_name: ORCLCDB
limits:
  modern: 30
  legacy: 30
principal:
  password: 'a"b'
  granted_roles_file: missing.yaml
  artifacts:
    - kind: function
      name: f
      source: "public class f {}"
    - kind: procedure
      name: p
tenancy:
  admin_user: ""
  admin_password: f
  max_name_attempts: 0
"#,
        );

        let err = Config::load(&path).unwrap_err();
        let ConfigError::Invalid(errors) = &err else {
            panic!("expected validation failure, got {err}");
        };
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        for expected in [
            "oracle_connection.port",
            "oracle_connection.username",
            "limits.legacy",
            "principal.password",
            "principal.granted_roles_file",
            "principal.artifacts[0].source",
            "principal.artifacts[1]",
            "tenancy.admin_user",
            "tenancy.max_name_attempts",
        ] {
            assert!(fields.contains(&expected), "missing {expected} in {fields:?}");
        }
        assert!(!err.to_string().contains("a\"b"));
    }

    #[test]
    fn test_list_file_requires_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "roles.json", r#"{"roles": ["CONNECT"]}"#);
        assert!(matches!(
            read_list(&path, "granted_roles"),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_classifier_settings() {
        let settings = ClassifierSettings::default();
        assert_eq!(settings.length_violation_pattern, "ORA-00972");
        assert!(settings.classifier().is_ok());

        let bad = ClassifierSettings {
            length_violation_pattern: "ORA-(".to_string(),
        };
        assert!(matches!(bad.classifier(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_converts_to_provision_error() {
        let err: crate::provisioning::ProvisionError = ConfigError::MissingSection("tenancy").into();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("tenancy"));
    }
}
