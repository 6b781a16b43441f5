//! Configuration Validation
//!
//! Collects every problem in a configuration document before any server
//! contact, so all of them can be reported at once.

use std::path::Path;

use crate::provisioning::identifier::sanitize;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub value: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Invalid configuration for '{}': {} (value: {})",
            self.field, self.message, self.value
        )
    }
}

impl std::error::Error for ConfigValidationError {}

/// Result of config validation
pub type ValidationResult = Result<(), Vec<ConfigValidationError>>;

/// Configuration validator
pub struct ConfigValidator {
    errors: Vec<ConfigValidationError>,
}

impl ConfigValidator {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Add an error
    pub fn error(&mut self, field: &str, value: impl std::fmt::Display, message: &str) {
        self.errors.push(ConfigValidationError {
            field: field.to_string(),
            value: value.to_string(),
            message: message.to_string(),
        });
    }

    /// Validate port number (1-65535)
    pub fn validate_port(&mut self, field: &str, port: u16) -> &mut Self {
        if port == 0 {
            self.error(field, port, "Port must be between 1 and 65535");
        }
        self
    }

    /// Validate positive integer
    pub fn validate_positive(&mut self, field: &str, value: i64) -> &mut Self {
        if value <= 0 {
            self.error(field, value, "Value must be positive");
        }
        self
    }

    /// Validate `value < bound`
    pub fn validate_less_than(&mut self, field: &str, value: i64, bound_field: &str, bound: i64) -> &mut Self {
        if value >= bound {
            self.error(
                field,
                value,
                &format!("Value must be less than {} ({})", bound_field, bound),
            );
        }
        self
    }

    /// Validate non-empty string
    pub fn validate_non_empty(&mut self, field: &str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.error(field, value, "Value cannot be empty");
        }
        self
    }

    /// Validate a secret embedded in a double-quoted clause. The value is
    /// never echoed back.
    pub fn validate_secret(&mut self, field: &str, value: &str) -> &mut Self {
        if value.is_empty() {
            self.error(field, "<redacted>", "Value cannot be empty");
        } else if value.contains('"') {
            self.error(field, "<redacted>", "Value must not contain '\"'");
        }
        self
    }

    /// Validate that a name sanitizes to a usable identifier
    pub fn validate_identifier_source(&mut self, field: &str, value: &str) -> &mut Self {
        if sanitize(value.trim()).is_empty() {
            self.error(field, value, "Value does not yield a valid identifier");
        }
        self
    }

    /// Validate a regular expression
    pub fn validate_regex(&mut self, field: &str, value: &str) -> &mut Self {
        if let Err(e) = regex::Regex::new(value) {
            self.error(field, value, &format!("Invalid pattern: {}", e));
        }
        self
    }

    /// Validate path exists
    pub fn validate_path_exists(&mut self, field: &str, path: &Path) -> &mut Self {
        if !path.exists() {
            self.error(field, path.display(), "Path does not exist");
        }
        self
    }

    /// Validate that exactly one of the named options is set
    pub fn validate_exactly_one(&mut self, field: &str, options: &[(&str, bool)]) -> &mut Self {
        let set: Vec<&str> = options
            .iter()
            .filter(|(_, present)| *present)
            .map(|(name, _)| *name)
            .collect();
        if set.len() != 1 {
            let names: Vec<&str> = options.iter().map(|(name, _)| *name).collect();
            self.error(
                field,
                if set.is_empty() {
                    "none".to_string()
                } else {
                    set.join(", ")
                },
                &format!("Exactly one of {} is required", names.join(", ")),
            );
        }
        self
    }

    /// Finish validation and return result
    pub fn finish(self) -> ValidationResult {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }

    /// Check if any errors occurred
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Get current errors
    pub fn errors(&self) -> &[ConfigValidationError] {
        &self.errors
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Format validation errors for display
pub fn format_validation_errors(errors: &[ConfigValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_validation() {
        let mut v = ConfigValidator::new();
        v.validate_port("port", 1521);
        assert!(v.finish().is_ok());

        let mut v = ConfigValidator::new();
        v.validate_port("port", 0);
        assert!(v.finish().is_err());
    }

    #[test]
    fn test_multiple_errors() {
        let mut v = ConfigValidator::new();
        v.validate_port("port", 0)
            .validate_positive("limits.legacy", 0)
            .validate_non_empty("host", "  ")
            .validate_less_than("limits.legacy", 200, "limits.modern", 128);

        let errors = v.finish().unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(format_validation_errors(&errors).contains("limits.modern"));
    }

    #[test]
    fn test_secret_is_not_echoed() {
        let mut v = ConfigValidator::new();
        v.validate_secret("password", "pa\"ss");
        let errors = v.finish().unwrap_err();
        assert_eq!(errors[0].value, "<redacted>");
        assert!(!errors[0].to_string().contains("pa\"ss"));
    }

    #[test]
    fn test_exactly_one() {
        let mut v = ConfigValidator::new();
        v.validate_exactly_one("artifact", &[("ddl", true), ("ddl_file", false)]);
        assert!(!v.has_errors());

        v.validate_exactly_one("artifact", &[("ddl", true), ("ddl_file", true)])
            .validate_exactly_one("artifact", &[("ddl", false), ("ddl_file", false)]);
        assert_eq!(v.errors().len(), 2);
        assert_eq!(v.errors()[1].value, "none");
    }

    #[test]
    fn test_identifier_and_regex() {
        let mut v = ConfigValidator::new();
        v.validate_identifier_source("admin_user", "pdb_admin")
            .validate_regex("pattern", "ORA-00972");
        assert!(v.finish().is_ok());

        let mut v = ConfigValidator::new();
        v.validate_identifier_source("admin_user", " ")
            .validate_regex("pattern", "ORA-(");
        assert_eq!(v.finish().unwrap_err().len(), 2);
    }
}
