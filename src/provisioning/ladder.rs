//! # Retry Ladder
//!
//! Retries object creation with progressively shorter identifiers when the
//! server rejects the name as too long. It only truncates; it never invents
//! a new name. Every other failure is fatal on the spot.

use regex::Regex;

use super::errors::{ProvisionError, ProvisionResult};
use super::identifier::{truncate, IdentifierLimits};
use crate::connection::ConnectionResult;

/// Default server error code for an over-long identifier
pub const LENGTH_VIOLATION_PATTERN: &str = "ORA-00972";

/// Classified outcome of a failed statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    LengthViolation,
    Other,
}

/// Maps server error text to an `ErrorClass`
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, message: &str) -> ErrorClass;
}

#[derive(Debug, Clone)]
enum Matcher {
    Code(String),
    Pattern(Regex),
}

/// Classifies by searching the error text for a server code or a regex
#[derive(Debug, Clone)]
pub struct PatternClassifier {
    matcher: Matcher,
}

impl PatternClassifier {
    /// Case-insensitive regex match
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            matcher: Matcher::Pattern(Regex::new(&format!("(?i){}", pattern))?),
        })
    }

    /// Literal error code match, e.g. `ORA-00972`
    pub fn code(code: &str) -> Self {
        Self {
            matcher: Matcher::Code(code.to_uppercase()),
        }
    }
}

impl Default for PatternClassifier {
    fn default() -> Self {
        Self::code(LENGTH_VIOLATION_PATTERN)
    }
}

impl ErrorClassifier for PatternClassifier {
    fn classify(&self, message: &str) -> ErrorClass {
        let matched = match &self.matcher {
            Matcher::Code(code) => message.to_uppercase().contains(code.as_str()),
            Matcher::Pattern(re) => re.is_match(message),
        };
        if matched {
            ErrorClass::LengthViolation
        } else {
            ErrorClass::Other
        }
    }
}

/// Result of a successful ladder run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LadderOutcome {
    /// Identifier the object was created with; use it from here on
    pub identifier: String,
    pub attempts: usize,
}

impl LadderOutcome {
    pub fn was_shortened(&self) -> bool {
        self.attempts > 1
    }
}

/// Length-cap retry ladder
pub struct RetryLadder<'a> {
    limits: IdentifierLimits,
    classifier: &'a dyn ErrorClassifier,
}

impl<'a> RetryLadder<'a> {
    pub fn new(limits: IdentifierLimits, classifier: &'a dyn ErrorClassifier) -> Self {
        Self { limits, classifier }
    }

    /// Run `attempt` with `identifier`, truncating through the caps on
    /// length violations.
    pub fn create<F>(&self, step: &str, identifier: &str, mut attempt: F) -> ProvisionResult<LadderOutcome>
    where
        F: FnMut(&str) -> ConnectionResult<()>,
    {
        let mut current = identifier.to_string();
        let mut caps = self.limits.ladder().into_iter();
        let mut attempts = 0;

        loop {
            attempts += 1;
            let err = match attempt(&current) {
                Ok(()) => {
                    return Ok(LadderOutcome {
                        identifier: current,
                        attempts,
                    })
                }
                Err(err) => err,
            };

            if err.is_connectivity() {
                return Err(ProvisionError::at_step(step, err));
            }
            let message = err.to_string();
            if self.classifier.classify(&message) == ErrorClass::Other {
                return Err(ProvisionError::at_step(step, err));
            }

            let Some(cap) = caps.next() else {
                return Err(ProvisionError::IdentifierTooLong {
                    identifier: current,
                    message,
                });
            };
            let shorter = truncate(&current, cap);
            if shorter == current {
                return Err(ProvisionError::IdentifierTooLong {
                    identifier: current,
                    message,
                });
            }

            tracing::warn!(
                step,
                from = %current,
                to = %shorter,
                cap,
                "identifier too long, retrying shortened"
            );
            current = shorter;
        }
    }
}
