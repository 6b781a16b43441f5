//! # Name Generation
//!
//! Timestamp-derived base names for principals and tenancies. Names are
//! distinct at practical run cadence, not globally unique; callers check
//! for collisions.

use chrono::{DateTime, Datelike, Timelike, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Produces base names from a prefix
pub trait NameGenerator: Send + Sync {
    fn generate(&self, prefix: &str) -> String;
}

/// Layout of the timestamp part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameStyle {
    /// `prefix_2025_008_004_010_033_019`: three-digit fields, second resolution
    Padded,
    /// `prefix_20250804_103319_123456`: microsecond resolution
    Subsecond,
}

/// Names from the current UTC time
#[derive(Debug, Clone, Copy)]
pub struct TimestampNameGenerator {
    style: NameStyle,
}

impl TimestampNameGenerator {
    pub fn new(style: NameStyle) -> Self {
        Self { style }
    }

    /// Tenancy names
    pub fn tenancy() -> Self {
        Self::new(NameStyle::Padded)
    }

    /// Principal names
    pub fn principal() -> Self {
        Self::new(NameStyle::Subsecond)
    }

    pub fn format_at(&self, prefix: &str, at: DateTime<Utc>) -> String {
        match self.style {
            NameStyle::Padded => format!(
                "{}_{:04}_{:03}_{:03}_{:03}_{:03}_{:03}",
                prefix,
                at.year(),
                at.month(),
                at.day(),
                at.hour(),
                at.minute(),
                at.second()
            ),
            NameStyle::Subsecond => format!(
                "{}_{}_{:06}",
                prefix,
                at.format("%Y%m%d_%H%M%S"),
                at.timestamp_subsec_micros()
            ),
        }
    }
}

impl NameGenerator for TimestampNameGenerator {
    fn generate(&self, prefix: &str) -> String {
        self.format_at(prefix, Utc::now())
    }
}

/// Hands out a fixed sequence of suffixes (for testing)
#[derive(Debug, Default)]
pub struct SequenceNameGenerator {
    suffixes: Mutex<VecDeque<String>>,
}

impl SequenceNameGenerator {
    pub fn new<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            suffixes: Mutex::new(suffixes.into_iter().map(Into::into).collect()),
        }
    }
}

impl NameGenerator for SequenceNameGenerator {
    /// Repeats the last suffix once the sequence is exhausted
    fn generate(&self, prefix: &str) -> String {
        let mut suffixes = self.suffixes.lock().unwrap_or_else(|e| e.into_inner());
        let suffix = if suffixes.len() > 1 {
            suffixes.pop_front().unwrap_or_default()
        } else {
            suffixes.front().cloned().unwrap_or_default()
        };
        format!("{}_{}", prefix, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_padded_style() {
        let at = Utc.with_ymd_and_hms(2025, 8, 4, 10, 33, 19).unwrap();
        let name = TimestampNameGenerator::tenancy().format_at("pdb", at);
        assert_eq!(name, "pdb_2025_008_004_010_033_019");
    }

    #[test]
    fn test_subsecond_style() {
        let at = Utc.with_ymd_and_hms(2025, 8, 4, 10, 33, 19).unwrap()
            + chrono::Duration::microseconds(1234);
        let name = TimestampNameGenerator::principal().format_at("user_slash_schema", at);
        assert_eq!(name, "user_slash_schema_20250804_103319_001234");
    }

    #[test]
    fn test_sequence_generator() {
        let generator = SequenceNameGenerator::new(["a", "b"]);
        assert_eq!(generator.generate("p"), "p_a");
        assert_eq!(generator.generate("p"), "p_b");
        assert_eq!(generator.generate("p"), "p_b");
    }
}
