//! # Progress Reporter
//!
//! Human-readable progress lines, one per phase or item. Structured
//! diagnostics go through `tracing`; these lines are the operator's view.

use std::sync::Mutex;

/// Leading marker of a progress line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Ok,
    Warn,
    Info,
    Fail,
    Step,
    Summary,
    Test,
    Dropped,
}

impl Marker {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Ok => "✅",
            Self::Warn => "⚠️",
            Self::Info => "ℹ️",
            Self::Fail => "❌",
            Self::Step => "▶",
            Self::Summary => "📊",
            Self::Test => "🧪",
            Self::Dropped => "🗑️",
        }
    }
}

/// Sink for progress lines
pub trait Reporter: Send + Sync {
    fn line(&self, marker: Marker, message: &str);

    fn ok(&self, message: &str) {
        self.line(Marker::Ok, message);
    }

    fn warn(&self, message: &str) {
        self.line(Marker::Warn, message);
    }

    fn info(&self, message: &str) {
        self.line(Marker::Info, message);
    }

    fn fail(&self, message: &str) {
        self.line(Marker::Fail, message);
    }

    fn step(&self, message: &str) {
        self.line(Marker::Step, message);
    }
}

/// Writes progress lines to stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn line(&self, marker: Marker, message: &str) {
        println!("{} {}", marker.symbol(), message);
    }
}

/// Keeps progress lines in memory (for testing)
#[derive(Debug, Default)]
pub struct RecordingReporter {
    lines: Mutex<Vec<(Marker, String)>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(Marker, String)> {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Whether any line with `marker` contains `needle`
    pub fn contains(&self, marker: Marker, needle: &str) -> bool {
        self.lines()
            .iter()
            .any(|(m, line)| *m == marker && line.contains(needle))
    }

    pub fn count(&self, marker: Marker) -> usize {
        self.lines().iter().filter(|(m, _)| *m == marker).count()
    }
}

impl Reporter for RecordingReporter {
    fn line(&self, marker: Marker, message: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((marker, message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_reporter() {
        let reporter = RecordingReporter::new();
        reporter.ok("created PDB_X");
        reporter.fail("grant role DBA");
        reporter.line(Marker::Summary, "roles granted OK=1, failed=1");

        assert_eq!(reporter.lines().len(), 3);
        assert!(reporter.contains(Marker::Ok, "PDB_X"));
        assert!(!reporter.contains(Marker::Ok, "DBA"));
        assert_eq!(reporter.count(Marker::Fail), 1);
    }

    #[test]
    fn test_marker_symbols() {
        assert_eq!(Marker::Ok.symbol(), "✅");
        assert_eq!(Marker::Fail.symbol(), "❌");
    }
}
