//! # Rollback Guard
//!
//! Removes a freshly created object when the run leaves early. Armed right
//! after creation; disarmed once the object is either torn down explicitly
//! or handed over as long-lived. Rollback is best effort: each statement is
//! attempted and failures are only logged.

use super::reporter::Reporter;
use crate::connection::Connection;

pub struct RollbackGuard<'a> {
    conn: &'a dyn Connection,
    reporter: &'a dyn Reporter,
    object: String,
    statements: Vec<String>,
    armed: bool,
}

impl<'a> RollbackGuard<'a> {
    /// Guard `object`, undone by running `statements` in order
    pub fn arm(
        conn: &'a dyn Connection,
        reporter: &'a dyn Reporter,
        object: impl Into<String>,
        statements: Vec<String>,
    ) -> Self {
        let object = object.into();
        tracing::debug!(%object, "rollback armed");
        Self {
            conn,
            reporter,
            object,
            statements,
            armed: true,
        }
    }

    pub fn disarm(&mut self) {
        if self.armed {
            tracing::debug!(object = %self.object, "rollback disarmed");
        }
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    fn rollback(&mut self) {
        self.armed = false;
        tracing::warn!(object = %self.object, "rolling back");

        let mut failures = 0;
        for sql in &self.statements {
            if let Err(err) = self.conn.execute(sql, &[]) {
                failures += 1;
                tracing::warn!(object = %self.object, %sql, error = %err, "rollback statement failed");
            }
        }

        if failures == 0 {
            self.reporter
                .warn(&format!("rolled back {}", self.object));
        } else {
            self.reporter.warn(&format!(
                "rollback of {} incomplete ({} of {} statement(s) failed)",
                self.object,
                failures,
                self.statements.len()
            ));
        }
    }
}

impl Drop for RollbackGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.rollback();
        }
    }
}
