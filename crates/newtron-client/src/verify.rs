//! Post-write verification results.

use newtron_configdb::{Change, ChangeKind, FieldValues};
use std::fmt;

/// Verification outcome for one change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationCheck {
    pub table: String,
    pub key: String,
    pub kind: ChangeKind,
    pub passed: bool,
    /// The row state the change expected; `None` means absent.
    pub expected: Option<FieldValues>,
    /// What the device actually held; `None` means absent.
    pub observed: Option<FieldValues>,
}

impl VerificationCheck {
    /// Compares a change's expected post-state with an observed row.
    pub fn evaluate(change: &Change, observed: Option<FieldValues>) -> Self {
        let expected = change.expected_fields().cloned();
        let passed = match (&expected, &observed) {
            // expected fields must be present with matching values;
            // extra fields written by the device are tolerated
            (Some(expected), Some(observed)) => expected
                .iter()
                .all(|(field, value)| observed.get(field) == Some(value)),
            (None, None) => true,
            _ => false,
        };
        VerificationCheck {
            table: change.table.clone(),
            key: change.key.clone(),
            kind: change.kind,
            passed,
            expected,
            observed,
        }
    }
}

impl fmt::Display for VerificationCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.passed { "ok" } else { "FAIL" };
        write!(f, "[{}] {} {}|{}", status, self.kind, self.table, self.key)
    }
}

/// Verification outcome for a whole change set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationResult {
    pub checks: Vec<VerificationCheck>,
}

impl VerificationResult {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &VerificationCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "verification: {}/{} passed",
            self.checks.len() - self.failure_count(),
            self.checks.len()
        )?;
        for check in &self.checks {
            writeln!(f, "  {}", check)?;
        }
        Ok(())
    }
}
