//! Problem accumulation model
//!
//! Every validator returns a [`ValidationReport`] instead of failing on the
//! first defective resource. A [`Problem`] is one immutable text finding
//! scoped to a single resource; order is insertion order, so a report built
//! from the same cluster snapshot twice is byte-identical.

use std::fmt;

use serde::Serialize;

/// One validation finding, e.g. `"nonprod/web-abc123: CrashLoopBackOff"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Problem(String);

impl Problem {
    pub fn new(text: impl Into<String>) -> Self {
        Problem(text.into())
    }

    /// Problem scoped to `namespace/name`.
    pub fn scoped(namespace: &str, name: &str, reason: impl fmt::Display) -> Self {
        Problem(format!("{namespace}/{name}: {reason}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of one validator call.
///
/// `problems` are hard findings; `warnings` are findings downgraded by an
/// exclusion rule (failed jobs matching an exclusion pattern). `scanned` is
/// the number of resources actually evaluated — resources skipped by an
/// explicit scope-narrowing rule (terminal job pods, ingresses without a
/// load balancer IP) are not counted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub problems: Vec<Problem>,
    pub warnings: Vec<Problem>,
    pub scanned: usize,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, problem: Problem) {
        self.problems.push(problem);
    }

    pub fn warn(&mut self, warning: Problem) {
        self.warnings.push(warning);
    }

    /// True when no hard problems were found (warnings do not count).
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }

    /// Merge another report into this one, preserving order.
    pub fn absorb(&mut self, other: ValidationReport) {
        self.problems.extend(other.problems);
        self.warnings.extend(other.warnings);
        self.scanned += other.scanned;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoped_problem_formats_namespace_and_name() {
        let p = Problem::scoped("nonprod", "web", "Phase=Failed");
        assert_eq!(p.as_str(), "nonprod/web: Phase=Failed");
    }

    #[test]
    fn warnings_do_not_make_a_report_dirty() {
        let mut report = ValidationReport::new();
        report.warn(Problem::new("excluded job failed"));
        assert!(report.is_clean());
        report.push(Problem::new("real failure"));
        assert!(!report.is_clean());
    }

    #[test]
    fn absorb_preserves_insertion_order() {
        let mut a = ValidationReport::new();
        a.push(Problem::new("first"));
        a.scanned = 1;
        let mut b = ValidationReport::new();
        b.push(Problem::new("second"));
        b.scanned = 2;
        a.absorb(b);
        assert_eq!(a.problems[0].as_str(), "first");
        assert_eq!(a.problems[1].as_str(), "second");
        assert_eq!(a.scanned, 3);
    }
}
