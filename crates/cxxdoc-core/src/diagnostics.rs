//! Diagnostics collected while normalizing, resolving and post-processing
//!
//! Best-effort stages never fail on unexpected input; they return an
//! [`Outcome`] carrying the best available value plus whatever they had to
//! complain about. Everything ends up in a [`Report`] that is sorted before
//! it is handed out, so two runs over the same input report identically.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How serious a diagnostic is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A single message about a page or a symbol
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Page file name or member/compound id the message is about
    pub subject: String,
    pub message: String,
}

impl Diagnostic {
    #[must_use]
    pub fn new(severity: Severity, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            subject: subject.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn info(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, subject, message)
    }

    #[must_use]
    pub fn warning(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, subject, message)
    }

    #[must_use]
    pub fn error(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, subject, message)
    }

    /// Re-target the diagnostic at a different subject
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.severity, self.subject, self.message)
    }
}

/// A best-effort result: the value is always usable
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    pub value: T,
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> Outcome<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            value,
            diagnostics: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_diagnostics(value: T, diagnostics: Vec<Diagnostic>) -> Self {
        Self { value, diagnostics }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            diagnostics: self.diagnostics,
        }
    }

    /// Split into the value and the diagnostics, appending the latter to `sink`
    pub fn drain_into(self, sink: &mut Vec<Diagnostic>) -> T {
        sink.extend(self.diagnostics);
        self.value
    }
}

/// A unit (page, XML file, revision) that could not be processed
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FailedUnit {
    pub unit: String,
    pub reason: String,
}

/// Consolidated outcome of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub diagnostics: Vec<Diagnostic>,
    pub failed_units: Vec<FailedUnit>,
    pub pages_processed: usize,
    pub pages_changed: usize,
}

impl Report {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.diagnostics.extend(diagnostics);
    }

    pub fn fail_unit(&mut self, unit: impl Into<String>, reason: impl Into<String>) {
        self.failed_units.push(FailedUnit {
            unit: unit.into(),
            reason: reason.into(),
        });
    }

    /// Fold another report into this one
    pub fn merge(&mut self, other: Report) {
        self.diagnostics.extend(other.diagnostics);
        self.failed_units.extend(other.failed_units);
        self.pages_processed += other.pages_processed;
        self.pages_changed += other.pages_changed;
    }

    /// Order everything by subject so the report is independent of scheduling
    pub fn sort(&mut self) {
        self.diagnostics
            .sort_by(|a, b| (&a.subject, a.severity, &a.message).cmp(&(&b.subject, b.severity, &b.message)));
        self.diagnostics.dedup();
        self.failed_units.sort();
    }

    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    /// Whether the run counts as successful
    ///
    /// Failed units and error diagnostics always fail a run. In strict mode
    /// warnings do too; the run still completes and reports everything.
    #[must_use]
    pub fn is_success(&self, strict: bool) -> bool {
        if !self.failed_units.is_empty() || self.count(Severity::Error) > 0 {
            return false;
        }
        !(strict && self.count(Severity::Warning) > 0)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_promotes_warnings() {
        let mut report = Report::new();
        report.push(Diagnostic::warning("a.html", "dead anchor"));
        assert!(report.is_success(false));
        assert!(!report.is_success(true));
    }

    #[test]
    fn test_failed_unit_always_fails() {
        let mut report = Report::new();
        report.fail_unit("b.html", "unreadable");
        assert!(!report.is_success(false));
    }

    #[test]
    fn test_sort_is_stable_across_insert_order() {
        let mut a = Report::new();
        a.push(Diagnostic::warning("z.html", "one"));
        a.push(Diagnostic::info("a.html", "two"));
        let mut b = Report::new();
        b.push(Diagnostic::info("a.html", "two"));
        b.push(Diagnostic::warning("z.html", "one"));
        a.sort();
        b.sort();
        assert_eq!(a, b);
        assert_eq!(a.diagnostics[0].subject, "a.html");
    }

    #[test]
    fn test_report_json_shape() {
        let mut report = Report::new();
        report.push(Diagnostic::warning("page.html", "msg"));
        let json = report.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["diagnostics"][0]["severity"], "warning");
        assert_eq!(value["diagnostics"][0]["subject"], "page.html");
    }
}
