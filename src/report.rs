//! Validation results and their JSON wire shape.

use serde::{Deserialize, Serialize};

/// Severity of a validation issue, passed through unchanged from the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// One schema violation or well-formedness error; positions are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    #[serde(rename = "Severity")]
    pub severity: Severity,
    #[serde(rename = "Message")]
    pub message: String,
    #[serde(rename = "LineNumber")]
    pub line: u32,
    #[serde(rename = "LinePosition")]
    pub column: u32,
}

impl ValidationIssue {
    pub fn error(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            line,
            column,
        }
    }

    pub fn warning(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            line,
            column,
        }
    }
}

/// Result of one validation run, in discovery order.
///
/// The `Recommentations` spelling is kept for wire compatibility with
/// existing consumers of the JSON output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    #[serde(rename = "Errors")]
    pub issues: Vec<ValidationIssue>,
    #[serde(rename = "Recommentations", default)]
    pub recommendations: Vec<String>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|issue| issue.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|issue| issue.severity == Severity::Warning)
            .count()
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}
