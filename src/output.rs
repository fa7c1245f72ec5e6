//! Report output for the command line.

use serde::Serialize;
use std::path::Path;

use crate::cli::{OutputFormat, VerbosityLevel};
use crate::report::{Severity, ValidationIssue, ValidationReport};

/// One line of multi-document JSON output
#[derive(Serialize)]
struct PathReport<'a> {
    #[serde(rename = "Path")]
    path: String,
    #[serde(flatten)]
    report: &'a ValidationReport,
}

/// Report formatter for one CLI invocation
pub struct Output {
    format: OutputFormat,
    verbosity: VerbosityLevel,
    show_colors: bool,
}

impl Output {
    pub fn new(format: OutputFormat, verbosity: VerbosityLevel) -> Self {
        Self {
            format,
            verbosity,
            show_colors: atty::is(atty::Stream::Stdout),
        }
    }

    pub fn with_colors(mut self, show_colors: bool) -> Self {
        self.show_colors = show_colors;
        self
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    /// Output for a single document: the pretty-printed report in JSON mode.
    pub fn format_report(
        &self,
        name: &str,
        report: &ValidationReport,
    ) -> serde_json::Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report),
            OutputFormat::Human => Ok(self.format_human(name, report)),
        }
    }

    /// Output for one of several documents: a single JSON line carrying `Path`.
    pub fn format_entry(&self, path: &Path, report: &ValidationReport) -> serde_json::Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string(&PathReport {
                path: path.display().to_string(),
                report,
            }),
            OutputFormat::Human => Ok(self.format_human(&path.display().to_string(), report)),
        }
    }

    fn format_human(&self, name: &str, report: &ValidationReport) -> String {
        let mut output = String::new();
        for issue in &report.issues {
            output.push_str(&self.format_issue(name, issue));
            output.push('\n');
        }

        if self.verbosity != VerbosityLevel::Quiet {
            let errors = report.error_count();
            let warnings = report.warning_count();
            let summary = if report.is_clean() {
                self.colorize("valid", "32")
            } else {
                format!(
                    "{} error{}, {} warning{}",
                    errors,
                    if errors == 1 { "" } else { "s" },
                    warnings,
                    if warnings == 1 { "" } else { "s" },
                )
            };
            output.push_str(&format!("{}: {}\n", name, summary));
        }
        output
    }

    pub fn format_issue(&self, name: &str, issue: &ValidationIssue) -> String {
        let severity = match issue.severity {
            Severity::Error => self.colorize("error", "31"),
            Severity::Warning => self.colorize("warning", "33"),
        };
        format!(
            "{}:{}:{}: {}: {}",
            name, issue.line, issue.column, severity, issue.message
        )
    }
}
