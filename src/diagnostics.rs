//! Turns validation reports into editor diagnostics.
//!
//! Ranges are inferred from the message text: the validator names the
//! offending token in its prose, so the highlight width is recovered by
//! string matching. This breaks silently if the message wording changes.

use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, Position, Range};

use crate::position::LineIndex;
use crate::report::{Severity, ValidationIssue, ValidationReport};

pub const DEFAULT_SOURCE: &str = "xsd";

const UNKNOWN_ELEMENT_PREFIX: &str = "Could not find schema information for the element";

/// 0-based highlight range of one issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticRange {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl From<DiagnosticRange> for Range {
    fn from(range: DiagnosticRange) -> Self {
        Range::new(
            Position::new(range.start_line, range.start_column),
            Position::new(range.end_line, range.end_column),
        )
    }
}

/// Compute the highlight range for `issue`; `lines` holds the document's lines
/// without terminators.
pub fn compute_range(issue: &ValidationIssue, lines: &[&str]) -> DiagnosticRange {
    let line = issue.line.saturating_sub(1);
    let mut range = DiagnosticRange {
        start_line: line,
        start_column: issue.column.saturating_sub(1),
        end_line: issue.line,
        end_column: 0,
    };

    if issue.message.starts_with(UNKNOWN_ELEMENT_PREFIX) {
        // Highlight the element name: up to the next space from the reported column.
        let column = issue.column as usize;
        let space = lines.get(line as usize).and_then(|text| {
            text.chars()
                .enumerate()
                .skip(column)
                .find(|(_, c)| *c == ' ')
                .map(|(index, _)| index)
        });
        if let Some(index) = space
            && index > column
        {
            range.end_line = line;
            range.end_column = index as u32;
        }
    } else if let Some(token) = quoted_token(&issue.message) {
        range.end_line = line;
        range.end_column = issue.column.saturating_sub(1) + token.chars().count() as u32;
    }

    range
}

/// The first single-quoted token, unless the message starts with the quote.
fn quoted_token(message: &str) -> Option<&str> {
    let open = message.find('\'')?;
    if open == 0 {
        return None;
    }
    let rest = &message[open + 1..];
    let close = rest.find('\'')?;
    Some(&rest[..close])
}

pub fn to_lsp_severity(severity: Severity) -> DiagnosticSeverity {
    match severity {
        Severity::Error => DiagnosticSeverity::ERROR,
        Severity::Warning => DiagnosticSeverity::WARNING,
    }
}

/// One diagnostic per issue, in report order, tagged with [`DEFAULT_SOURCE`].
pub fn to_diagnostics(report: &ValidationReport, text: &str) -> Vec<Diagnostic> {
    to_diagnostics_with_source(report, text, DEFAULT_SOURCE)
}

pub fn to_diagnostics_with_source(
    report: &ValidationReport,
    text: &str,
    source: &str,
) -> Vec<Diagnostic> {
    let index = LineIndex::new(text);
    let lines: Vec<&str> = (0..index.line_count())
        .filter_map(|line| index.line_text(line))
        .collect();
    report
        .issues
        .iter()
        .map(|issue| Diagnostic {
            range: compute_range(issue, &lines).into(),
            severity: Some(to_lsp_severity(issue.severity)),
            source: Some(source.to_string()),
            message: issue.message.clone(),
            ..Default::default()
        })
        .collect()
}
