use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, XsdError};
use crate::schema_loader::{SchemaSourceType, determine_source_type};

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum VerbosityLevel {
    /// Only show failures
    Quiet,
    #[default]
    Normal,
    /// Also log per-document summaries
    Verbose,
}

impl VerbosityLevel {
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        if quiet {
            VerbosityLevel::Quiet
        } else if verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }

    /// Default `env_logger` filter for this verbosity
    pub fn log_filter(self) -> &'static str {
        match self {
            VerbosityLevel::Quiet => "error",
            VerbosityLevel::Normal => "warn",
            VerbosityLevel::Verbose => "debug",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// `path:line:column: severity: message` lines
    Human,
    /// The JSON report shape
    Json,
}

/// Validate XML documents against the schemas they reference
#[derive(Parser, Debug, Clone)]
#[command(name = "xsd-validate")]
#[command(
    about = "Validate XML documents against the XML Schemas named by their xsi:schemaLocation hints"
)]
#[command(version)]
pub struct Cli {
    /// Document to validate (path or file:// URI); reads stdin when absent
    #[arg(help = "Document or directory to validate; stdin when omitted")]
    pub path: Option<String>,

    /// 1-based cursor line hint
    #[arg(requires = "path")]
    pub line: Option<u32>,

    /// 1-based cursor column hint
    #[arg(requires = "line")]
    pub column: Option<u32>,

    /// Validate several documents or directories
    #[arg(long = "files", num_args = 1.., conflicts_with = "path")]
    pub files: Vec<PathBuf>,

    #[arg(short = 'f', long = "format", value_enum)]
    pub format: Option<OutputFormat>,

    /// Directory relative schema locations resolve against
    #[arg(long = "base-dir")]
    pub base_dir: Option<PathBuf>,

    /// Drop Warning issues from reports
    #[arg(long = "no-warnings")]
    pub no_warnings: bool,

    /// Configuration file (TOML or JSON)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// File extensions to process in directories (comma-separated)
    #[arg(
        short = 'e',
        long = "extensions",
        help = "File extensions to process (e.g., 'xml,cmdi')"
    )]
    pub extensions: Option<String>,

    /// Exclude file patterns (gitignore glob syntax)
    #[arg(long = "exclude", action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,

    /// Number of concurrent validation threads
    #[arg(short = 't', long = "threads")]
    pub threads: Option<usize>,

    #[arg(short = 'v', long = "verbose", help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long = "quiet",
        help = "Quiet mode",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,
}

/// One thing to validate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Stdin,
    Path(PathBuf),
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn get_extensions(&self) -> Option<Vec<String>> {
        self.extensions.as_ref().map(|extensions| {
            extensions
                .split(',')
                .map(|s| s.trim().trim_start_matches('.').to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
    }

    /// Cursor hint; a line without a column means column 1.
    pub fn cursor(&self) -> Option<(u32, u32)> {
        self.line.map(|line| (line, self.column.unwrap_or(1)))
    }

    pub fn verbosity(&self) -> VerbosityLevel {
        VerbosityLevel::from_flags(self.verbose, self.quiet)
    }

    /// Inputs named on the command line, before directory expansion
    pub fn inputs(&self) -> Result<Vec<Input>> {
        if !self.files.is_empty() {
            return Ok(self.files.iter().cloned().map(Input::Path).collect());
        }
        match &self.path {
            Some(path) => Ok(vec![Input::Path(document_path(path)?)]),
            None => Ok(vec![Input::Stdin]),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(threads) = self.threads
            && threads == 0
        {
            return Err(XsdError::InvalidInput(
                "Number of threads must be greater than 0".to_string(),
            ));
        }
        if self.line == Some(0) || self.column == Some(0) {
            return Err(XsdError::InvalidInput(
                "Line and column are 1-based".to_string(),
            ));
        }
        Ok(())
    }
}

/// Turn a document argument (path or `file://` URI) into a path
pub fn document_path(argument: &str) -> Result<PathBuf> {
    match determine_source_type(argument, Path::new("")) {
        SchemaSourceType::Local(path) => Ok(path),
        SchemaSourceType::Remote(url) => Err(XsdError::InvalidInput(format!(
            "Remote documents are not supported: {}",
            url
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_basic_cli_parsing() {
        let cli = Cli::try_parse_from(["xsd-validate", "/tmp/doc.xml", "3", "7"]).unwrap();
        assert_eq!(cli.path.as_deref(), Some("/tmp/doc.xml"));
        assert_eq!(cli.cursor(), Some((3, 7)));
        assert_eq!(
            cli.inputs().unwrap(),
            vec![Input::Path(PathBuf::from("/tmp/doc.xml"))]
        );
        assert_eq!(cli.verbosity(), VerbosityLevel::Normal);
    }

    #[test]
    fn test_stdin_when_no_path() {
        let cli = Cli::try_parse_from(["xsd-validate"]).unwrap();
        assert_eq!(cli.inputs().unwrap(), vec![Input::Stdin]);
        assert_eq!(cli.cursor(), None);
    }

    #[test]
    fn test_files_and_path_conflict() {
        assert!(Cli::try_parse_from(["xsd-validate", "a.xml", "--files", "b.xml"]).is_err());

        let cli = Cli::try_parse_from(["xsd-validate", "--files", "a.xml", "dir"]).unwrap();
        assert_eq!(cli.inputs().unwrap().len(), 2);
    }

    #[test]
    fn test_extensions_and_flags() {
        let cli = Cli::try_parse_from([
            "xsd-validate",
            "-e",
            ".xml, cmdi",
            "--format",
            "human",
            "-q",
            "doc.xml",
        ])
        .unwrap();
        assert_eq!(
            cli.get_extensions(),
            Some(vec!["xml".to_string(), "cmdi".to_string()])
        );
        assert_eq!(cli.format, Some(OutputFormat::Human));
        assert_eq!(cli.verbosity(), VerbosityLevel::Quiet);
        assert!(Cli::try_parse_from(["xsd-validate", "-q", "-v"]).is_err());
    }

    #[test]
    fn test_validate_rejects_zero() {
        let cli = Cli::try_parse_from(["xsd-validate", "doc.xml", "0"]).unwrap();
        assert!(cli.validate().is_err());
        let cli = Cli::try_parse_from(["xsd-validate", "--threads", "0"]).unwrap();
        assert!(cli.validate().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_document_path_accepts_file_uri() {
        assert_eq!(
            document_path("file:///tmp/doc.xml").unwrap(),
            PathBuf::from("/tmp/doc.xml")
        );
        assert!(document_path("https://example.com/doc.xml").is_err());
    }
}
