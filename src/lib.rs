//! # xsd-diagnostics
//!
//! Streaming XML Schema validation of single documents, with the results
//! turned into editor diagnostics for a Language Server Protocol front end.
//!
//! A document names its schemas through `xsi:schemaLocation` and
//! `xsi:noNamespaceSchemaLocation` hints; [`validate_document`] discovers and
//! compiles them while reading the document once, and reports every problem
//! as a [`ValidationIssue`]. [`diagnostics::to_diagnostics`] maps such a
//! report onto 0-based editor ranges.

pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod file_discovery;
pub mod lsp;
pub mod output;
pub mod position;
pub mod report;
pub mod schema;
pub mod schema_loader;
pub mod validator;

pub use cli::{Cli, OutputFormat, VerbosityLevel};
pub use config::{Config, ConfigError, ConfigManager};
pub use diagnostics::{DiagnosticRange, compute_range, to_diagnostics};
pub use error::{SchemaError, XsdError};
pub use file_discovery::FileDiscovery;
pub use output::Output;
pub use report::{Severity, ValidationIssue, ValidationReport};
pub use schema::{SchemaSet, SchemaSource};
pub use schema_loader::{FsSchemaSource, SchemaReference, SchemaSourceType};
pub use validator::{ValidatorOptions, validate_document};
