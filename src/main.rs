use anyhow::{Context, Result};
use rayon::prelude::*;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use xsd_diagnostics::cli::{Cli, Input, VerbosityLevel};
use xsd_diagnostics::config::{Config, ConfigManager};
use xsd_diagnostics::error::XsdError;
use xsd_diagnostics::file_discovery::FileDiscovery;
use xsd_diagnostics::output::Output;
use xsd_diagnostics::report::ValidationReport;
use xsd_diagnostics::validator::{ValidatorOptions, document_dir, validate_document};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    cli.validate()?;

    let config = ConfigManager::load_config(&cli)
        .await
        .context("Failed to load configuration")?;

    let verbosity = VerbosityLevel::from_flags(config.output.verbose, config.output.quiet);
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(verbosity.log_filter()))
        .init();

    let inputs = cli.inputs()?;
    let cursor = cli.cursor();
    tokio::task::spawn_blocking(move || run(inputs, cursor, &config, verbosity))
        .await
        .map_err(|e| XsdError::Concurrency {
            details: e.to_string(),
        })?
}

/// Validate every input and print the reports. Validation findings never
/// make this fail; only unreadable inputs do.
fn run(
    inputs: Vec<Input>,
    cursor: Option<(u32, u32)>,
    config: &Config,
    verbosity: VerbosityLevel,
) -> Result<()> {
    let output = Output::new(config.output.format.into(), verbosity);
    let options = ValidatorOptions::default()
        .with_warnings(config.validation.report_warnings)
        .with_cursor(cursor);

    if let [Input::Stdin] = inputs.as_slice() {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read document from stdin")?;
        let base_dir = config
            .validation
            .base_dir
            .clone()
            .unwrap_or_else(|| options.base_dir.clone());
        let report = validate_document(&text, &options.clone().with_base_dir(base_dir));
        println!("{}", output.format_report("<stdin>", &report)?);
        return Ok(());
    }

    if let [Input::Path(path)] = inputs.as_slice()
        && path.is_file()
    {
        let report = validate_file(path, config, &options)?;
        println!("{}", output.format_report(&path.display().to_string(), &report)?);
        return Ok(());
    }

    let documents = discover(&inputs, config)?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(ConfigManager::get_thread_count(config))
        .build()
        .map_err(|e| XsdError::Concurrency {
            details: e.to_string(),
        })?;
    log::debug!(
        "Validating {} documents on {} threads",
        documents.len(),
        pool.current_num_threads()
    );

    let results: Vec<(PathBuf, Result<ValidationReport>)> = pool.install(|| {
        documents
            .par_iter()
            .map(|path| (path.clone(), validate_file(path, config, &options)))
            .collect()
    });

    let stdout = std::io::stdout();
    let mut stdout = stdout.lock();
    let mut failures = 0;
    for (path, result) in results {
        match result {
            Ok(report) => writeln!(stdout, "{}", output.format_entry(&path, &report)?)?,
            Err(e) => {
                log::error!("{:#}", e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} document(s) could not be read", failures);
    }
    Ok(())
}

fn discover(inputs: &[Input], config: &Config) -> Result<Vec<PathBuf>> {
    let discovery = FileDiscovery::new()
        .with_extensions(config.files.extensions.clone())
        .with_exclude_patterns(config.files.exclude_patterns.clone());

    let mut documents = Vec::new();
    for input in inputs {
        if let Input::Path(path) = input {
            documents.extend(discovery.discover_files(path)?);
        }
    }
    Ok(documents)
}

fn validate_file(path: &Path, config: &Config, options: &ValidatorOptions) -> Result<ValidationReport> {
    let bytes = std::fs::read(path).map_err(|source| XsdError::InputUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8_lossy(&bytes);

    let base_dir = config
        .validation
        .base_dir
        .clone()
        .unwrap_or_else(|| document_dir(path));
    let report = validate_document(&text, &options.clone().with_base_dir(base_dir));
    log::info!(
        "{}: {} error(s), {} warning(s)",
        path.display(),
        report.error_count(),
        report.warning_count()
    );
    Ok(report)
}
