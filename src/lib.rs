pub mod cli;
pub mod config;
pub mod display;
pub mod filter;
pub mod reader;
pub mod record;

pub use cli::{Cli, ColorMode, Commands, OutputFormat, cli_parse};
pub use filter::{
    FilterField, FilterNode, FilterParseError, FilterParser, MasterFilter, PackageNamesProvider,
    StaticPackageNames, SystemClock, TextRange,
};
pub use reader::{ReadError, parse_log_text, read_log_file};
pub use record::{LogHeader, LogLevel, LogRecord, RecordView, format_line};

use anyhow::{Context, Result, anyhow, bail};
use chrono::{Datelike, FixedOffset, Local};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Build the master filter from an optional expression. A parse failure is
/// reported with a caret diagnostic pointing into the expression.
fn build_master_filter(expression: Option<&str>, packages: Vec<String>) -> Result<MasterFilter> {
    let Some(text) = expression else {
        return Ok(MasterFilter::new(None));
    };
    let parser = FilterParser::new(
        Arc::new(StaticPackageNames::new(packages)),
        Arc::new(SystemClock),
    );
    let node = parser
        .parse(text)
        .map_err(|err| anyhow!("{}", display::render_parse_error(text, &err)))?;
    Ok(MasterFilter::new(node))
}

fn project_packages(config: &config::SieveConfig, extra: &[String]) -> Vec<String> {
    config
        .project_packages
        .iter()
        .chain(extra.iter())
        .cloned()
        .collect()
}

fn read_and_merge(files: &[PathBuf], zone: FixedOffset, base_year: i32) -> Result<Vec<LogRecord>> {
    let mut records = Vec::new();
    for file in files {
        let mut parsed = read_log_file(file, zone, base_year)?;
        records.append(&mut parsed);
    }
    // Stable sort: within one file the original order is untouched.
    if files.len() > 1 {
        records.sort_by_key(|record| record.header.timestamp);
    }
    Ok(records)
}

fn write_output_file(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write output file '{}'", path.display()))
}

pub fn run() -> Result<()> {
    let cli = cli_parse();
    let config = config::load_config(cli.config.as_deref()).context("Failed to load config")?;

    // Set up color handling based on user preference
    match cli.color {
        ColorMode::Always => unsafe {
            std::env::set_var("CLICOLOR_FORCE", "1");
        },
        ColorMode::Never => unsafe {
            std::env::set_var("NO_COLOR", "1");
        },
        ColorMode::Auto => {}
    }

    let zone: FixedOffset = if cli.utc {
        FixedOffset::east_opt(0).expect("valid offset")
    } else {
        *Local::now().offset()
    };
    let filter_text = cli.filter.clone().or_else(|| config.default_filter.clone());

    if cli.verbose > 0 && !cli.quiet {
        eprintln!("Verbosity level: {}", cli.verbose);
        if let Some(ref expression) = filter_text {
            eprintln!("Filter: {expression}");
        }
        eprintln!("Config profile: {}", config.profile_name);
        if let Some(config_path) = &cli.config {
            eprintln!("Config file: {}", config_path.display());
        }
    }

    match &cli.command {
        Commands::Sift {
            files,
            package,
            year,
        } => {
            let mut master =
                build_master_filter(filter_text.as_deref(), project_packages(&config, package))?;
            let records =
                read_and_merge(files, zone, year.unwrap_or_else(|| Local::now().year()))?;
            let kept = master.filter(&records, zone);

            match cli.format {
                OutputFormat::Text => {
                    display::print_records(&kept, zone);
                    if let Some(path) = &cli.output {
                        write_output_file(path, &display::render_records_text(&kept, zone))?;
                    }
                }
                OutputFormat::Json => {
                    let json = display::render_records_json(&kept);
                    println!("{json}");
                    if let Some(path) = &cli.output {
                        write_output_file(path, &json)?;
                    }
                }
            }

            if cli.verbose > 0 && !cli.quiet {
                eprintln!("Retained {} of {} records", kept.len(), records.len());
            }
        }
        Commands::Stats {
            files,
            package,
            year,
        } => {
            let mut master =
                build_master_filter(filter_text.as_deref(), project_packages(&config, package))?;
            let records =
                read_and_merge(files, zone, year.unwrap_or_else(|| Local::now().year()))?;
            let kept = master.filter(&records, zone);

            let rendered = match cli.format {
                OutputFormat::Text => display::render_stats_text(&kept),
                OutputFormat::Json => display::render_stats_json(&kept),
            };
            print!("{rendered}");
            if cli.format == OutputFormat::Json {
                println!();
            }
            if let Some(path) = &cli.output {
                write_output_file(path, &rendered)?;
            }
        }
        Commands::Check { expression } => {
            let parser = FilterParser::new(
                Arc::new(StaticPackageNames::new(config.project_packages.clone())),
                Arc::new(SystemClock),
            );
            match parser.parse(expression) {
                Ok(None) => {
                    if !cli.quiet {
                        println!("blank filter: every record matches");
                    }
                }
                Ok(Some(node)) => {
                    if !cli.quiet {
                        match node.filter_name() {
                            Some(name) => println!("ok: filter '{name}' is valid"),
                            None => println!("ok: filter is valid"),
                        }
                    }
                }
                Err(err) => bail!("{}", display::render_parse_error(expression, &err)),
            }
        }
    }

    Ok(())
}
