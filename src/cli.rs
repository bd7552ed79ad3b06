use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// A tool to sift Android logcat output through filter expressions
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Filter expression (e.g. "tag:net level:WARN | is:crash")
    #[arg(short, long, global = true, env = "LOGSIEVE_FILTER")]
    pub filter: Option<String>,

    /// Path to a logsieve.toml config file
    #[arg(long, global = true, env = "LOGSIEVE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short = 'F', long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// When to color terminal output
    #[arg(long, global = true, value_enum, default_value = "auto")]
    pub color: ColorMode,

    /// Also write the output to this file (uncolored)
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Print extra diagnostics to stderr (repeatable)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Interpret and render timestamps in UTC instead of local time
    #[arg(long, global = true)]
    pub utc: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read log files and print the records that pass the filter
    Sift {
        /// Log files, merged in timestamp order when more than one is given
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Project package name for `package:mine` (repeatable; extends the
        /// config's project_packages)
        #[arg(short, long)]
        package: Vec<String>,

        /// Base year for timestamps in formats that do not carry one
        /// [default: the current year]
        #[arg(long)]
        year: Option<i32>,
    },
    /// Summarize levels and tags of the records that pass the filter
    Stats {
        /// Log files, merged in timestamp order when more than one is given
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Project package name for `package:mine` (repeatable)
        #[arg(short, long)]
        package: Vec<String>,

        /// Base year for timestamps in formats that do not carry one
        #[arg(long)]
        year: Option<i32>,
    },
    /// Validate a filter expression and pinpoint any error
    Check {
        /// The filter expression to validate
        expression: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

pub fn cli_parse() -> Cli {
    Cli::parse()
}
