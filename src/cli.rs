//! Command-line interface argument parsing.
//!
//! Options that can also come from `.wordfan.toml` are optional here so the
//! config file only loses to values actually given on the command line.

use crate::models::SessionMode;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// wordfan - fan a word count out over serverless workers
///
/// Splits a text file into units, sends each unit to a word-count worker
/// behind a Fission router, and reads the merged counts back from the
/// state manager.
///
/// Examples:
///   wordfan input.txt 5
///   wordfan input.txt 5 --session my-run --reuse
///   wordfan input.txt --split word --workers 8 --default-session
///   cat input.txt | wordfan - 4 --format markdown --output run.md
///   wordfan --list-sessions
///   wordfan --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Text file to count, or `-` to read stdin
    #[arg(
        value_name = "INPUT",
        required_unless_present_any = ["init_config", "list_sessions"]
    )]
    pub input: Option<String>,

    /// Number of chunks to split the input into
    ///
    /// Ignored with `--split word`. Default: from config or 3.
    #[arg(value_name = "CHUNKS")]
    pub chunks: Option<usize>,

    /// Session id to count under
    ///
    /// A fresh `wordcount-xxxxxxxx` id is generated when omitted.
    #[arg(short, long, value_name = "ID")]
    pub session: Option<String>,

    /// Accumulate into an existing session instead of starting fresh
    #[arg(long, conflicts_with = "default_session")]
    pub reuse: bool,

    /// Reset and use the shared default session
    ///
    /// Not safe to combine with other runs using the default session.
    #[arg(long, conflicts_with = "reuse")]
    pub default_session: bool,

    /// Maximum concurrent worker calls (default: one per unit)
    #[arg(short, long, value_name = "N")]
    pub workers: Option<usize>,

    /// How to split the input into units
    #[arg(long, value_name = "POLICY")]
    pub split: Option<SplitMode>,

    /// Fission router base URL
    #[arg(long, value_name = "URL", env = "FISSION_ROUTER")]
    pub router: Option<String>,

    /// Per-call timeout in seconds (default: from config or 30)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Output file path for the run report
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (json, markdown)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Number of top words to print
    #[arg(long, value_name = "K")]
    pub top: Option<usize>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .wordfan.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Split the input and show the planned units without calling the router
    #[arg(long)]
    pub dry_run: bool,

    /// List the sessions held by the state manager and exit
    #[arg(long)]
    pub list_sessions: bool,

    /// Exit with code 2 if any unit failed
    #[arg(long)]
    pub fail_on_unit_error: bool,

    /// Generate a default .wordfan.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON format (default)
    #[default]
    Json,
    /// Markdown format
    Markdown,
}

/// Splitting policy selector.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SplitMode {
    /// A fixed number of word-aligned chunks (default)
    #[default]
    Chunks,
    /// One unit per word
    Word,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Whether the input should be read from stdin.
    pub fn reads_stdin(&self) -> bool {
        self.input.as_deref() == Some("-")
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.chunks == Some(0) {
            return Err("Number of chunks must be at least 1".to_string());
        }

        if self.workers == Some(0) {
            return Err("Workers must be at least 1".to_string());
        }

        if let Some(ref router) = self.router {
            if !router.starts_with("http://") && !router.starts_with("https://") {
                return Err("Router URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.reuse && self.default_session {
            return Err("Cannot use both --reuse and --default-session".to_string());
        }

        if self.default_session && self.session.is_some() {
            return Err("--session cannot be combined with --default-session".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        Ok(())
    }

    /// The session mode selected by the flags.
    pub fn session_mode(&self) -> SessionMode {
        if self.default_session {
            SessionMode::Default
        } else if self.reuse {
            SessionMode::Reuse
        } else {
            SessionMode::New
        }
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
