//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.wordfan.toml` files.

use crate::backend::RouterConfig;
use crate::cli::{OutputFormat, SplitMode};
use crate::splitter::SplitPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file name.
pub const CONFIG_FILE: &str = ".wordfan.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Router and function endpoints.
    #[serde(default)]
    pub router: RouterSection,

    /// Splitting and dispatch settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// Where the worker and state-manager functions live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterSection {
    /// Fission router base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path of the worker function on the router.
    #[serde(default = "default_worker_path")]
    pub worker_path: String,

    /// Path of the state-manager function on the router.
    #[serde(default = "default_state_manager_path")]
    pub state_manager_path: String,

    /// State-manager URL handed to workers, as seen from inside the cluster.
    #[serde(default = "default_worker_state_manager_url")]
    pub worker_state_manager_url: String,

    /// Per-call timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            worker_path: default_worker_path(),
            state_manager_path: default_state_manager_path(),
            worker_state_manager_url: default_worker_state_manager_url(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:9090".to_string()
}

fn default_worker_path() -> String {
    "/agent".to_string()
}

fn default_state_manager_path() -> String {
    "/state-manager".to_string()
}

fn default_worker_state_manager_url() -> String {
    "http://router.fission.svc.cluster.local/state-manager".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Splitting and dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Number of chunks for the chunk split.
    #[serde(default = "default_chunks")]
    pub chunks: usize,

    /// Splitting policy.
    #[serde(default)]
    pub split: SplitMode,

    /// Pool size. Unset means one worker per unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            chunks: default_chunks(),
            split: SplitMode::default(),
            workers: None,
        }
    }
}

fn default_chunks() -> usize {
    3
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Report output path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Report format.
    #[serde(default)]
    pub format: OutputFormat,

    /// Number of top words printed after a run.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            format: OutputFormat::default(),
            top_k: default_top_k(),
        }
    }
}

fn default_output() -> String {
    "wordfan_results.json".to_string()
}

fn default_top_k() -> usize {
    crate::aggregator::DEFAULT_TOP_K
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Only values given on the command line (or via `FISSION_ROUTER`) override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref router) = args.router {
            self.router.base_url = router.clone();
        }
        if let Some(timeout) = args.timeout {
            self.router.timeout_seconds = timeout;
        }

        if let Some(chunks) = args.chunks {
            self.dispatch.chunks = chunks;
        }
        if let Some(split) = args.split {
            self.dispatch.split = split;
        }
        if args.workers.is_some() {
            self.dispatch.workers = args.workers;
        }

        if let Some(ref output) = args.output {
            self.report.output = output.display().to_string();
        }
        if let Some(format) = args.format {
            self.report.format = format;
        }
        if let Some(top) = args.top {
            self.report.top_k = top;
        }
    }

    /// Check values that may have come from the file rather than the CLI.
    pub fn validate(&self) -> Result<(), String> {
        if self.dispatch.chunks == 0 {
            return Err("dispatch.chunks must be at least 1".to_string());
        }
        if self.dispatch.workers == Some(0) {
            return Err("dispatch.workers must be at least 1".to_string());
        }
        if self.router.timeout_seconds == 0 {
            return Err("router.timeout_seconds must be at least 1".to_string());
        }
        if !self.router.base_url.starts_with("http://")
            && !self.router.base_url.starts_with("https://")
        {
            return Err("router.base_url must start with 'http://' or 'https://'".to_string());
        }
        Ok(())
    }

    /// The splitting policy these settings describe.
    pub fn split_policy(&self) -> SplitPolicy {
        match self.dispatch.split {
            SplitMode::Chunks => SplitPolicy::Chunks(self.dispatch.chunks),
            SplitMode::Word => SplitPolicy::Word,
        }
    }

    /// Client settings for the router.
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            base_url: self.router.base_url.clone(),
            worker_path: self.router.worker_path.clone(),
            state_manager_path: self.router.state_manager_path.clone(),
            worker_state_manager_url: self.router.worker_state_manager_url.clone(),
            timeout: Duration::from_secs(self.router.timeout_seconds),
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
