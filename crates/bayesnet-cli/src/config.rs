//! Runtime configuration: output format, colour and log filter.
//!
//! Flags win over the environment. The log filter comes from `-v` flags, then
//! `BAYESNET_LOG`, then `RUST_LOG`, then defaults to warnings only. Logs go to
//! stderr so stdout stays parseable with `--json`.

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "BAYESNET_LOG";
const DEFAULT_FILTER: &str = "warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliConfig {
    pub output: OutputFormat,
    pub color: bool,
    pub log_filter: String,
}

impl CliConfig {
    /// Resolve from command-line flags and the process environment.
    pub fn resolve(json: bool, no_color: bool, verbose: u8) -> Self {
        let env_filter = std::env::var(LOG_ENV)
            .ok()
            .or_else(|| std::env::var("RUST_LOG").ok());
        let no_color_env = std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty());
        Self::from_parts(json, no_color || no_color_env, verbose, env_filter)
    }

    pub fn from_parts(json: bool, no_color: bool, verbose: u8, env_filter: Option<String>) -> Self {
        let log_filter = match verbose {
            0 => env_filter
                .filter(|f| !f.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_FILTER.to_string()),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        };
        Self {
            output: if json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
            // JSON output is never coloured.
            color: !no_color && !json,
            log_filter,
        }
    }

    pub fn is_json(&self) -> bool {
        self.output == OutputFormat::Json
    }

    pub fn apply_color(&self) {
        colored::control::set_override(self.color);
    }
}

pub fn init_logging(config: &CliConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.log_filter)
        .map_err(|e| anyhow!("invalid log filter `{}`: {e}", config.log_filter))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(config.color)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow!("failed to initialize logging: {e}"))?;
    tracing::debug!(filter = %config.log_filter, "logging initialized");
    Ok(())
}
