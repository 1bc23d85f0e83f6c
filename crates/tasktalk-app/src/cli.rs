//! CLI argument definitions for the Tasktalk binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// Tasktalk - a conversational task assistant.
#[derive(Parser, Debug)]
#[command(name = "tasktalk", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// User id the REPL speaks as.
    #[arg(short = 'u', long = "user", default_value = "local")]
    pub user: String,

    /// Classify with rules only, even if the config enables the model.
    #[arg(long = "no-model")]
    pub no_model: bool,
}

impl CliArgs {
    /// Priority: --config flag > TASKTALK_CONFIG env var > ~/.tasktalk/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("TASKTALK_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Filter directive for the subscriber.
    ///
    /// Priority: --log-level flag > RUST_LOG > config file value.
    pub fn resolve_log_filter(&self, config_level: &str) -> String {
        if let Some(ref level) = self.log_level {
            return level.clone();
        }
        match std::env::var("RUST_LOG") {
            Ok(filter) if !filter.trim().is_empty() => filter,
            _ => config_level.to_string(),
        }
    }

    pub fn use_model(&self, config_use_model: bool) -> bool {
        config_use_model && !self.no_model
    }
}

fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".tasktalk").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".tasktalk").join("config.toml");
    }
    PathBuf::from("config.toml")
}
