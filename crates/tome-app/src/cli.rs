//! CLI argument definitions for the tome application.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// tome — chat with a knowledge base built from your documents.
#[derive(Parser, Debug)]
#[command(name = "tome", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Data directory for the knowledge-base database.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Knowledge-base collection name for this session.
    #[arg(short = 'k', long = "kb-name")]
    pub kb_name: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > TOME_CONFIG env var > ~/.tome/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("TOME_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the data directory.
    ///
    /// Priority: --data-dir flag > config file value.
    pub fn resolve_data_dir(&self, config_dir: &str) -> PathBuf {
        if let Some(ref p) = self.data_dir {
            return p.clone();
        }
        expand_tilde(config_dir)
    }

    /// Resolve the knowledge-base name.
    pub fn resolve_kb_name(&self, config_name: &str) -> String {
        self.kb_name
            .clone()
            .unwrap_or_else(|| config_name.to_string())
    }

    /// Resolve the log level.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".tome").join("config.toml");
    }
    PathBuf::from("config.toml")
}

/// Expand a leading `~/` against $HOME.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> CliArgs {
        CliArgs {
            config: None,
            data_dir: None,
            kb_name: None,
            log_level: None,
        }
    }

    #[test]
    fn test_explicit_config_path_wins() {
        let mut a = args();
        a.config = Some(PathBuf::from("/etc/tome.toml"));
        assert_eq!(a.resolve_config_path(), PathBuf::from("/etc/tome.toml"));
    }

    #[test]
    fn test_data_dir_flag_overrides_config() {
        let mut a = args();
        a.data_dir = Some(PathBuf::from("/var/tome"));
        assert_eq!(a.resolve_data_dir("~/.tome/data"), PathBuf::from("/var/tome"));
    }

    #[test]
    fn test_kb_name_defaults_to_config() {
        let a = args();
        assert_eq!(a.resolve_kb_name("knowledge_base"), "knowledge_base");

        let mut a = args();
        a.kb_name = Some("thesis".to_string());
        assert_eq!(a.resolve_kb_name("knowledge_base"), "thesis");
    }

    #[test]
    fn test_log_level_defaults_to_config() {
        let a = args();
        assert_eq!(a.resolve_log_level("info"), "info");

        let mut a = args();
        a.log_level = Some("debug".to_string());
        assert_eq!(a.resolve_log_level("info"), "debug");
    }

    #[test]
    fn test_expand_tilde_plain_path_unchanged() {
        assert_eq!(expand_tilde("/tmp/x"), PathBuf::from("/tmp/x"));
    }
}
