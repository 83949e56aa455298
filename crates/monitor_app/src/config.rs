//! Command-line arguments and the optional RON settings file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use log::LevelFilter;
use monitor_engine::ClientSettings;
use monitor_logging::LogDestination;

const DEFAULT_HISTORY_FILE: &str = "monitor_history.json";

#[derive(Debug, Parser)]
#[command(name = "monitor", about = "Follow backend process status over a WebSocket")]
pub struct Cli {
    /// RON file with client settings; missing fields keep their defaults.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Backend base URL, e.g. http://127.0.0.1:8000.
    #[arg(long)]
    pub base_url: Option<String>,

    /// File holding the persisted event history.
    #[arg(long, conflicts_with = "no_history")]
    pub history: Option<PathBuf>,

    /// Keep the event history in memory only.
    #[arg(long)]
    pub no_history: bool,

    #[arg(long, value_enum, default_value_t = LogTarget::File)]
    pub log: LogTarget,

    #[arg(long, default_value = "monitor.log")]
    pub log_file: PathBuf,

    /// Log at debug level.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogTarget {
    File,
    Terminal,
    Both,
}

impl From<LogTarget> for LogDestination {
    fn from(target: LogTarget) -> Self {
        match target {
            LogTarget::File => LogDestination::File,
            LogTarget::Terminal => LogDestination::Terminal,
            LogTarget::Both => LogDestination::Both,
        }
    }
}

impl Cli {
    pub fn log_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    }
}

/// Defaults, then the config file, then command-line overrides.
pub fn load_settings(cli: &Cli) -> anyhow::Result<ClientSettings> {
    let mut settings = match &cli.config {
        Some(path) => read_settings(path)?,
        None => ClientSettings::default(),
    };

    if let Some(base_url) = &cli.base_url {
        settings.base_url = base_url.clone();
    }
    if cli.no_history {
        settings.history_path = None;
    } else if let Some(path) = &cli.history {
        settings.history_path = Some(path.clone());
    } else if settings.history_path.is_none() {
        settings.history_path = Some(PathBuf::from(DEFAULT_HISTORY_FILE));
    }
    Ok(settings)
}

fn read_settings(path: &Path) -> anyhow::Result<ClientSettings> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    ron::from_str(&content).with_context(|| format!("failed to parse config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("monitor").chain(args.iter().copied()))
    }

    #[test]
    fn defaults_use_history_file() {
        let settings = load_settings(&cli(&[])).unwrap();
        assert_eq!(settings.base_url, ClientSettings::default().base_url);
        assert_eq!(
            settings.history_path,
            Some(PathBuf::from(DEFAULT_HISTORY_FILE))
        );
    }

    #[test]
    fn config_file_fills_missing_fields_with_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("monitor.ron");
        fs::write(
            &path,
            r#"(base_url: "http://backend:9000", probe_attempts: 2, history_path: Some("state/events.json"))"#,
        )
        .unwrap();

        let settings = load_settings(&cli(&["--config", path.to_str().unwrap()])).unwrap();
        assert_eq!(settings.base_url, "http://backend:9000");
        assert_eq!(settings.probe_attempts, 2);
        assert_eq!(settings.reconnect_cap_ms, 15_000);
        assert_eq!(
            settings.history_path,
            Some(PathBuf::from("state/events.json"))
        );
    }

    #[test]
    fn command_line_overrides_config_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("monitor.ron");
        fs::write(&path, r#"(base_url: "http://backend:9000")"#).unwrap();

        let settings = load_settings(&cli(&[
            "--config",
            path.to_str().unwrap(),
            "--base-url",
            "http://localhost:7000",
            "--no-history",
        ]))
        .unwrap();
        assert_eq!(settings.base_url, "http://localhost:7000");
        assert_eq!(settings.history_path, None);
    }

    #[test]
    fn unreadable_config_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("monitor.ron");
        fs::write(&path, "(base_url: 42)").unwrap();

        assert!(load_settings(&cli(&["--config", path.to_str().unwrap()])).is_err());
        assert!(load_settings(&cli(&["--config", "/nonexistent/monitor.ron"])).is_err());
    }
}
