//! Server configuration loading.
//!
//! Configuration comes from a TOML file, with the listen address
//! overridable from the command line. Both inputs are optional: with
//! neither, the built-in defaults apply.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("can't read config file: {source}")]
    Read {
        #[from]
        source: io::Error,
    },

    #[error("can't parse config file: {source}")]
    Parse {
        #[from]
        source: toml::de::Error,
    },
}

/// Runtime configuration.
///
/// `listen` is the one field that selects the entire transport: a leading
/// `/` marks a unix domain socket path, anything else is a `host:port`
/// TCP address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub listen: String,
}

impl Default for Config {
    fn default() -> Self {
        Self { listen: "127.0.0.1:8080".to_string() }
    }
}

impl Config {
    /// Reads configuration from a TOML file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Loads configuration the way the binary does: an optional config
    /// file, then command-line overrides on top.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_cli(Cli::parse())
    }

    fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let mut config = match cli.config {
            Some(path) => Self::from_path(&path)?,
            None => Self::default(),
        };
        if let Some(listen) = cli.listen {
            config.listen = listen;
        }
        Ok(config)
    }
}

#[derive(Parser, Debug)]
#[command(name = "wisp", about = "wisp server runtime", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address: host:port, or a filesystem path for a unix socket
    #[arg(short, long)]
    listen: Option<String>,
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn defaults_apply_without_inputs() {
        let config = Config::from_cli(Cli::try_parse_from(["wisp"]).unwrap()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.listen, "127.0.0.1:8080");
    }

    #[test]
    fn listen_flag_overrides_default() {
        let cli = Cli::try_parse_from(["wisp", "--listen", "/var/run/app.sock"]).unwrap();
        let config = Config::from_cli(cli).unwrap();
        assert_eq!(config.listen, "/var/run/app.sock");
    }

    #[test]
    fn file_values_parse_and_flag_wins() {
        let toml = indoc! {r#"
            listen = "0.0.0.0:9000"
        "#};
        let path = std::env::temp_dir().join(format!("wisp-config-{}.toml", std::process::id()));
        fs::write(&path, toml).unwrap();

        let from_file =
            Config::from_cli(Cli::try_parse_from(["wisp", "--config", path.to_str().unwrap()]).unwrap()).unwrap();
        assert_eq!(from_file.listen, "0.0.0.0:9000");

        let overridden = Config::from_cli(
            Cli::try_parse_from(["wisp", "--config", path.to_str().unwrap(), "--listen", "127.0.0.1:1"]).unwrap(),
        )
        .unwrap();
        assert_eq!(overridden.listen, "127.0.0.1:1");

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn malformed_file_is_reported() {
        let path = std::env::temp_dir().join(format!("wisp-config-bad-{}.toml", std::process::id()));
        fs::write(&path, "listen = [not toml").unwrap();

        let result = Config::from_cli(Cli::try_parse_from(["wisp", "--config", path.to_str().unwrap()]).unwrap());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));

        let _ = fs::remove_file(&path);
    }
}
