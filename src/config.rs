//! Configuration loading for hass-mcp.
//!
//! Each setting is taken from the first source that provides it:
//!
//! 1. **CLI flags** - `--url`, `--timeout-secs`
//! 2. **Environment variables** - `HA_URL`, `HA_TOKEN`
//! 3. **JSON file** - via `--config <path>` or the `HASS_MCP_CONFIG`
//!    environment variable
//! 4. **Compiled defaults** - see the `DEFAULT_*` constants
//!
//! The access token has no default and is never accepted on the command line,
//! so it must come from `HA_TOKEN` or the config file. Empty environment
//! variables are treated as unset.
//!
//! ```json
//! {
//!   "url": "http://homeassistant.local:8123",
//!   "token": "<long-lived access token>",
//!   "timeout_secs": 10,
//!   "log_level": "info"
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use thiserror::Error;

pub const URL_KEY: &str = "HA_URL";
pub const TOKEN_KEY: &str = "HA_TOKEN";
pub const CONFIG_PATH_KEY: &str = "HASS_MCP_CONFIG";

pub const DEFAULT_URL: &str = "https://10.0.0.129:8123";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// CLI arguments parsed by `clap`.
#[derive(Parser, Debug, Default)]
#[command(
    name = "hass-mcp",
    version,
    about = "Home Assistant tool server speaking line-delimited JSON over stdio"
)]
pub struct Cli {
    /// Path to a JSON config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Home Assistant base URL (overrides HA_URL)
    #[arg(long)]
    pub url: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

/// Raw JSON config file structure. Every field is optional.
#[derive(Deserialize, Debug, Default)]
pub struct FileConfig {
    pub url: Option<String>,
    pub token: Option<String>,
    pub timeout_secs: Option<u64>,
    pub log_level: Option<String>,
}

/// Validated configuration ready for use by the client and logger.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub url: String,
    pub token: String,
    pub timeout: Duration,
    pub log_level: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("HA_TOKEN is required (set the environment variable or `token` in the config file)")]
    MissingToken,

    #[error("Home Assistant URL is empty")]
    EmptyUrl,

    #[error("timeout must be at least one second")]
    ZeroTimeout,
}

/// Load and validate configuration from CLI args, the process environment,
/// and the optional config file.
pub fn load_config(cli: &Cli) -> Result<ResolvedConfig, ConfigError> {
    load_with_env(cli, |key| std::env::var(key).ok())
}

fn load_with_env<F>(cli: &Cli, env: F) -> Result<ResolvedConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let env = |key: &str| env(key).filter(|v| !v.is_empty());

    let path = cli
        .config
        .clone()
        .or_else(|| env(CONFIG_PATH_KEY).map(PathBuf::from));

    let file = match path {
        Some(p) => load_file(&expand_tilde(&p, env("HOME").as_deref()))?,
        None => FileConfig::default(),
    };

    let url = cli
        .url
        .clone()
        .or_else(|| env(URL_KEY))
        .or(file.url)
        .unwrap_or_else(|| DEFAULT_URL.to_string());
    if url.trim().is_empty() {
        return Err(ConfigError::EmptyUrl);
    }

    let token = env(TOKEN_KEY)
        .or(file.token)
        .filter(|t| !t.is_empty())
        .ok_or(ConfigError::MissingToken)?;

    let timeout_secs = cli
        .timeout_secs
        .or(file.timeout_secs)
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(ConfigError::ZeroTimeout);
    }

    Ok(ResolvedConfig {
        url,
        token,
        timeout: Duration::from_secs(timeout_secs),
        log_level: file
            .log_level
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
    })
}

/// Expand a leading `~/` using the given home directory.
fn expand_tilde(path: &Path, home: Option<&str>) -> PathBuf {
    let s = path.to_string_lossy();
    if let (Some(rest), Some(home)) = (s.strip_prefix("~/"), home) {
        return PathBuf::from(home).join(rest);
    }
    path.to_path_buf()
}

fn load_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
