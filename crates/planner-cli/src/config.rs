//! Configuration file management for planner.
//!
//! Provides a TOML-based config file at `~/.config/planner/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use planner_core::BackendSelection;
use planner_core::backends::STUB_BACKEND;

/// Debug token used when none is configured.
pub const DEFAULT_DEBUG_TOKEN: &str = "debug-token-stub";
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub server: ServerSection,
    pub auth: AuthSection,
    pub backends: BackendsSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    /// Bearer token accepted by the debug context route.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_token: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendsSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixtures_path: Option<PathBuf>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<LogFormat>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => bail!("unknown log format '{other}', expected 'text' or 'json'"),
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the planner config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/planner` or `~/.config/planner`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("planner");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("planner")
}

/// Return the path to the planner config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file at `path`.
pub fn load_config_from(path: &Path) -> Result<ConfigFile> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(config)
}

/// Load the config file if one exists. A file that exists but does not
/// parse is an error.
pub fn load_config_if_exists() -> Result<Option<ConfigFile>> {
    let path = config_path();
    if !path.exists() {
        return Ok(None);
    }
    load_config_from(&path).map(Some)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config_to(config: &ConfigFile, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    // The file holds the debug token.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Debug token generation
// -----------------------------------------------------------------------

/// Generate a random debug token: 32 random bytes, hex-encoded (64 chars).
pub fn generate_debug_token() -> String {
    use rand::Rng;
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Values given on the command line, which win over everything else.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub log_format: Option<LogFormat>,
}

/// Fully resolved configuration, ready for use.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub bind: String,
    pub port: u16,
    pub request_timeout: Duration,
    pub debug_token: String,
    /// `true` when no debug token was configured and the placeholder is used.
    pub debug_token_is_default: bool,
    pub backends: BackendSelection,
    pub log_format: LogFormat,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl PlannerConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        let file = load_config_if_exists()?;
        Self::resolve_with(cli, file.as_ref())
    }

    /// Resolve against an explicit (optional) config file.
    ///
    /// - bind: `--bind` > `PLANNER_BIND` > `server.bind` > `127.0.0.1`
    /// - port: `--port` > `PLANNER_PORT` > `server.port` > `8080`
    /// - debug token: `PLANNER_DEBUG_TOKEN` > `auth.debug_token` > placeholder
    /// - backends: `PLANNER_{CONTEXT,ENGINE,VALIDATOR}_BACKEND` > `backends.*` > `stub`
    /// - fixtures: `PLANNER_FIXTURES_PATH` > `backends.fixtures_path`
    /// - log format: `--log-format` > `PLANNER_LOG_FORMAT` > `logging.format` > text
    pub fn resolve_with(cli: &CliOverrides, file: Option<&ConfigFile>) -> Result<Self> {
        let server = file.map(|f| &f.server);
        let backends = file.map(|f| &f.backends);

        let bind = cli
            .bind
            .clone()
            .or_else(|| env_var("PLANNER_BIND"))
            .or_else(|| server.and_then(|s| s.bind.clone()))
            .unwrap_or_else(|| DEFAULT_BIND.to_string());

        let port = match (cli.port, env_var("PLANNER_PORT")) {
            (Some(port), _) => port,
            (None, Some(raw)) => raw
                .parse()
                .with_context(|| format!("PLANNER_PORT is not a valid port: {raw}"))?,
            (None, None) => server.and_then(|s| s.port).unwrap_or(DEFAULT_PORT),
        };

        let request_timeout = Duration::from_secs(
            server
                .and_then(|s| s.request_timeout_secs)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        );

        let configured_token = env_var("PLANNER_DEBUG_TOKEN")
            .or_else(|| file.and_then(|f| f.auth.debug_token.clone()));
        let debug_token_is_default = configured_token.is_none();
        let debug_token = configured_token.unwrap_or_else(|| DEFAULT_DEBUG_TOKEN.to_string());

        let pick = |env: &str, from_file: Option<&String>| {
            env_var(env)
                .or_else(|| from_file.cloned())
                .unwrap_or_else(|| STUB_BACKEND.to_string())
        };
        let selection = BackendSelection {
            context: pick(
                "PLANNER_CONTEXT_BACKEND",
                backends.and_then(|b| b.context.as_ref()),
            ),
            engine: pick(
                "PLANNER_ENGINE_BACKEND",
                backends.and_then(|b| b.engine.as_ref()),
            ),
            validator: pick(
                "PLANNER_VALIDATOR_BACKEND",
                backends.and_then(|b| b.validator.as_ref()),
            ),
            fixtures_path: env_var("PLANNER_FIXTURES_PATH")
                .map(PathBuf::from)
                .or_else(|| backends.and_then(|b| b.fixtures_path.clone())),
        };

        let log_format = match (cli.log_format, env_var("PLANNER_LOG_FORMAT")) {
            (Some(format), _) => format,
            (None, Some(raw)) => raw.parse()?,
            (None, None) => file.and_then(|f| f.logging.format).unwrap_or_default(),
        };

        Ok(Self {
            bind,
            port,
            request_timeout,
            debug_token,
            debug_token_is_default,
            backends: selection,
            log_format,
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
