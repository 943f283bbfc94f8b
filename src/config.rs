//! Configuration module for the frame-echo harness.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values. Routes can only
//! be set from the file; without a `[[routes]]` table the built-in routes
//! are served.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;

use crate::connection::DEFAULT_BUFFER_SIZE;
use crate::route::{default_routes, Fallback, Mode, Route};

/// Command-line arguments for the harness
#[derive(Parser, Debug, Default)]
#[command(name = "frame-echo")]
#[command(author = "frame-echo authors")]
#[command(version = "0.1.0")]
#[command(about = "A diagnostic WebSocket frame echo and dump server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 127.0.0.1:12345)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Number of worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Maximum number of concurrent connections
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Per-connection read buffer size in bytes; larger frames are split
    #[arg(long)]
    pub buffer_size: Option<usize>,

    /// Where frame dumps are written
    #[arg(long, value_enum)]
    pub dump_output: Option<DumpOutput>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Destination for frame dumps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DumpOutput {
    /// Raw text on stdout
    #[default]
    Stdout,
    /// Through the log, one event per dump
    Log,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub routes: Option<Vec<RouteConfig>>,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Number of worker threads
    pub workers: Option<usize>,
    /// Maximum number of concurrent connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            workers: None,
            max_connections: default_max_connections(),
        }
    }
}

/// Frame dump configuration
#[derive(Debug, Deserialize)]
pub struct DiagnosticsConfig {
    /// Per-connection read buffer size
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Where frame dumps are written
    #[serde(default)]
    pub dump_output: DumpOutput,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            dump_output: DumpOutput::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Processing mode names accepted in `[[routes]]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeName {
    Dump,
    HeaderDump,
    Echo,
    Profile,
}

/// One `[[routes]]` entry
#[derive(Debug, Deserialize)]
pub struct RouteConfig {
    pub path: String,
    pub mode: ModeName,
    /// Handler profile, required for `mode = "profile"`
    pub profile: Option<String>,
    /// Policy when the profile has no handler
    #[serde(default)]
    pub fallback: Fallback,
    /// Dump every frame before processing
    #[serde(default)]
    pub log_frames: bool,
}

impl RouteConfig {
    fn into_route(self) -> Result<Route, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidRoute {
            path: self.path.clone(),
            reason: reason.to_string(),
        };

        if !self.path.starts_with('/') {
            return Err(invalid("path must start with '/'"));
        }

        let mode = match self.mode {
            ModeName::Dump => Mode::Dump,
            ModeName::HeaderDump => Mode::HeaderDump,
            ModeName::Echo => Mode::Echo,
            ModeName::Profile => match &self.profile {
                Some(profile) if !profile.is_empty() => Mode::Profile {
                    profile: profile.clone(),
                    fallback: self.fallback,
                },
                _ => return Err(invalid("profile mode needs a profile name")),
            },
        };

        Ok(Route::new(self.path, mode).with_log_frames(self.log_frames))
    }
}

fn default_listen() -> String {
    "127.0.0.1:12345".to_string()
}

fn default_max_connections() -> usize {
    1024
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub workers: Option<usize>,
    pub max_connections: usize,
    pub buffer_size: usize,
    pub dump_output: DumpOutput,
    pub log_level: String,
    pub routes: Vec<Route>,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    /// Merge CLI args over TOML values and validate the result.
    pub fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let routes = match toml_config.routes {
            Some(entries) => {
                let mut seen = HashSet::new();
                let mut routes = Vec::with_capacity(entries.len());
                for entry in entries {
                    if !seen.insert(entry.path.clone()) {
                        return Err(ConfigError::InvalidRoute {
                            path: entry.path,
                            reason: "duplicate path".to_string(),
                        });
                    }
                    routes.push(entry.into_route()?);
                }
                routes
            }
            None => default_routes(),
        };

        if routes.is_empty() {
            return Err(ConfigError::NoRoutes);
        }

        let buffer_size = cli
            .buffer_size
            .unwrap_or(toml_config.diagnostics.buffer_size);
        if buffer_size == 0 {
            return Err(ConfigError::ZeroBufferSize);
        }

        let workers = cli.workers.or(toml_config.server.workers);
        if workers == Some(0) {
            return Err(ConfigError::ZeroWorkers);
        }

        let max_connections = cli
            .max_connections
            .unwrap_or(toml_config.server.max_connections);
        if max_connections == 0 {
            return Err(ConfigError::ZeroMaxConnections);
        }

        Ok(Config {
            listen: cli.listen.unwrap_or(toml_config.server.listen),
            workers,
            max_connections,
            buffer_size,
            dump_output: cli
                .dump_output
                .unwrap_or(toml_config.diagnostics.dump_output),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
            routes,
        })
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),
    #[error("Invalid route '{path}': {reason}")]
    InvalidRoute { path: String, reason: String },
    #[error("No routes configured")]
    NoRoutes,
    #[error("buffer_size must be greater than zero")]
    ZeroBufferSize,
    #[error("workers must be greater than zero")]
    ZeroWorkers,
    #[error("max_connections must be greater than zero")]
    ZeroMaxConnections,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.listen, "127.0.0.1:12345");
        assert_eq!(config.diagnostics.buffer_size, 8000);
        assert_eq!(config.diagnostics.dump_output, DumpOutput::Stdout);
        assert!(config.routes.is_none());
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            listen = "0.0.0.0:2345"
            workers = 4
            max_connections = 16

            [diagnostics]
            buffer_size = 512
            dump_output = "log"

            [logging]
            level = "debug"

            [[routes]]
            path = "/ws"
            mode = "echo"

            [[routes]]
            path = "/blip"
            mode = "header_dump"
            log_frames = true

            [[routes]]
            path = "/profile"
            mode = "profile"
            profile = "BLIPTest/EchoData"
            fallback = "echo"
        "#;

        let toml_config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(toml_config.server.listen, "0.0.0.0:2345");
        assert_eq!(toml_config.server.workers, Some(4));
        assert_eq!(toml_config.logging.level, "debug");

        let config = Config::merge(CliArgs::default(), toml_config).unwrap();
        assert_eq!(config.max_connections, 16);
        assert_eq!(config.buffer_size, 512);
        assert_eq!(config.dump_output, DumpOutput::Log);
        assert_eq!(config.routes.len(), 3);
        assert_eq!(config.routes[0], Route::new("/ws", Mode::Echo));
        assert_eq!(
            config.routes[1],
            Route::new("/blip", Mode::HeaderDump).with_log_frames(true)
        );
        assert_eq!(
            config.routes[2].mode,
            Mode::Profile {
                profile: "BLIPTest/EchoData".to_string(),
                fallback: Fallback::Echo,
            }
        );
    }

    #[test]
    fn test_cli_overrides_toml() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [server]
            listen = "0.0.0.0:2345"
            [logging]
            level = "debug"
        "#,
        )
        .unwrap();
        let cli = CliArgs {
            listen: Some("127.0.0.1:9000".to_string()),
            buffer_size: Some(64),
            log_level: Some("trace".to_string()),
            ..CliArgs::default()
        };

        let config = Config::merge(cli, toml_config).unwrap();
        assert_eq!(config.listen, "127.0.0.1:9000");
        assert_eq!(config.buffer_size, 64);
        assert_eq!(config.log_level, "trace");
        assert_eq!(config.routes, default_routes());
    }

    #[test]
    fn test_profile_route_needs_profile() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [[routes]]
            path = "/p"
            mode = "profile"
        "#,
        )
        .unwrap();
        let err = Config::merge(CliArgs::default(), toml_config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRoute { ref path, .. } if path == "/p"));
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let result: Result<TomlConfig, _> = toml::from_str(
            r#"
            [[routes]]
            path = "/p"
            mode = "mirror"
        "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_and_relative_paths_rejected() {
        let duplicate: TomlConfig = toml::from_str(
            r#"
            [[routes]]
            path = "/a"
            mode = "echo"
            [[routes]]
            path = "/a"
            mode = "dump"
        "#,
        )
        .unwrap();
        assert!(matches!(
            Config::merge(CliArgs::default(), duplicate),
            Err(ConfigError::InvalidRoute { .. })
        ));

        let relative: TomlConfig = toml::from_str(
            r#"
            [[routes]]
            path = "echo"
            mode = "echo"
        "#,
        )
        .unwrap();
        assert!(matches!(
            Config::merge(CliArgs::default(), relative),
            Err(ConfigError::InvalidRoute { .. })
        ));
    }

    #[test]
    fn test_zero_buffer_rejected() {
        let cli = CliArgs {
            buffer_size: Some(0),
            ..CliArgs::default()
        };
        assert!(matches!(
            Config::merge(cli, TomlConfig::default()),
            Err(ConfigError::ZeroBufferSize)
        ));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let cli = CliArgs {
            workers: Some(0),
            ..CliArgs::default()
        };
        assert!(matches!(
            Config::merge(cli, TomlConfig::default()),
            Err(ConfigError::ZeroWorkers)
        ));

        let toml_config: TomlConfig = toml::from_str("[server]\nworkers = 0\n").unwrap();
        assert!(matches!(
            Config::merge(CliArgs::default(), toml_config),
            Err(ConfigError::ZeroWorkers)
        ));
    }

    #[test]
    fn test_zero_max_connections_rejected() {
        let cli = CliArgs {
            max_connections: Some(0),
            ..CliArgs::default()
        };
        assert!(matches!(
            Config::merge(cli, TomlConfig::default()),
            Err(ConfigError::ZeroMaxConnections)
        ));

        let toml_config: TomlConfig =
            toml::from_str("[server]\nmax_connections = 0\n").unwrap();
        assert!(matches!(
            Config::merge(CliArgs::default(), toml_config),
            Err(ConfigError::ZeroMaxConnections)
        ));
    }
}
