//! Configuration module for linefetch.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "linefetch")]
#[command(author = "linefetch authors")]
#[command(version = "0.1.0")]
#[command(about = "Line-retrieval server and pipelined load client", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Number of runtime worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long, global = true)]
    pub workers: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Index a file and serve its lines
    Server(ServerArgs),
    /// Fetch lines from a server over many connections
    Client(ClientArgs),
}

#[derive(Args, Debug, Default)]
pub struct ServerArgs {
    /// Source data file
    #[arg(short = 'f', long)]
    pub file: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0:8888)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Number of threads used to index the source file
    #[arg(short = 'n', long)]
    pub parse_workers: Option<usize>,

    /// Maximum number of concurrent connections
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Throughput report interval in milliseconds
    #[arg(long)]
    pub stats_interval_ms: Option<u64>,
}

#[derive(Args, Debug, Default)]
pub struct ClientArgs {
    /// Server address
    #[arg(short = 'a', long)]
    pub addr: Option<String>,

    /// Number of concurrent connections
    #[arg(short = 'n', long)]
    pub connections: Option<u32>,

    /// Lines fetched per round on each connection
    #[arg(short = 'l', long)]
    pub lines: Option<u32>,

    /// Output file
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Throughput report interval in milliseconds
    #[arg(long)]
    pub stats_interval_ms: Option<u64>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Source data file
    #[serde(default = "default_file")]
    pub file: PathBuf,
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Indexer thread count
    #[serde(default = "default_parse_workers")]
    pub parse_workers: usize,
    /// Maximum concurrent connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Listen backlog
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    #[serde(default = "default_stats_interval_ms")]
    pub stats_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            file: default_file(),
            listen: default_listen(),
            parse_workers: default_parse_workers(),
            max_connections: default_max_connections(),
            backlog: default_backlog(),
            stats_interval_ms: default_stats_interval_ms(),
        }
    }
}

/// Client-related configuration
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    /// Server address
    #[serde(default = "default_addr")]
    pub addr: String,
    /// Concurrent connections
    #[serde(default = "default_connections")]
    pub connections: u32,
    /// Lines per round per connection
    #[serde(default = "default_lines")]
    pub lines: u32,
    /// Output file
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default = "default_stats_interval_ms")]
    pub stats_interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            connections: default_connections(),
            lines: default_lines(),
            output: default_output(),
            stats_interval_ms: default_stats_interval_ms(),
        }
    }
}

/// Async runtime configuration
#[derive(Debug, Deserialize, Default)]
pub struct RuntimeConfig {
    /// Worker threads (unset = number of CPU cores)
    pub workers: Option<usize>,
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

fn default_file() -> PathBuf {
    PathBuf::from("data")
}

fn default_listen() -> String {
    "0.0.0.0:8888".to_string()
}

fn default_parse_workers() -> usize {
    8
}

fn default_max_connections() -> usize {
    10000
}

fn default_backlog() -> i32 {
    1024
}

fn default_stats_interval_ms() -> u64 {
    1000 // 1 second
}

fn default_addr() -> String {
    "127.0.0.1:8888".to_string()
}

fn default_connections() -> u32 {
    1
}

fn default_lines() -> u32 {
    1000
}

fn default_output() -> PathBuf {
    PathBuf::from("output.data")
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolved server settings
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub file: PathBuf,
    pub listen: String,
    pub parse_workers: usize,
    pub max_connections: usize,
    pub backlog: i32,
    pub stats_interval: Duration,
}

/// Resolved client settings
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub addr: String,
    pub connections: u32,
    pub lines: u32,
    pub output: PathBuf,
    pub stats_interval: Duration,
}

/// Which side to run
#[derive(Debug, Clone)]
pub enum Mode {
    Server(ServerOptions),
    Client(ClientOptions),
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    /// Runtime worker threads (0 = number of CPU cores)
    pub workers: usize,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    /// Resolve parsed CLI args against the optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        let mode = match cli.command {
            Command::Server(args) => Mode::Server(resolve_server(args, toml_config.server)?),
            Command::Client(args) => Mode::Client(resolve_client(args, toml_config.client)?),
        };

        Ok(Config {
            mode,
            workers: cli.workers.or(toml_config.runtime.workers).unwrap_or(0),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }
}

fn resolve_server(args: ServerArgs, file: ServerConfig) -> Result<ServerOptions, ConfigError> {
    let options = ServerOptions {
        file: args.file.unwrap_or(file.file),
        listen: args.listen.unwrap_or(file.listen),
        parse_workers: args.parse_workers.unwrap_or(file.parse_workers),
        max_connections: args.max_connections.unwrap_or(file.max_connections),
        backlog: file.backlog,
        stats_interval: Duration::from_millis(
            args.stats_interval_ms.unwrap_or(file.stats_interval_ms),
        ),
    };

    if options.parse_workers == 0 {
        return Err(ConfigError::Invalid("parse_workers must be at least 1".into()));
    }
    if options.max_connections == 0 {
        return Err(ConfigError::Invalid("max_connections must be at least 1".into()));
    }
    if options.stats_interval.is_zero() {
        return Err(ConfigError::Invalid("stats_interval_ms must be positive".into()));
    }
    Ok(options)
}

fn resolve_client(args: ClientArgs, file: ClientConfig) -> Result<ClientOptions, ConfigError> {
    let options = ClientOptions {
        addr: args.addr.unwrap_or(file.addr),
        connections: args.connections.unwrap_or(file.connections),
        lines: args.lines.unwrap_or(file.lines),
        output: args.output.unwrap_or(file.output),
        stats_interval: Duration::from_millis(
            args.stats_interval_ms.unwrap_or(file.stats_interval_ms),
        ),
    };

    if options.connections == 0 {
        return Err(ConfigError::Invalid("connections must be at least 1".into()));
    }
    if options.lines == 0 {
        return Err(ConfigError::Invalid("lines must be at least 1".into()));
    }
    if options.stats_interval.is_zero() {
        return Err(ConfigError::Invalid("stats_interval_ms must be positive".into()));
    }
    Ok(options)
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
