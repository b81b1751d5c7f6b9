//! CLI flags and optional TOML overlay, layered: built-in defaults →
//! `--config` file → CLI flags. Grounded on the `clap::Parser` derive
//! pattern used throughout the retrieval pack's async services.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use tracing::level_filters::LevelFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
    All,
}

impl LogLevel {
    fn parse(raw: &str) -> Result<Self, String> {
        match raw {
            "error" => Ok(LogLevel::Error),
            "warning" => Ok(LogLevel::Warning),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "all" => Ok(LogLevel::All),
            other => Err(format!("unknown log level '{other}' (expected error|warning|info|debug|all)")),
        }
    }

    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warning => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::All => LevelFilter::TRACE,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "throng", about = "A concurrent HTTP/1.1 file server")]
pub struct Args {
    /// Number of worker threads. Defaults to 10 if neither this flag
    /// nor a config file sets it.
    #[arg(short = 'n', long = "threads")]
    pub threads: Option<usize>,

    /// TCP port to listen on. Defaults to 80.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Log level: error, warning, info, debug, all. Defaults to info.
    #[arg(short = 'l', long = "log-level", value_parser = LogLevel::parse)]
    pub log_level: Option<LogLevel>,

    /// Optional TOML config file overlaying these defaults.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Directory to serve. Defaults to the current directory.
    pub root: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct FileOverlay {
    threads: Option<usize>,
    port: Option<u16>,
    log_level: Option<LogLevel>,
    root: Option<PathBuf>,
    connection_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub threads: usize,
    pub port: u16,
    pub root: PathBuf,
    pub connection_timeout: Duration,
    pub log_level: LogLevel,
}

impl ServerConfig {
    pub fn from_args(args: Args) -> Result<Self, String> {
        let mut config = ServerConfig {
            threads: 10,
            port: 80,
            root: PathBuf::from("."),
            connection_timeout: Duration::from_millis(5000),
            log_level: LogLevel::Info,
        };

        if let Some(path) = &args.config {
            let text = std::fs::read_to_string(path)
                .map_err(|err| format!("unable to read config file {path:?}: {err}"))?;
            let overlay: FileOverlay =
                toml::from_str(&text).map_err(|err| format!("invalid config file {path:?}: {err}"))?;

            if let Some(threads) = overlay.threads {
                config.threads = threads;
            }
            if let Some(port) = overlay.port {
                config.port = port;
            }
            if let Some(log_level) = overlay.log_level {
                config.log_level = log_level;
            }
            if let Some(root) = overlay.root {
                config.root = root;
            }
            if let Some(ms) = overlay.connection_timeout_ms {
                config.connection_timeout = Duration::from_millis(ms);
            }
        }

        if let Some(threads) = args.threads {
            config.threads = threads;
        }
        if let Some(port) = args.port {
            config.port = port;
        }
        if let Some(log_level) = args.log_level {
            config.log_level = log_level;
        }
        if let Some(root) = args.root {
            config.root = root;
        }

        if config.threads == 0 {
            return Err("threads must be greater than zero".to_string());
        }

        Ok(config)
    }
}
