//! Binary entry point: parses CLI flags, builds the server
//! configuration, registers the reference handlers, and runs the
//! acceptor loop until `SIGINT`.
//!
//! No catch-all handler is registered here (see DESIGN.md, O3): an
//! unmatched request falls through the registry's own NOT-FOUND path to
//! the core's canned `501 Not Implemented`.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use throng::handlers::{FileHandler, IndexHandler};
use throng::{Args, HandlerRegistry, Server, ServerConfig};

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match ServerConfig::from_args(args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("throng: {err}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config);

    let mut registry = HandlerRegistry::new();
    registry.push(IndexHandler::new(config.root.clone()));
    registry.push(FileHandler::new(config.root.clone()));

    let server = match Server::bind(config, registry) {
        Ok(server) => server,
        Err(err) => {
            tracing::error!(%err, "unable to start server");
            return ExitCode::FAILURE;
        }
    };

    match server.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "server loop exited with an error");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(config: &ServerConfig) {
    let filter = EnvFilter::builder()
        .with_default_directive(config.log_level.as_filter().into())
        .from_env_lossy();

    tracing_subscriber::fmt().with_env_filter(filter).compact().init();
}
