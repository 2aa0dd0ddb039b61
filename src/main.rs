//! Binary entry point for the orca service.
//!
//! Startup loads the configuration exactly once; any configuration problem
//! is logged and ends the process with status 1 before the listener is
//! bound.

use std::process;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;
use tracing::{debug, error, info};

use orca::config::{ConfigError, ConfigFactory, ConfigSource, ServiceConfig};
use orca::server::{self, ServerError};
use orca::{Orchestrator, ProviderRegistry, TarImageOpener, logging};

mod cli;

use cli::Cli;

#[derive(Debug, Error)]
enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Server(#[from] ServerError),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = logging::init() {
        debug!(error = %err, "keeping existing log subscriber");
    }

    let exit_code = match run(cli).await {
        Ok(()) => 0,
        Err(err) => {
            error!(error = %err, "orca failed to start");
            1
        }
    };

    process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<(), StartupError> {
    let source = cli
        .config
        .map_or_else(ConfigSource::standard, ConfigSource::explicit);
    let service = ServiceConfig::load(&source)?;
    let configs = Arc::new(ConfigFactory::new(&service)?);
    info!(
        platform = configs.platform().id(),
        builder = %service.provider.builder_bin,
        "configuration loaded"
    );

    let providers = ProviderRegistry::with_builder(&service.provider.builder_bin);
    let orchestrator = Arc::new(Orchestrator::new(configs, TarImageOpener, providers));
    server::start(&cli.listen_addr, server::router(orchestrator)).await?;
    Ok(())
}
