mod cli;
mod commands;

use clap::Parser;
use cli::Cli;
use openwith::config::Config;
use openwith::observability::init_tracing;
use openwith::os::SystemServices;
use openwith::registry::ScanSettings;
use openwith::service::RegistryHandle;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path.clone())?,
        None => Config::load()?,
    };
    init_tracing(&config.telemetry);

    let services = SystemServices::from_config(&config.backend);
    let handle = RegistryHandle::spawn(services, ScanSettings::from_config(&config.scan));

    commands::run(cli.command, &config, &handle).await
}
