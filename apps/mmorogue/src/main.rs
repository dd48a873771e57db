use anyhow::Result;
use clap::Parser;
use tracing::info;

use mmorogue::cli::Cli;
use mmorogue::config::ServerConfig;
use mmorogue::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ServerConfig::try_from(cli)?;
    let _log_guard = telemetry::init(&config.logging)?;

    info!(
        target: "mmorogue",
        listen_addr = %config.listen_addr,
        npcs = config.npcs,
        tick_ms = config.tick_period.as_millis() as u64,
        log_level = config.logging.level.as_str(),
        "starting mmorogue"
    );

    mmorogue::app::run(config).await
}
