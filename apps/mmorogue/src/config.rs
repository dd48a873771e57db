use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};

use crate::cli::Cli;
use crate::game::TICK_PERIOD;
use crate::telemetry::LogConfig;
use crate::world::{WorldError, WorldMap};

/// Where the world comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapSource {
    File(PathBuf),
    Generated {
        width: usize,
        height: usize,
        seed: Option<u64>,
    },
}

impl MapSource {
    pub fn build(&self) -> Result<WorldMap, WorldError> {
        match self {
            MapSource::File(path) => WorldMap::load(path),
            MapSource::Generated {
                width,
                height,
                seed,
            } => {
                let seed = seed.unwrap_or_else(rand::random);
                WorldMap::generate(*width, *height, seed)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub map: MapSource,
    pub npcs: usize,
    pub tick_period: Duration,
    pub credentials: Option<PathBuf>,
    pub logging: LogConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 2323)),
            map: MapSource::Generated {
                width: 64,
                height: 48,
                seed: None,
            },
            npcs: 10,
            tick_period: TICK_PERIOD,
            credentials: None,
            logging: LogConfig::default(),
        }
    }
}

impl TryFrom<Cli> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let listen_addr: SocketAddr = cli
            .listen_addr
            .parse()
            .with_context(|| format!("invalid listen address: {}", cli.listen_addr))?;
        if cli.tick_ms == 0 {
            bail!("tick period must be at least 1ms");
        }
        let map = match cli.map {
            Some(path) => MapSource::File(path),
            None => {
                if cli.map_width < 3 || cli.map_height < 3 {
                    bail!(
                        "generated map must be at least 3x3, got {}x{}",
                        cli.map_width,
                        cli.map_height
                    );
                }
                MapSource::Generated {
                    width: cli.map_width,
                    height: cli.map_height,
                    seed: cli.map_seed,
                }
            }
        };
        Ok(ServerConfig {
            listen_addr,
            map,
            npcs: cli.npcs,
            tick_period: Duration::from_millis(cli.tick_ms),
            credentials: cli.credentials,
            logging: cli.logging.to_config(),
        })
    }
}
