use std::path::PathBuf;

use clap::{Args, Parser};

use crate::telemetry::{LogConfig, LogLevel};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "mmorogue",
    author,
    version,
    about = "Multiplayer roguelike served over telnet"
)]
pub struct Cli {
    /// Address to accept telnet connections on.
    #[arg(long, env = "MMOROGUE_LISTEN_ADDR", default_value = "0.0.0.0:2323")]
    pub listen_addr: String,

    /// Text map to load (`.` floor, `#` wall, `~` water). A map is generated
    /// when omitted.
    #[arg(long, env = "MMOROGUE_MAP", value_name = "PATH")]
    pub map: Option<PathBuf>,

    /// Width of a generated map.
    #[arg(long, env = "MMOROGUE_MAP_WIDTH", default_value_t = 64)]
    pub map_width: usize,

    /// Height of a generated map.
    #[arg(long, env = "MMOROGUE_MAP_HEIGHT", default_value_t = 48)]
    pub map_height: usize,

    /// Seed for map generation; random when omitted.
    #[arg(long, env = "MMOROGUE_MAP_SEED")]
    pub map_seed: Option<u64>,

    /// Wandering NPCs spawned at start.
    #[arg(long, env = "MMOROGUE_NPCS", default_value_t = 10)]
    pub npcs: usize,

    /// Simulation period in milliseconds.
    #[arg(long, env = "MMOROGUE_TICK_MS", default_value_t = 100)]
    pub tick_ms: u64,

    /// TOML file holding accounts. Accounts only last until exit when omitted.
    #[arg(long, env = "MMOROGUE_CREDENTIALS", value_name = "PATH")]
    pub credentials: Option<PathBuf>,

    #[command(flatten)]
    pub logging: LoggingArgs,
}

#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    #[arg(
        long = "log-level",
        value_enum,
        env = "MMOROGUE_LOG_LEVEL",
        default_value_t = LogLevel::Info,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    pub level: LogLevel,

    #[arg(
        long = "log-file",
        value_name = "PATH",
        env = "MMOROGUE_LOG_FILE",
        help = "Also write logs to the specified file"
    )]
    pub file: Option<PathBuf>,
}

impl LoggingArgs {
    pub fn to_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            file: self.file.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["mmorogue"]).unwrap();
        assert_eq!(cli.listen_addr, "0.0.0.0:2323");
        assert_eq!((cli.map_width, cli.map_height), (64, 48));
        assert_eq!(cli.npcs, 10);
        assert_eq!(cli.tick_ms, 100);
        assert!(cli.map.is_none());
        assert_eq!(cli.logging.level, LogLevel::Info);
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "mmorogue",
            "--listen-addr",
            "127.0.0.1:4000",
            "--map",
            "world/map.txt",
            "--npcs",
            "0",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.listen_addr, "127.0.0.1:4000");
        assert_eq!(cli.map, Some(PathBuf::from("world/map.txt")));
        assert_eq!(cli.npcs, 0);
        assert_eq!(cli.logging.level, LogLevel::Debug);
    }
}
