use clap::Parser;
use log::{error, info};
use server::config::{AllianceMode, BotPolicy, ServerConfig};
use server::maps;
use server::network::Server;
use std::time::Duration;

/// Authoritative tank arena server
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Simulation step in milliseconds
    #[clap(long, default_value = "20")]
    tick_ms: u64,
    /// Maximum connected players, bots included
    #[clap(short, long, default_value = "16")]
    max_players: usize,
    /// Seed for spawn selection
    #[clap(long, default_value = "0")]
    seed: u64,
    /// Built-in map to load
    #[clap(long, default_value = maps::TRAINING_GROUND)]
    map_name: String,
    /// Bots to start with
    #[clap(long, default_value = "0")]
    bots: usize,
    /// Profile for startup bots
    #[clap(long, default_value = "hunter")]
    bot_profile: String,
    /// Upper bound on concurrent bots
    #[clap(long, default_value = "4")]
    max_bots: usize,
    /// Disable bots entirely
    #[clap(long)]
    no_bots: bool,
    /// How startup bots are grouped into teams
    #[clap(long, value_enum, default_value_t = AllianceMode::Solo)]
    bot_alliance: AllianceMode,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            bind_addr: format!("{}:{}", self.host, self.port),
            tick_duration: Duration::from_millis(self.tick_ms.max(1)),
            max_players: self.max_players,
            map_name: self.map_name,
            seed: self.seed,
            bots: BotPolicy {
                allow_bots: !self.no_bots,
                max_bots: self.max_bots,
                alliance_mode: self.bot_alliance,
                startup_bots: self.bots,
                startup_profile: self.bot_profile,
            },
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config();
    let Some(map) = maps::builtin(&config.map_name) else {
        error!(
            "Unknown map '{}', available: {}",
            config.map_name,
            maps::names().join(", ")
        );
        return Err(format!("unknown map '{}'", config.map_name).into());
    };

    let server = Server::new(config, map).await?;
    server.run().await?;
    info!("Server stopped");
    Ok(())
}
