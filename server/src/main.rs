use clap::Parser;
use log::info;
use server::config::{resolve_loadout, LoadoutOverrides};
use server::network::Server;
use shared::{DamageKind, ProjectileKind};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Authoritative game server")]
struct Args {
    /// Server IP address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[arg(short, long, default_value_t = 8080)]
    port: u16,
    /// Simulation ticks per second
    #[arg(short, long, default_value_t = 60)]
    tick_rate: u32,
    /// Maximum concurrent clients
    #[arg(short, long, default_value_t = 16)]
    max_clients: usize,
    /// TOML file with the character loadout
    #[arg(long)]
    loadout: Option<PathBuf>,
    #[arg(long)]
    max_health: Option<f32>,
    /// Seconds between accepted shots
    #[arg(long)]
    fire_rate: Option<f32>,
    #[arg(long)]
    damage: Option<f32>,
    /// generic, ballistic, explosive or energy
    #[arg(long)]
    damage_kind: Option<DamageKind>,
    /// sphere or heavy
    #[arg(long)]
    projectile: Option<ProjectileKind>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let overrides = LoadoutOverrides {
        max_health: args.max_health,
        fire_rate_seconds: args.fire_rate,
        damage: args.damage,
        damage_kind: args.damage_kind,
        projectile_kind: args.projectile,
    };
    let config = resolve_loadout(args.loadout.as_deref(), &overrides)?;
    info!("Loadout: {:?}", config);

    let tick_duration = Duration::from_secs_f64(1.0 / args.tick_rate.max(1) as f64);
    let address = format!("{}:{}", args.host, args.port);

    let mut server = Server::new(&address, tick_duration, args.max_clients, config).await?;
    server.run().await
}
