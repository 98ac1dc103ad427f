use clap::Parser;
use client::network::Client;
use log::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Fraction of state snapshots to drop, 0.0 to 1.0
    #[arg(short = 'd', long, default_value = "0.0")]
    drop_rate: f64,

    /// Idle instead of running the scripted walk-and-fire pattern
    #[arg(long)]
    no_autopilot: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }
    if args.drop_rate > 0.0 {
        info!("Dropping {:.0}% of snapshots", args.drop_rate * 100.0);
    }

    let mut client =
        Client::new(&args.server, args.fake_ping, args.drop_rate, !args.no_autopilot).await?;

    client.run().await?;

    Ok(())
}
