use clap::Parser;
use log::{error, info};
use server::{GameServer, ServerConfig};
use tokio::net::TcpListener;

/// Parses command-line arguments, starts the WebSocket listener and the
/// tick engine, and logs stats snapshots until interrupted.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "8080")]
        port: u16,
        /// Tick rate (simulation updates per second)
        #[clap(short, long, default_value_t = shared::TICK_RATE)]
        tick_rate: u32,
        /// Maximum number of simultaneous players
        #[clap(short, long, default_value_t = shared::MAX_PLAYERS)]
        max_players: usize,
    }

    env_logger::init();
    let args = Args::parse();

    let config = ServerConfig {
        tick_rate: args.tick_rate,
        max_players: args.max_players,
        ..ServerConfig::default()
    };

    let address = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&address).await?;
    info!("Server listening on {}", address);

    let server = GameServer::new(config);

    // Log each stats snapshot as one JSON line; the feed itself is
    // transport-agnostic, this subscriber is just the default sink.
    let mut snapshots = server.subscribe_stats().await;
    tokio::spawn(async move {
        while let Some(snapshot) = snapshots.recv().await {
            match serde_json::to_string(&snapshot) {
                Ok(line) => info!("stats {}", line),
                Err(err) => error!("Failed to encode stats snapshot: {}", err),
            }
        }
    });

    tokio::select! {
        _ = server.run(listener) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
