use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::error::BoxError;
use server::network::Server;
use shared::{ADMIN_KEY, DEFAULT_PORT, TICK_MS};
use std::time::Duration;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Address to bind to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    host: String,
    /// Port to listen on
    #[clap(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Milliseconds between simulation ticks
    #[clap(short, long, default_value_t = TICK_MS)]
    tick_ms: u64,
    /// Secret that grants host authority in every room
    #[clap(long, env = "CHASER_ADMIN_KEY", default_value = ADMIN_KEY)]
    admin_key: String,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = ServerConfig {
        tick_duration: Duration::from_millis(args.tick_ms.max(1)),
        admin_key: args.admin_key,
        ..ServerConfig::default()
    };

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, config).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
