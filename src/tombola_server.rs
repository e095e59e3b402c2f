// src/tombola_server.rs
// Entry point of the card pool server.

use std::path::PathBuf;

use clap::Parser;

use tombola_cards::config::ServerConfig;
use tombola_cards::logging::{log_error_stderr, set_log_level};
use tombola_cards::server::{load_pool, start_server};

#[derive(Parser)]
#[command(name = env!("CARGO_BIN_NAME"))]
#[command(about = "Tombola Card Server - Hand out cards from a shared pool and track marked numbers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Address to bind (default from config)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (default from config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Number of cards to generate when no pool file exists
    #[arg(long)]
    pool_size: Option<u32>,

    /// JSON file the pool is loaded from and saved to
    #[arg(long)]
    pool_file: Option<PathBuf>,

    /// Generate a fresh pool even if the pool file exists
    #[arg(long)]
    regenerate: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut config = ServerConfig::load_or_default();
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(pool_size) = args.pool_size {
        config.pool_size = pool_size;
    }
    if args.pool_file.is_some() {
        config.pool_file = args.pool_file;
    }
    set_log_level(config.log_level);

    let store = match load_pool(&config, args.regenerate) {
        Ok(store) => store,
        Err(e) => {
            log_error_stderr(&format!("Could not prepare the card pool: {e}"));
            std::process::exit(1);
        }
    };

    if let Err(e) = start_server(config, store).await {
        log_error_stderr(&format!("Server task failed: {e}"));
        std::process::exit(1);
    }
}
