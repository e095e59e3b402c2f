// src/card_client.rs
// Player client: claim a card for this device and mark numbers as they are called.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use tombola_cards::claim::{ClaimNegotiator, ClaimRequest};
use tombola_cards::clients::display::{render_card, render_claimed};
use tombola_cards::clients::http_store::HttpCardStore;
use tombola_cards::config::ClientConfig;
use tombola_cards::defs::Number;
use tombola_cards::identity::IdentityProvider;
use tombola_cards::logging::{log_error_stderr, set_log_level};
use tombola_cards::retry::RetryPolicy;
use tombola_cards::tracker::{MarkTracker, ToggleOutcome};

#[derive(Parser)]
#[command(name = env!("CARGO_BIN_NAME"))]
#[command(about = "Tombola Player - Claim a card from the shared pool and mark your numbers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Card to play (claimed for this device if still free)
    #[arg(long)]
    card_id: Option<String>,

    /// Get a random unclaimed card
    #[arg(long)]
    random: bool,

    /// Play as this device instead of the stored identity
    #[arg(long)]
    device_id: Option<String>,

    /// File holding the device identity (default from config)
    #[arg(long)]
    identity_file: Option<PathBuf>,

    /// Exit after displaying the card (no interactive loop)
    #[arg(long)]
    exit: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = ClientConfig::load_or_default();
    set_log_level(config.log_level);

    let device_id = match args.device_id {
        Some(device_id) => device_id,
        None => {
            let path = args.identity_file.unwrap_or_else(|| config.identity_file.clone());
            match IdentityProvider::new(path).load_or_create() {
                Ok(device_id) => device_id,
                Err(e) => {
                    log_error_stderr(&format!("Could not establish device identity: {e}"));
                    std::process::exit(1);
                }
            }
        }
    };

    let request = match ClaimRequest::from_params(args.card_id.as_deref(), args.random.then_some("true")) {
        Ok(request) => request,
        Err(e) => {
            println!("❌ {e}. Use --card-id <ID> or --random");
            std::process::exit(1);
        }
    };

    let store = match HttpCardStore::from_config(&config) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            log_error_stderr(&format!("{e}"));
            std::process::exit(1);
        }
    };

    println!("🚀 Tombola Player connecting to {}", store.server_url());

    let negotiator = ClaimNegotiator::with_policy(
        Arc::clone(&store),
        RetryPolicy::new(config.max_claim_attempts, config.retry_base_delay()),
    );

    let card = match negotiator.resolve(&request, &device_id).await {
        Ok(card) => card,
        Err(e) => {
            println!("❌ {e}");
            std::process::exit(1);
        }
    };

    println!("{}", render_claimed(card.id, matches!(request, ClaimRequest::Random)));

    let mut tracker = MarkTracker::with_card(store, device_id, card);
    show(&tracker);

    if args.exit {
        return;
    }

    println!("Type a number to mark or unmark it, 'q' to quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                log_error_stderr(&format!("Failed to read input: {e}"));
                break;
            }
        };

        let input = line.trim();
        if input.eq_ignore_ascii_case("q") {
            break;
        }

        let Ok(number) = input.parse::<Number>() else {
            println!("⚠️  '{input}' is not a number");
            continue;
        };

        match tracker.toggle(number).await {
            ToggleOutcome::Applied => {
                print!("\x1b[2J\x1b[1;1H");
                show(&tracker);
            }
            ToggleOutcome::Ignored => println!("⚠️  {number} is not on your card"),
            ToggleOutcome::WriteFailed(e) => println!("❌ Could not save {number}: {e}"),
        }
    }

    println!("👋 Goodbye");
}

fn show(tracker: &MarkTracker<Arc<HttpCardStore>>) {
    if let Some(card) = tracker.card() {
        print!("{}", render_card(card, tracker.marked_numbers()));
    }
}
