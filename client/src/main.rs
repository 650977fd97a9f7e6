use clap::Parser;
use client::config::GameConfig;
use client::input::spawn_stdin_reader;
use client::network::{Client, NetworkClient};
use log::{info, warn};
use shared::MIN_PLAYERS_TO_START;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to (overrides the config file)
    #[arg(short = 's', long)]
    server: Option<String>,

    /// Path to the JSON game configuration
    #[arg(short = 'c', long, default_value = "config.json")]
    config: String,

    /// Token presented to the relay server
    #[arg(short = 't', long)]
    token: String,

    /// Display name
    #[arg(short = 'u', long, default_value = "player")]
    username: String,

    /// Join an existing room instead of hosting one
    #[arg(short = 'j', long)]
    join: Option<String>,

    /// Players required before the host starts the round
    #[arg(short = 'p', long, default_value_t = MIN_PLAYERS_TO_START)]
    players: usize,

    /// List active rooms and exit
    #[arg(long)]
    list: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut config = GameConfig::load(&args.config)?;
    if let Some(server) = args.server {
        config.server_addr = server;
    }

    info!("Starting client...");
    info!("Connecting to: {}", config.server_addr);

    let mut network = NetworkClient::connect(&config.server_addr).await?;
    let session = network
        .authenticate(&args.token, &args.username, config.auth_timeout())
        .await?;

    if args.list {
        for room in network.list_rooms().await? {
            println!("{}  players={}  state={:?}", room.id, room.player_count, room.state);
        }
        return Ok(());
    }

    let mut client = match args.join {
        Some(room_id) => Client::join(network, config.clone(), session, &room_id).await?,
        None => Client::host(network, config.clone(), session).await?,
    };

    if client.is_host() {
        println!("Room id: {}", client.room_id());
    }

    let (key_tx, mut key_rx) = mpsc::channel(32);
    let stdin_reader = spawn_stdin_reader(key_tx);

    if let Some(spawn) = config.spawn_for(client.is_host()) {
        let mut keys: Vec<_> = spawn.keys.iter().collect();
        keys.sort_by(|a, b| a.0.cmp(b.0));
        info!("Controls (type keys then Enter): {:?}", keys);
    }

    let result = match client.wait_for_round(args.players).await {
        Ok(started) => client.run_round(&started, &mut key_rx).await,
        Err(e) => Err(e),
    };

    client.leave().await;
    stdin_reader.abort();

    match result {
        Ok(summary) => {
            if summary.interrupted {
                warn!("Round interrupted after {} turns", summary.turns);
            }
            println!(
                "Round over. Winner: {}. Your score: {}",
                summary.winner.as_deref().unwrap_or("none"),
                summary.score
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
