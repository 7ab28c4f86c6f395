use clap::Parser;
use client::bot::Wanderer;
use client::network::{Client, ClientError, ClientWriter, ServerReader};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{GameMap, Role, RENDER_OFFSET};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless bot client for the tag game", long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Position updates per second
    #[arg(short = 'r', long, default_value = "20")]
    rate: u32,

    /// Disconnect after this many updates
    #[arg(short = 't', long)]
    ticks: Option<u64>,

    /// Distance covered per update, in cells
    #[arg(long, default_value = "0.1")]
    speed: f64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut client = Client::connect(&args.server).await?;
    let client_id = client.client_id();
    let map = client.map().clone();

    // The spawn is only visible through the first broadcast.
    let first = client.next_state().await?;
    let me = first.client(client_id).ok_or(ClientError::NotInState(client_id))?;
    info!("Spawned as {} at ({:.1}, {:.1})", me.role, me.x + RENDER_OFFSET, me.y + RENDER_OFFSET);

    let bot = Wanderer::new(me.x + RENDER_OFFSET, me.y + RENDER_OFFSET, args.speed);
    let (reader, writer) = client.into_split();

    tokio::select! {
        result = walk(writer, bot, map, args.rate, args.ticks) => {
            if let Err(e) = result {
                warn!("Stopped sending: {}", e);
            }
        }
        result = watch(reader, client_id, me.role) => {
            if let Err(e) = result {
                warn!("Lost server: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, disconnecting...");
        }
    }

    Ok(())
}

/// Streams wandering positions until `ticks` updates were sent
async fn walk(
    mut writer: ClientWriter,
    mut bot: Wanderer,
    map: GameMap,
    rate: u32,
    ticks: Option<u64>,
) -> Result<(), ClientError> {
    let mut timer = interval(Duration::from_secs_f64(1.0 / f64::from(rate.max(1))));
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut rng = StdRng::from_entropy();
    let mut sent = 0u64;

    while ticks.map_or(true, |limit| sent < limit) {
        timer.tick().await;
        let (x, y) = bot.step(&map, &mut rng);
        writer.send_position(x, y).await?;
        sent += 1;
    }

    info!("Sent {} updates, disconnecting", sent);
    writer.close().await
}

/// Logs role changes and player counts from the broadcasts
async fn watch(mut reader: ServerReader, client_id: u32, mut role: Role) -> Result<(), ClientError> {
    let mut players = 0;

    loop {
        let state = reader.next_state().await?;
        if state.clients.len() != players {
            players = state.clients.len();
            info!("{} players connected", players);
        }

        if let Some(me) = state.client(client_id) {
            if me.role != role {
                role = me.role;
                info!("Now playing as {}", role);
            }
        }
    }
}
