use clap::Parser;
use log::{error, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use server::config::{Args, ServerConfig};
use server::frontend::{generate_map, Frontend, HeadlessFrontend};
use server::network::Server;
use server::powerup::GridPowerups;
use server::spawn::NthClientTagger;
use tokio_util::sync::CancellationToken;

/// Parses arguments, starts the network side on a tokio runtime and runs the
/// game loop on the main thread until Ctrl+C.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::from_args(Args::parse())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("tag-network")
        .build()?;

    let mut rng = StdRng::from_entropy();
    let map = generate_map(
        config.map_width,
        config.map_height,
        config.obstacle_density,
        &mut rng,
    );

    let stop = CancellationToken::new();
    let frontend = HeadlessFrontend::new(map, config.frame_rate, stop.clone());
    let powerups = GridPowerups::spawn(frontend.game_map(), config.powerups, &mut rng);

    let server = runtime.block_on(Server::start(
        &config.bind_addr,
        frontend.game_map().clone(),
        Box::new(NthClientTagger::new(config.tagger_slot)),
    ))?;

    runtime.spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down gracefully...");
                stop.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    info!(
        "Running at {} fps with {:?} tag policy",
        config.frame_rate, config.tag_policy
    );
    let cause = server.run(frontend, powerups, config.tag_policy);
    info!("Server stopped: {}", cause);

    Ok(())
}
