//! # Tag Game Server Library
//!
//! Authoritative networking core for the tag game. The server accepts TCP
//! clients, hands each a spawn cell and a role, ingests their position
//! updates, resolves tags, and broadcasts one full state snapshot per tick.
//!
//! ## Architecture
//!
//! ### Network Side (tokio runtime)
//! - **Acceptor** (`acceptor`): handshakes new connections (`map`, then
//!   `client_id`), assigns spawn and role, registers the session
//! - **Connection handlers** (`connection`): one task per client that parses
//!   newline-delimited JSON frames and writes queued outbound frames
//! - **Supervisor** (`supervisor`): owns the per-connection tasks
//!
//! ### Game Side (the frontend's thread)
//! - **Game loop** (`game_loop`): frontend frame, powerup checks, broadcast,
//!   tag resolution; owns the shutdown sequence
//! - **Broadcaster** (`broadcast`) and **tag resolver** (`tagging`)
//!
//! Both sides meet only at the **session registry** (`registry`), a single
//! lock around the session list. Nothing holds that lock across I/O:
//! broadcasts copy the session list, then queue frames without waiting.
//!
//! ### Collaborators
//! Rendering and powerups sit behind the `Frontend` and `PowerupSystem`
//! traits. `HeadlessFrontend` and `GridPowerups` are the implementations the
//! binary uses.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::frontend::{generate_map, Frontend, HeadlessFrontend};
//! use server::network::Server;
//! use server::powerup::GridPowerups;
//! use server::spawn::NthClientTagger;
//! use server::tagging::TagPolicy;
//! use tokio_util::sync::CancellationToken;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = tokio::runtime::Runtime::new()?;
//!     let mut rng = rand::thread_rng();
//!
//!     let frontend = HeadlessFrontend::new(
//!         generate_map(20, 15, 0.15, &mut rng),
//!         60,
//!         CancellationToken::new(),
//!     );
//!     let powerups = GridPowerups::spawn(frontend.game_map(), 5, &mut rng);
//!
//!     let server = runtime.block_on(Server::start(
//!         "0.0.0.0:8080",
//!         frontend.game_map().clone(),
//!         Box::new(NthClientTagger::default()),
//!     ))?;
//!
//!     // Ticks until the frontend stops, then shuts the network down
//!     server.run(frontend, powerups, TagPolicy::default());
//!     Ok(())
//! }
//! ```

pub mod acceptor;
pub mod broadcast;
pub mod config;
pub mod connection;
pub mod frontend;
pub mod game_loop;
pub mod network;
pub mod powerup;
pub mod registry;
pub mod spawn;
pub mod supervisor;
pub mod tagging;
