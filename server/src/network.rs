//! Server network layer: listener setup and the handles shutdown needs

use crate::acceptor::Acceptor;
use crate::frontend::Frontend;
use crate::game_loop::{GameLoop, ShutdownCause};
use crate::powerup::PowerupSystem;
use crate::registry::SessionRegistry;
use crate::spawn::RoleAssigner;
use crate::supervisor::ConnectionSupervisor;
use crate::tagging::TagPolicy;
use log::{debug, error, info, warn};
use shared::GameMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long shutdown waits for the acceptor to exit
pub const ACCEPTOR_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Running network side of the server
///
/// The acceptor and every connection handler run on the tokio runtime that
/// was current when [`Server::start`] was awaited. The game loop drives the
/// server from a plain thread through [`Server::run`].
pub struct Server {
    local_addr: SocketAddr,
    registry: SessionRegistry,
    supervisor: ConnectionSupervisor,
    shutdown: CancellationToken,
    acceptor: JoinHandle<()>,
    runtime: Handle,
}

impl Server {
    /// Binds the listener and starts accepting clients
    pub async fn start(
        addr: &str,
        map: GameMap,
        roles: Box<dyn RoleAssigner>,
    ) -> io::Result<Self> {
        if !map.has_walkable_cell() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "map has no walkable cell to spawn clients on",
            ));
        }

        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let registry = SessionRegistry::new();
        let supervisor = ConnectionSupervisor::new();
        let shutdown = CancellationToken::new();

        let acceptor = Acceptor::new(
            listener,
            Arc::new(map),
            registry.clone(),
            roles,
            supervisor.clone(),
            shutdown.clone(),
        )
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        Ok(Self {
            local_addr,
            registry,
            supervisor,
            shutdown,
            acceptor: tokio::spawn(acceptor.run()),
            runtime: Handle::current(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Token cancelled when shutdown starts
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs the game loop on the calling thread until it stops
    ///
    /// Blocks, and must not be called from inside the runtime.
    pub fn run<F, P>(self, frontend: F, powerups: P, policy: TagPolicy) -> ShutdownCause
    where
        F: Frontend,
        P: PowerupSystem,
    {
        let mut game = GameLoop::new(frontend, powerups, self.registry.clone(), policy);
        game.run(self)
    }

    /// Stops accepting, closes every session and waits for the acceptor
    ///
    /// Connection handlers are not awaited; they remove their sessions as
    /// they observe the close.
    pub(crate) fn stop(self) {
        self.shutdown.cancel();
        let closed = self.registry.close_all();
        debug!("Closed {} client connections", closed);
        self.supervisor.close();

        let joined = self
            .runtime
            .block_on(tokio::time::timeout(ACCEPTOR_JOIN_TIMEOUT, self.acceptor));
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Acceptor task failed: {}", e),
            Err(_) => warn!("Acceptor did not stop within {:?}", ACCEPTOR_JOIN_TIMEOUT),
        }

        let draining = self.supervisor.active();
        if draining > 0 {
            debug!("{} connection handlers still draining", draining);
        }
    }
}
