//! TCP admission: handshake, spawn and role assignment, registration

use crate::connection::ConnectionHandler;
use crate::registry::{ClientSession, Frame, SessionRegistry};
use crate::spawn::{random_spawn, RoleAssigner};
use crate::supervisor::ConnectionSupervisor;
use log::{error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{GameMap, Player, ProtocolError, ServerMessage};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{split, AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Upper bound for writing each handshake frame
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
/// Frames buffered per client before broadcasts start dropping
pub const OUTBOUND_QUEUE: usize = 64;

/// Why a connection was dropped before it became a session
#[derive(Debug, thiserror::Error)]
pub enum AcceptError {
    #[error("error sending map: {0}")]
    SendMap(#[source] io::Error),
    #[error("error sending client ID: {0}")]
    SendClientId(#[source] io::Error),
    #[error("handshake timed out")]
    HandshakeTimeout,
    #[error("map has no walkable cell")]
    NoSpawnCell,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Accepts connections until shutdown and turns each into a session
pub struct Acceptor {
    listener: TcpListener,
    map: Arc<GameMap>,
    map_frame: Frame,
    registry: SessionRegistry,
    roles: Box<dyn RoleAssigner>,
    supervisor: ConnectionSupervisor,
    shutdown: CancellationToken,
    next_client_id: u32,
    rng: StdRng,
}

impl Acceptor {
    pub fn new(
        listener: TcpListener,
        map: Arc<GameMap>,
        registry: SessionRegistry,
        roles: Box<dyn RoleAssigner>,
        supervisor: ConnectionSupervisor,
        shutdown: CancellationToken,
    ) -> Result<Self, ProtocolError> {
        let map_frame = Frame::from(ServerMessage::Map((*map).clone()).encode()?);

        Ok(Self {
            listener,
            map,
            map_frame,
            registry,
            roles,
            supervisor,
            shutdown,
            next_client_id: 1,
            rng: StdRng::from_entropy(),
        })
    }

    /// Accept loop
    ///
    /// Waiting for a connection and each handshake are both raced against the
    /// shutdown token, so the loop exits promptly once shutdown starts even if
    /// a peer stalls mid-handshake. A failing `accept()` stops admission;
    /// existing sessions are unaffected. The listener is closed when this
    /// returns.
    pub async fn run(mut self) {
        let shutdown = self.shutdown.clone();

        loop {
            let accepted = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            let (stream, addr) = match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Error accepting client: {}", e);
                    break;
                }
            };

            info!("Client {} connected: {}", self.next_client_id, addr);
            if let Err(e) = stream.set_nodelay(true) {
                warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Dropped handshake with {} on shutdown", addr);
                    break;
                }
                admitted = self.admit(stream, addr) => {
                    if let Err(e) = admitted {
                        warn!("Rejected connection from {}: {}", addr, e);
                    }
                }
            }
        }

        info!("Acceptor stopped");
    }

    /// Handshakes a new connection and registers its session
    ///
    /// The `map` and `client_id` frames are written before anything is
    /// registered; if either fails the stream is dropped and the ID is not
    /// consumed.
    async fn admit<S>(&mut self, mut stream: S, addr: SocketAddr) -> Result<u32, AcceptError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (x, y) = random_spawn(&self.map, &mut self.rng).ok_or(AcceptError::NoSpawnCell)?;
        let client_id = self.next_client_id;

        timeout(HANDSHAKE_TIMEOUT, stream.write_all(self.map_frame.as_bytes()))
            .await
            .map_err(|_| AcceptError::HandshakeTimeout)?
            .map_err(AcceptError::SendMap)?;

        let id_frame = ServerMessage::ClientId(client_id).encode()?;
        timeout(HANDSHAKE_TIMEOUT, stream.write_all(id_frame.as_bytes()))
            .await
            .map_err(|_| AcceptError::HandshakeTimeout)?
            .map_err(AcceptError::SendClientId)?;

        let role = self.roles.assign(client_id);
        let player = Player::new(x as f64, y as f64, role);

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let session = Arc::new(ClientSession::new(
            client_id,
            addr,
            player,
            outbound_tx,
            self.shutdown.child_token(),
        ));
        self.registry.add(Arc::clone(&session));
        self.next_client_id += 1;

        info!(
            "Client {} spawned at ({}, {}) as {}",
            client_id, x, y, role
        );

        let handler = ConnectionHandler::new(session, self.registry.clone(), self.shutdown.clone());
        self.supervisor.spawn(client_id, async move {
            let (reader, writer) = split(stream);
            handler.run(reader, writer, outbound_rx).await;
        });

        Ok(client_id)
    }
}
