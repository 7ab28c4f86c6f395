//! Connected-session bookkeeping shared by every server component
//!
//! This module owns the only shared mutable collection in the server:
//! - Session lifecycle (registered by the acceptor, removed by its handler)
//! - Point-in-time snapshots for the game loop to iterate without the lock
//! - Per-session player state and the outbound frame queue
//!
//! Every registry operation holds the lock only for its own duration and never
//! performs network I/O while holding it. Lock order is registry, then player.

use log::debug;
use parking_lot::Mutex;
use shared::{Player, Role};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

/// One encoded, newline-terminated frame. Cloning shares the bytes.
pub type Frame = Arc<str>;

/// Why a frame could not be queued for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("outbound queue is full")]
    QueueFull,
    #[error("session is closed")]
    Closed,
}

/// Server-side state of one connected client
///
/// Each session holds:
/// - Its identity (ID and peer address), immutable for the session lifetime
/// - The player it exclusively owns, behind its own lock
/// - A handle to the connection: the outbound queue drained by the writer
///   task and a close token observed by the handler
#[derive(Debug)]
pub struct ClientSession {
    id: u32,
    addr: SocketAddr,
    player: Mutex<Player>,
    outbound: mpsc::Sender<Frame>,
    closer: CancellationToken,
}

impl ClientSession {
    /// Creates a session for an accepted connection
    ///
    /// The `closer` token is normally a child of the server shutdown token,
    /// so a global shutdown also closes every session.
    pub fn new(
        id: u32,
        addr: SocketAddr,
        player: Player,
        outbound: mpsc::Sender<Frame>,
        closer: CancellationToken,
    ) -> Self {
        Self {
            id,
            addr,
            player: Mutex::new(player),
            outbound,
            closer,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns a copy of the player as it is right now
    pub fn player(&self) -> Player {
        *self.player.lock()
    }

    pub fn role(&self) -> Role {
        self.player.lock().role
    }

    /// Applies a client-reported position without validation
    pub fn set_position(&self, x: f64, y: f64) {
        let mut player = self.player.lock();
        player.x = x;
        player.y = y;
    }

    /// Runs `f` with exclusive access to the player
    ///
    /// Keep `f` short: the player lock is also taken by the connection handler
    /// for every position update.
    pub fn with_player<R>(&self, f: impl FnOnce(&mut Player) -> R) -> R {
        f(&mut self.player.lock())
    }

    /// Queues a frame for the writer task without waiting
    ///
    /// A full queue means the client is not keeping up; the frame is dropped
    /// and the caller decides whether to log it.
    pub fn send(&self, frame: Frame) -> Result<(), SendError> {
        if self.closer.is_cancelled() {
            return Err(SendError::Closed);
        }

        self.outbound.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => SendError::QueueFull,
            TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Asks the handler to drop the connection. Safe to call repeatedly.
    pub fn close(&self) {
        self.closer.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closer.is_cancelled()
    }

    /// Resolves once the session has been closed from any side
    pub async fn closed(&self) {
        self.closer.cancelled().await
    }
}

/// Thread-safe, ordered collection of connected sessions
///
/// Cloning the registry clones the handle, not the sessions. Iteration order
/// is registration order, which also decides tag resolution order.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<Vec<Arc<ClientSession>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session
    ///
    /// Returns false, leaving the registry untouched, if a session with the
    /// same ID is already present.
    pub fn add(&self, session: Arc<ClientSession>) -> bool {
        let mut sessions = self.sessions.lock();
        if sessions.iter().any(|s| s.id == session.id) {
            return false;
        }

        debug!("Registered session {} ({})", session.id, session.addr);
        sessions.push(session);
        true
    }

    /// Removes a session by ID
    ///
    /// Returns the removed session, or None if it was already gone. Removing
    /// twice is harmless, which lets the handler cleanup race with shutdown.
    pub fn remove(&self, client_id: u32) -> Option<Arc<ClientSession>> {
        let mut sessions = self.sessions.lock();
        let index = sessions.iter().position(|s| s.id == client_id)?;
        let session = sessions.remove(index);

        debug!("Unregistered session {}", client_id);
        Some(session)
    }

    /// Copies the current session handles
    ///
    /// The lock is released before this returns, so callers can serialize
    /// and send without holding it.
    pub fn snapshot(&self) -> Vec<Arc<ClientSession>> {
        self.sessions.lock().clone()
    }

    /// Finds the first session, in registration order, holding the tagger role
    pub fn find_tagger(&self) -> Option<Arc<ClientSession>> {
        self.sessions
            .lock()
            .iter()
            .find(|s| s.role() == Role::Tagger)
            .cloned()
    }

    pub fn get(&self, client_id: u32) -> Option<Arc<ClientSession>> {
        self.sessions
            .lock()
            .iter()
            .find(|s| s.id == client_id)
            .cloned()
    }

    pub fn contains(&self, client_id: u32) -> bool {
        self.sessions.lock().iter().any(|s| s.id == client_id)
    }

    /// Closes every registered session and returns how many were closed
    ///
    /// Sessions stay registered; each handler removes its own entry once it
    /// observes the close.
    pub fn close_all(&self) -> usize {
        let sessions = self.snapshot();
        for session in &sessions {
            session.close();
        }
        sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

/// Builds a detached session for unit tests, returning its outbound receiver
#[cfg(test)]
pub(crate) fn test_session(
    id: u32,
    player: Player,
) -> (Arc<ClientSession>, mpsc::Receiver<Frame>) {
    let (tx, rx) = mpsc::channel(8);
    let addr = SocketAddr::from(([127, 0, 0, 1], 40000 + id as u16));
    let session = ClientSession::new(id, addr, player, tx, CancellationToken::new());
    (Arc::new(session), rx)
}
