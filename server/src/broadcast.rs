//! Per-tick state snapshots and their fan-out to every session

use crate::registry::{ClientSession, Frame, SessionRegistry};
use log::{debug, warn};
use shared::{
    ClientPlayerState, Player, PowerupPositions, ProtocolError, ServerMessage, ServerPlayerState,
    StateSnapshot,
};
use std::sync::Arc;

/// Delivery counts for one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub sent: usize,
    pub dropped: usize,
}

/// Builds the snapshot for the given sessions
///
/// Each player is read under its own lock, one at a time, so positions are
/// not consistent across players.
pub fn build_snapshot(
    server_player: &Player,
    sessions: &[Arc<ClientSession>],
    powerups: &PowerupPositions,
) -> StateSnapshot {
    let clients = sessions
        .iter()
        .map(|session| {
            let state = ClientPlayerState::from_player(session.id(), &session.player());
            (state.id.clone(), state)
        })
        .collect();

    StateSnapshot {
        server: ServerPlayerState::from_player(server_player),
        clients,
        powerups: powerups.clone(),
    }
}

/// Encodes a snapshot once into a shareable frame
pub fn encode_snapshot(snapshot: StateSnapshot) -> Result<Frame, ProtocolError> {
    Ok(Frame::from(ServerMessage::State(snapshot).encode()?))
}

/// Sends one `state` frame to every registered session
///
/// The frame is queued without waiting. A session whose queue is full or
/// closed misses this frame; its handler deals with the connection.
pub fn broadcast_state(
    registry: &SessionRegistry,
    server_player: &Player,
    powerups: &PowerupPositions,
) -> BroadcastReport {
    let sessions = registry.snapshot();
    let mut report = BroadcastReport::default();
    if sessions.is_empty() {
        return report;
    }

    let frame = match encode_snapshot(build_snapshot(server_player, &sessions, powerups)) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Failed to encode state: {}", e);
            return report;
        }
    };

    for session in &sessions {
        match session.send(Arc::clone(&frame)) {
            Ok(()) => report.sent += 1,
            Err(e) => {
                report.dropped += 1;
                debug!("Error broadcasting state to client {}: {}", session.id(), e);
            }
        }
    }

    report
}
