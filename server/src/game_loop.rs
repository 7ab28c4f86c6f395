//! The per-tick orchestration and the shutdown sequence
//!
//! Each tick runs, in order:
//! 1. One frontend frame (rendering and local input)
//! 2. Server player sync: pinned to the origin, role copied from the frontend
//! 3. Powerup collision checks for every registered client
//! 4. State broadcast
//! 5. Tag resolution
//!
//! Connection handlers keep updating positions while a tick runs, so the
//! positions read by steps 3 to 5 may belong to different instants.

use crate::broadcast::broadcast_state;
use crate::frontend::Frontend;
use crate::network::Server;
use crate::powerup::PowerupSystem;
use crate::registry::SessionRegistry;
use crate::tagging::{resolve_tags, TagPolicy};
use log::{debug, error, info};
use shared::{Player, Role};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    ShuttingDown,
}

/// Why the loop left the running state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownCause {
    /// The frontend asked to stop
    FrontendClosed,
    /// A tick panicked; the message is the panic payload when it was a string
    Fault(String),
}

impl fmt::Display for ShutdownCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownCause::FrontendClosed => write!(f, "frontend closed"),
            ShutdownCause::Fault(msg) => write!(f, "fault in game loop: {}", msg),
        }
    }
}

pub struct GameLoop<F, P> {
    frontend: F,
    powerups: P,
    registry: SessionRegistry,
    policy: TagPolicy,
    server_player: Player,
    state: LoopState,
    ticks: u64,
    tags: u64,
    blocked_tags: u64,
    dropped_frames: u64,
}

impl<F: Frontend, P: PowerupSystem> GameLoop<F, P> {
    pub fn new(frontend: F, powerups: P, registry: SessionRegistry, policy: TagPolicy) -> Self {
        Self {
            frontend,
            powerups,
            registry,
            policy,
            server_player: Player::new(0.0, 0.0, Role::Runner),
            state: LoopState::Running,
            ticks: 0,
            tags: 0,
            blocked_tags: 0,
            dropped_frames: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn server_player(&self) -> &Player {
        &self.server_player
    }

    pub fn frontend(&self) -> &F {
        &self.frontend
    }

    pub fn powerups(&self) -> &P {
        &self.powerups
    }

    /// Runs one tick and returns whether the frontend wants to keep going
    ///
    /// The remaining steps still run on the tick where the frontend asks to
    /// stop, so clients see one final state. Once the loop is shutting down
    /// this does nothing and returns false.
    pub fn tick(&mut self) -> bool {
        if self.state == LoopState::ShuttingDown {
            return false;
        }

        let keep_running = self.frontend.display_map();

        self.server_player.x = 0.0;
        self.server_player.y = 0.0;
        self.server_player.role = self.frontend.local_player().role;

        let powerups = &mut self.powerups;
        for session in self.registry.snapshot() {
            session.with_player(|player| powerups.check_powerup_collisions(player));
        }

        let report = broadcast_state(
            &self.registry,
            &self.server_player,
            self.powerups.powerup_positions(),
        );
        self.dropped_frames += report.dropped as u64;

        let outcome = resolve_tags(&self.registry, self.policy);
        self.tags += outcome.tagged.len() as u64;
        self.blocked_tags += outcome.blocked.len() as u64;

        self.ticks += 1;
        if self.ticks % 60 == 0 {
            debug!(
                "Tick {}: {} clients, {} tags ({} blocked by shields), {} dropped frames",
                self.ticks,
                self.registry.len(),
                self.tags,
                self.blocked_tags,
                self.dropped_frames
            );
        }

        keep_running
    }

    /// Ticks until the frontend stops or a tick panics, then shuts down
    ///
    /// Shutdown always runs: signal cancellation, close every session, stop
    /// the acceptor and wait for it, release the frontend. Must be called
    /// from outside the async runtime. The loop is left in
    /// [`LoopState::ShuttingDown`] and further ticks are no-ops.
    pub fn run(&mut self, server: Server) -> ShutdownCause {
        info!("Game loop started");

        let ticking = panic::catch_unwind(AssertUnwindSafe(|| while self.tick() {}));
        let cause = match ticking {
            Ok(()) => ShutdownCause::FrontendClosed,
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                error!("Game loop fault: {}", msg);
                ShutdownCause::Fault(msg)
            }
        };

        self.state = LoopState::ShuttingDown;
        info!("Shutting down server after {} ticks ({})...", self.ticks, cause);
        server.stop();
        self.frontend.shutdown();
        info!("Server shutdown complete.");

        cause
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
