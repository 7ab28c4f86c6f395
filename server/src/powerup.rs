//! Powerup collaborator: placement on the map and pickup by players

use crate::spawn::random_spawn;
use log::{debug, info};
use rand::Rng;
use shared::{GameMap, Player, PowerupPositions};
use std::collections::BTreeMap;

/// A player within this distance on both axes picks a powerup up
pub const PICKUP_RANGE: f64 = 0.5;

pub trait PowerupSystem {
    /// Current powerup locations, broadcast as-is every tick
    fn powerup_positions(&self) -> &PowerupPositions;

    /// Applies any powerup `player` is touching to its flags
    fn check_powerup_collisions(&mut self, player: &mut Player);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerupKind {
    Ghost,
    Shield,
}

impl PowerupKind {
    fn apply(self, player: &mut Player) {
        match self {
            PowerupKind::Ghost => player.ghost = true,
            PowerupKind::Shield => player.shield = true,
        }
    }
}

/// Powerups placed on walkable cells, each consumed by its first pickup
#[derive(Debug, Clone, Default)]
pub struct GridPowerups {
    positions: PowerupPositions,
    kinds: BTreeMap<u32, PowerupKind>,
    next_id: u32,
}

impl GridPowerups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places `count` powerups of random kind on random walkable cells
    pub fn spawn<R: Rng + ?Sized>(map: &GameMap, count: usize, rng: &mut R) -> Self {
        let mut powerups = Self::new();

        for _ in 0..count {
            let Some((x, y)) = random_spawn(map, rng) else {
                break;
            };
            let kind = if rng.gen_bool(0.5) {
                PowerupKind::Ghost
            } else {
                PowerupKind::Shield
            };
            powerups.insert(kind, x as f64, y as f64);
        }

        info!("Spawned {} powerups", powerups.len());
        powerups
    }

    /// Adds a powerup and returns its ID
    pub fn insert(&mut self, kind: PowerupKind, x: f64, y: f64) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.positions.insert(id, (x, y));
        self.kinds.insert(id, kind);
        id
    }

    pub fn kind(&self, id: u32) -> Option<PowerupKind> {
        self.kinds.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

impl PowerupSystem for GridPowerups {
    fn powerup_positions(&self) -> &PowerupPositions {
        &self.positions
    }

    fn check_powerup_collisions(&mut self, player: &mut Player) {
        let touched = self.positions.iter().find_map(|(&id, &(x, y))| {
            ((player.x - x).abs() < PICKUP_RANGE && (player.y - y).abs() < PICKUP_RANGE)
                .then_some(id)
        });

        let Some(id) = touched else {
            return;
        };
        self.positions.remove(&id);
        if let Some(kind) = self.kinds.remove(&id) {
            kind.apply(player);
            debug!("Powerup {} ({:?}) picked up", id, kind);
        }
    }
}
