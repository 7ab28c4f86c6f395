//! Render/input collaborator driven by the game loop
//!
//! The game loop only needs three things from the frontend: the map, the
//! locally controlled player, and one frame of work per tick. A windowed
//! renderer would implement [`Frontend`] the same way [`HeadlessFrontend`]
//! does; the loop runs on the thread that owns it.

use log::{debug, info};
use rand::Rng;
use shared::{GameMap, Player, Role, WALKABLE};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Cell code used for walls and obstacles by [`generate_map`]
pub const OBSTACLE: u8 = 1;

pub trait Frontend {
    fn game_map(&self) -> &GameMap;

    /// The player controlled on the server side
    fn local_player(&self) -> &Player;

    /// Performs one frame of rendering and input handling
    ///
    /// Returns false once the game should stop, e.g. the window was closed.
    /// Pacing of the whole loop is whatever this call takes.
    fn display_map(&mut self) -> bool;

    /// Releases the rendering subsystem. Called once, after networking stopped.
    fn shutdown(&mut self) {}
}

/// Frontend without a window
///
/// Paces frames to a fixed rate by sleeping and stops once its token is
/// cancelled, which stands in for closing the window.
pub struct HeadlessFrontend {
    map: GameMap,
    local_player: Player,
    frame_time: Duration,
    stop: CancellationToken,
    last_frame: Option<Instant>,
    frames: u64,
}

impl HeadlessFrontend {
    pub fn new(map: GameMap, frame_rate: u32, stop: CancellationToken) -> Self {
        let frame_time = Duration::from_nanos(1_000_000_000 / u64::from(frame_rate.max(1)));

        Self {
            map,
            local_player: Player::new(0.0, 0.0, Role::Runner),
            frame_time,
            stop,
            last_frame: None,
            frames: 0,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn frame_time(&self) -> Duration {
        self.frame_time
    }
}

impl Frontend for HeadlessFrontend {
    fn game_map(&self) -> &GameMap {
        &self.map
    }

    fn local_player(&self) -> &Player {
        &self.local_player
    }

    fn display_map(&mut self) -> bool {
        if self.stop.is_cancelled() {
            return false;
        }

        if let Some(last) = self.last_frame {
            let elapsed = last.elapsed();
            if elapsed < self.frame_time {
                std::thread::sleep(self.frame_time - elapsed);
            }
        }
        self.last_frame = Some(Instant::now());
        self.frames += 1;

        !self.stop.is_cancelled()
    }

    fn shutdown(&mut self) {
        info!("Frontend closed after {} frames", self.frames);
    }
}

/// Generates a map with a solid border and randomly scattered obstacles
///
/// Each interior cell becomes an obstacle with probability `density`.
pub fn generate_map<R: Rng + ?Sized>(
    width: usize,
    height: usize,
    density: f64,
    rng: &mut R,
) -> GameMap {
    let density = density.clamp(0.0, 1.0);

    let cells = (0..height)
        .map(|y| {
            (0..width)
                .map(|x| {
                    let border = x == 0 || y == 0 || x + 1 == width || y + 1 == height;
                    if border || rng.gen_bool(density) {
                        OBSTACLE
                    } else {
                        WALKABLE
                    }
                })
                .collect()
        })
        .collect();

    let map = GameMap::new(cells);
    debug!("Generated {}x{} map", map.width(), map.height());
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generated_map_has_border_and_dimensions() {
        let mut rng = StdRng::seed_from_u64(3);
        let map = generate_map(12, 8, 0.3, &mut rng);

        assert_eq!(map.width(), 12);
        assert_eq!(map.height(), 8);
        for x in 0..12 {
            assert_eq!(map.cell(x, 0), Some(OBSTACLE));
            assert_eq!(map.cell(x, 7), Some(OBSTACLE));
        }
        for y in 0..8 {
            assert_eq!(map.cell(0, y), Some(OBSTACLE));
            assert_eq!(map.cell(11, y), Some(OBSTACLE));
        }
    }

    #[test]
    fn test_zero_density_leaves_interior_open() {
        let mut rng = StdRng::seed_from_u64(9);
        let map = generate_map(5, 4, 0.0, &mut rng);

        for y in 1..3 {
            for x in 1..4 {
                assert_eq!(map.cell(x, y), Some(WALKABLE));
            }
        }
        assert!(map.has_walkable_cell());
    }

    #[test]
    fn test_headless_frontend_stops_on_cancel() {
        let stop = CancellationToken::new();
        let mut frontend = HeadlessFrontend::new(GameMap::new(vec![vec![0]]), 1000, stop.clone());

        assert!(frontend.display_map());
        assert!(frontend.display_map());
        assert_eq!(frontend.frames(), 2);

        stop.cancel();
        assert!(!frontend.display_map());
        assert_eq!(frontend.frames(), 2);
        assert_eq!(frontend.local_player().role, Role::Runner);
    }

    #[test]
    fn test_headless_frontend_paces_frames() {
        let mut frontend =
            HeadlessFrontend::new(GameMap::new(vec![vec![0]]), 100, CancellationToken::new());
        assert_eq!(frontend.frame_time(), Duration::from_millis(10));

        let started = Instant::now();
        for _ in 0..6 {
            frontend.display_map();
        }
        assert!(started.elapsed() >= Duration::from_millis(50));
    }
}
