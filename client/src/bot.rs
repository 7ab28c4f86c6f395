//! Scripted movement for headless clients

use rand::seq::SliceRandom;
use rand::Rng;
use shared::{GameMap, WALKABLE};

/// Walks from cell to neighbouring walkable cell at a fixed speed
///
/// Positions are continuous; targets are cell coordinates. Picks a new random
/// neighbour whenever the current target is reached, so the bot never steps
/// onto an obstacle.
#[derive(Debug, Clone)]
pub struct Wanderer {
    x: f64,
    y: f64,
    target: Option<(usize, usize)>,
    speed: f64,
}

impl Wanderer {
    pub fn new(x: f64, y: f64, speed: f64) -> Self {
        Self {
            x,
            y,
            target: None,
            speed: speed.max(0.0),
        }
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    pub fn target(&self) -> Option<(usize, usize)> {
        self.target
    }

    /// Advances one update and returns the new position
    pub fn step<R: Rng + ?Sized>(&mut self, map: &GameMap, rng: &mut R) -> (f64, f64) {
        let target = match self.target {
            Some(target) => target,
            None => match self.pick_target(map, rng) {
                Some(target) => target,
                None => return self.position(),
            },
        };

        let (tx, ty) = (target.0 as f64, target.1 as f64);
        let (dx, dy) = (tx - self.x, ty - self.y);
        let distance = (dx * dx + dy * dy).sqrt();

        if distance <= self.speed {
            self.x = tx;
            self.y = ty;
            self.target = None;
        } else {
            self.x += dx / distance * self.speed;
            self.y += dy / distance * self.speed;
        }

        self.position()
    }

    fn pick_target<R: Rng + ?Sized>(&mut self, map: &GameMap, rng: &mut R) -> Option<(usize, usize)> {
        let cx = self.x.round().max(0.0) as usize;
        let cy = self.y.round().max(0.0) as usize;

        let neighbours: Vec<(usize, usize)> = [(1i64, 0i64), (-1, 0), (0, 1), (0, -1)]
            .iter()
            .filter_map(|(ox, oy)| {
                let x = usize::try_from(cx as i64 + ox).ok()?;
                let y = usize::try_from(cy as i64 + oy).ok()?;
                (map.cell(x, y) == Some(WALKABLE)).then_some((x, y))
            })
            .collect();

        self.target = neighbours.choose(rng).copied();
        self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn corridor() -> GameMap {
        GameMap::new(vec![
            vec![1, 1, 1, 1, 1],
            vec![1, 0, 0, 0, 1],
            vec![1, 1, 1, 1, 1],
        ])
    }

    #[test]
    fn test_stays_on_walkable_cells() {
        let map = corridor();
        let mut rng = StdRng::seed_from_u64(5);
        let mut bot = Wanderer::new(2.0, 1.0, 0.25);

        for _ in 0..500 {
            let (x, y) = bot.step(&map, &mut rng);
            assert_approx_eq!(y, 1.0);
            assert!((1.0..=3.0).contains(&x), "left the corridor at x={}", x);
        }
    }

    #[test]
    fn test_moves_at_most_speed_per_step() {
        let map = corridor();
        let mut rng = StdRng::seed_from_u64(8);
        let mut bot = Wanderer::new(1.0, 1.0, 0.3);

        let mut last = bot.position();
        for _ in 0..50 {
            let next = bot.step(&map, &mut rng);
            let moved = ((next.0 - last.0).powi(2) + (next.1 - last.1).powi(2)).sqrt();
            assert!(moved <= 0.3 + 1e-4);
            last = next;
        }
    }

    #[test]
    fn test_boxed_in_bot_stands_still() {
        let map = GameMap::new(vec![vec![1, 1, 1], vec![1, 0, 1], vec![1, 1, 1]]);
        let mut rng = StdRng::seed_from_u64(1);
        let mut bot = Wanderer::new(1.0, 1.0, 0.5);

        assert_eq!(bot.step(&map, &mut rng), (1.0, 1.0));
        assert!(bot.target().is_none());
    }
}
