//! Spawn cell sampling and role assignment for newly admitted clients

use rand::Rng;
use shared::{GameMap, Role, WALKABLE};

/// Samples uniformly random cells until a walkable one turns up
///
/// There is no retry bound and no check against cells other players already
/// occupy, so two clients can share a spawn. Returns None only when no cell
/// inside the grid is walkable, which would otherwise loop forever.
pub fn random_spawn<R: Rng + ?Sized>(map: &GameMap, rng: &mut R) -> Option<(usize, usize)> {
    let (width, height) = (map.width(), map.height());
    let spawnable = (0..height).any(|y| (0..width).any(|x| map.cell(x, y) == Some(WALKABLE)));
    if !spawnable {
        return None;
    }

    loop {
        let x = rng.gen_range(0..width);
        let y = rng.gen_range(0..height);
        if map.is_valid_spawn(x, y) {
            return Some((x, y));
        }
    }
}

/// Decides the starting role of each admitted client
///
/// Called exactly once per client that completed the handshake, in admission
/// order. Closures `FnMut(u32) -> Role` work as strategies too.
pub trait RoleAssigner: Send {
    fn assign(&mut self, client_id: u32) -> Role;
}

impl<F> RoleAssigner for F
where
    F: FnMut(u32) -> Role + Send,
{
    fn assign(&mut self, client_id: u32) -> Role {
        self(client_id)
    }
}

/// Makes the `slot`-th admitted client the game's only tagger
///
/// The flag is one-shot: if that client leaves, nobody is promoted.
#[derive(Debug, Clone)]
pub struct NthClientTagger {
    slot: u32,
    admitted: u32,
    tagger_assigned: bool,
}

impl NthClientTagger {
    pub fn new(slot: u32) -> Self {
        Self {
            slot,
            admitted: 0,
            tagger_assigned: false,
        }
    }

    pub fn tagger_assigned(&self) -> bool {
        self.tagger_assigned
    }
}

impl Default for NthClientTagger {
    fn default() -> Self {
        Self::new(2)
    }
}

impl RoleAssigner for NthClientTagger {
    fn assign(&mut self, _client_id: u32) -> Role {
        self.admitted += 1;
        if self.admitted == self.slot && !self.tagger_assigned {
            self.tagger_assigned = true;
            Role::Tagger
        } else {
            Role::Runner
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sparse_map() -> GameMap {
        // Mostly walls with a handful of open cells.
        let mut cells = vec![vec![1u8; 12]; 9];
        cells[2][3] = 0;
        cells[7][10] = 0;
        cells[4][0] = 0;
        GameMap::new(cells)
    }

    #[test]
    fn test_spawn_is_always_walkable() {
        let map = sparse_map();

        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            let (x, y) = random_spawn(&map, &mut rng).unwrap();
            assert!(map.is_valid_spawn(x, y));
            assert_eq!(map.cell(x, y), Some(0));
        }
    }

    #[test]
    fn test_single_open_cell_is_found() {
        let mut cells = vec![vec![2u8; 5]; 5];
        cells[4][4] = 0;
        let map = GameMap::new(cells);
        let mut rng = StdRng::seed_from_u64(7);

        assert_eq!(random_spawn(&map, &mut rng), Some((4, 4)));
    }

    #[test]
    fn test_no_spawn_on_blocked_or_empty_map() {
        let mut rng = StdRng::seed_from_u64(1);

        let blocked = GameMap::new(vec![vec![1, 1], vec![1, 1]]);
        assert_eq!(random_spawn(&blocked, &mut rng), None);

        let empty = GameMap::new(Vec::new());
        assert_eq!(random_spawn(&empty, &mut rng), None);

        let no_columns = GameMap::new(vec![Vec::new(), Vec::new()]);
        assert_eq!(random_spawn(&no_columns, &mut rng), None);
    }

    #[test]
    fn test_second_client_is_the_only_tagger() {
        let mut roles = NthClientTagger::default();

        assert_eq!(roles.assign(1), Role::Runner);
        assert!(!roles.tagger_assigned());
        assert_eq!(roles.assign(2), Role::Tagger);
        assert!(roles.tagger_assigned());

        for id in 3..10 {
            assert_eq!(roles.assign(id), Role::Runner);
        }
    }

    #[test]
    fn test_tagger_slot_counts_admissions_not_ids() {
        let mut roles = NthClientTagger::new(2);
        assert_eq!(roles.assign(10), Role::Runner);
        assert_eq!(roles.assign(42), Role::Tagger);
    }

    #[test]
    fn test_first_client_slot_and_disabled_slot() {
        let mut first = NthClientTagger::new(1);
        assert_eq!(first.assign(1), Role::Tagger);
        assert_eq!(first.assign(2), Role::Runner);

        let mut never = NthClientTagger::new(0);
        for id in 1..5 {
            assert_eq!(never.assign(id), Role::Runner);
        }
    }

    #[test]
    fn test_closure_strategy() {
        let mut odd_taggers = |id: u32| if id % 2 == 1 { Role::Tagger } else { Role::Runner };
        let strategy: &mut dyn RoleAssigner = &mut odd_taggers;

        assert_eq!(strategy.assign(1), Role::Tagger);
        assert_eq!(strategy.assign(2), Role::Runner);
    }
}
