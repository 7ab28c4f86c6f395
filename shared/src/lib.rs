use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Both axis distances must be strictly below this for a tag to land.
pub const TAG_RANGE: f64 = 0.5;
/// Visual centering adjustment subtracted from client positions in `state`.
pub const RENDER_OFFSET: f64 = 0.4;
pub const SERVER_PLAYER_ID: &str = "server";
pub const WALKABLE: u8 = 0;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Tagger,
    #[default]
    Runner,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Tagger => f.write_str("tagger"),
            Role::Runner => f.write_str("runner"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub x: f64,
    pub y: f64,
    pub role: Role,
    pub ghost: bool,
    pub shield: bool,
}

impl Player {
    pub fn new(x: f64, y: f64, role: Role) -> Self {
        Self {
            x,
            y,
            role,
            ghost: false,
            shield: false,
        }
    }

    /// Chebyshev-style proximity check used for tagging.
    pub fn in_tag_range(&self, other: &Player) -> bool {
        (self.x - other.x).abs() < TAG_RANGE && (self.y - other.y).abs() < TAG_RANGE
    }
}

/// Immutable grid of cell codes. Row-major: `cells[y][x]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameMap {
    cells: Vec<Vec<u8>>,
}

impl GameMap {
    pub fn new(cells: Vec<Vec<u8>>) -> Self {
        Self { cells }
    }

    pub fn width(&self) -> usize {
        self.cells.first().map_or(0, Vec::len)
    }

    pub fn height(&self) -> usize {
        self.cells.len()
    }

    pub fn rows(&self) -> &[Vec<u8>] {
        &self.cells
    }

    pub fn cell(&self, x: usize, y: usize) -> Option<u8> {
        self.cells.get(y).and_then(|row| row.get(x)).copied()
    }

    /// Returns true for walkable cells inside the grid.
    ///
    /// Coordinates outside the grid are reported as valid. Spawn sampling
    /// never leaves the grid, so this only matters to callers probing
    /// arbitrary coordinates.
    pub fn is_valid_spawn(&self, x: usize, y: usize) -> bool {
        if y < self.height() && x < self.width() {
            return self.cell(x, y) == Some(WALKABLE);
        }
        true
    }

    pub fn has_walkable_cell(&self) -> bool {
        self.cells.iter().flatten().any(|&cell| cell == WALKABLE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Powerup id to spawn location, as owned by the powerup collaborator.
pub type PowerupPositions = BTreeMap<u32, (f64, f64)>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerPlayerState {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub role: Role,
}

impl ServerPlayerState {
    pub fn from_player(player: &Player) -> Self {
        Self {
            id: SERVER_PLAYER_ID.to_string(),
            x: player.x,
            y: player.y,
            role: player.role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientPlayerState {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub role: Role,
    pub ghost: bool,
    pub shield: bool,
}

impl ClientPlayerState {
    /// Builds the broadcast view of a client, shifted by [`RENDER_OFFSET`].
    pub fn from_player(client_id: u32, player: &Player) -> Self {
        Self {
            id: client_id.to_string(),
            x: player.x - RENDER_OFFSET,
            y: player.y - RENDER_OFFSET,
            role: player.role,
            ghost: player.ghost,
            shield: player.shield,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub server: ServerPlayerState,
    pub clients: BTreeMap<String, ClientPlayerState>,
    pub powerups: PowerupPositions,
}

impl StateSnapshot {
    pub fn client(&self, client_id: u32) -> Option<&ClientPlayerState> {
        self.clients.get(&client_id.to_string())
    }

    pub fn taggers(&self) -> Vec<u32> {
        self.clients
            .values()
            .filter(|c| c.role == Role::Tagger)
            .filter_map(|c| c.id.parse().ok())
            .collect()
    }
}

/// Frames sent by the server. Wire form: `{"type": ..., "data": ...}\n`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    Map(GameMap),
    ClientId(u32),
    State(StateSnapshot),
}

/// Frames sent by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    Pos(Position),
}

impl ServerMessage {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        encode_frame(self)
    }

    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        decode_frame(frame)
    }
}

impl ClientMessage {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        encode_frame(self)
    }

    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        decode_frame(frame)
    }
}

/// Serializes `message` as a single newline-terminated JSON frame.
pub fn encode_frame<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

/// Parses one frame. The delimiter must already be stripped.
pub fn decode_frame<T: DeserializeOwned>(frame: &str) -> Result<T, ProtocolError> {
    Ok(serde_json::from_str(frame)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use serde_json::{json, Value};

    fn sample_map() -> GameMap {
        GameMap::new(vec![vec![1, 1, 1], vec![1, 0, 1], vec![1, 0, 0]])
    }

    #[test]
    fn test_player_creation() {
        let player = Player::new(2.0, 3.0, Role::Tagger);
        assert_eq!(player.x, 2.0);
        assert_eq!(player.y, 3.0);
        assert_eq!(player.role, Role::Tagger);
        assert!(!player.ghost);
        assert!(!player.shield);
    }

    #[test]
    fn test_tag_range_is_strict_on_both_axes() {
        let tagger = Player::new(3.0, 3.0, Role::Tagger);

        assert!(tagger.in_tag_range(&Player::new(3.2, 3.2, Role::Runner)));
        assert!(tagger.in_tag_range(&Player::new(2.6, 3.4, Role::Runner)));
        assert!(!tagger.in_tag_range(&Player::new(3.5, 3.0, Role::Runner)));
        assert!(!tagger.in_tag_range(&Player::new(3.0, 2.4, Role::Runner)));
        assert!(!tagger.in_tag_range(&Player::new(3.2, 4.0, Role::Runner)));
    }

    #[test]
    fn test_role_wire_names() {
        assert_eq!(serde_json::to_string(&Role::Tagger).unwrap(), "\"tagger\"");
        assert_eq!(serde_json::to_string(&Role::Runner).unwrap(), "\"runner\"");
        assert_eq!(Role::Tagger.to_string(), "tagger");
        assert_eq!(Role::default(), Role::Runner);
    }

    #[test]
    fn test_map_dimensions_and_cells() {
        let map = sample_map();
        assert_eq!(map.width(), 3);
        assert_eq!(map.height(), 3);
        assert_eq!(map.cell(1, 1), Some(0));
        assert_eq!(map.cell(0, 0), Some(1));
        assert_eq!(map.cell(3, 0), None);
        assert!(map.has_walkable_cell());
    }

    #[test]
    fn test_is_valid_spawn() {
        let map = sample_map();
        assert!(map.is_valid_spawn(1, 1));
        assert!(map.is_valid_spawn(2, 2));
        assert!(!map.is_valid_spawn(0, 0));
        assert!(!map.is_valid_spawn(2, 1));
        // Outside the grid counts as valid.
        assert!(map.is_valid_spawn(10, 0));
        assert!(map.is_valid_spawn(0, 10));
    }

    #[test]
    fn test_ragged_row_is_not_walkable() {
        let map = GameMap::new(vec![vec![0, 0, 0], vec![0]]);
        assert!(map.is_valid_spawn(0, 1));
        assert!(!map.is_valid_spawn(2, 1));
    }

    #[test]
    fn test_empty_and_blocked_maps() {
        let empty = GameMap::new(Vec::new());
        assert_eq!(empty.width(), 0);
        assert_eq!(empty.height(), 0);
        assert!(!empty.has_walkable_cell());

        let blocked = GameMap::new(vec![vec![1, 2], vec![3, 4]]);
        assert!(!blocked.has_walkable_cell());
    }

    #[test]
    fn test_map_message_wire_format() {
        let line = ServerMessage::Map(sample_map()).encode().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);

        let value: Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(
            value,
            json!({"type": "map", "data": [[1, 1, 1], [1, 0, 1], [1, 0, 0]]})
        );
    }

    #[test]
    fn test_client_id_message_wire_format() {
        let line = ServerMessage::ClientId(7).encode().unwrap();
        let value: Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value, json!({"type": "client_id", "data": 7}));
    }

    #[test]
    fn test_decode_pos_message() {
        let msg = ClientMessage::decode(r#"{"type": "pos", "data": {"x": 3.5, "y": -1.25}}"#).unwrap();
        assert_eq!(msg, ClientMessage::Pos(Position { x: 3.5, y: -1.25 }));
    }

    #[test]
    fn test_decode_is_field_order_insensitive() {
        let msg = ClientMessage::decode(r#"{"data": {"y": 2.0, "x": 1.0}, "type": "pos"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Pos(Position { x: 1.0, y: 2.0 }));
    }

    #[test]
    fn test_decode_integer_coordinates() {
        let msg = ClientMessage::decode(r#"{"type": "pos", "data": {"x": 4, "y": 5}}"#).unwrap();
        assert_eq!(msg, ClientMessage::Pos(Position { x: 4.0, y: 5.0 }));
    }

    #[test]
    fn test_large_coordinates_stay_finite() {
        let msg = ClientMessage::decode(r#"{"type": "pos", "data": {"x": 1e39, "y": -3.5e200}}"#).unwrap();
        let ClientMessage::Pos(pos) = msg;
        assert!(pos.x.is_finite() && pos.y.is_finite());

        let state = ClientPlayerState::from_player(1, &Player::new(pos.x, pos.y, Role::Runner));
        let line = encode_frame(&state).unwrap();
        assert!(!line.contains("null"));
        let parsed: ClientPlayerState = decode_frame(line.trim_end()).unwrap();
        assert_eq!(parsed, state);
    }

    #[test]
    fn test_decode_rejects_malformed_frames() {
        let frames = [
            "",
            "not json",
            r#"{"type": "pos"}"#,
            r#"{"type": "pos", "data": {"x": 1.0}}"#,
            r#"{"type": "jump", "data": {}}"#,
            r#"{"type": "map", "data": [[0]]}"#,
            r#"{"type": "pos", "data": {"x": "left", "y": 0}}"#,
        ];

        for frame in frames {
            let result = ClientMessage::decode(frame);
            assert!(result.is_err(), "frame should be rejected: {:?}", frame);
        }
    }

    #[test]
    fn test_client_state_applies_render_offset() {
        let mut player = Player::new(5.0, 6.0, Role::Runner);
        player.shield = true;

        let state = ClientPlayerState::from_player(12, &player);
        assert_eq!(state.id, "12");
        assert_approx_eq!(state.x, 4.6, 1e-5);
        assert_approx_eq!(state.y, 5.6, 1e-5);
        assert!(state.shield);
        assert!(!state.ghost);
    }

    #[test]
    fn test_state_message_wire_format() {
        let server = ServerPlayerState::from_player(&Player::new(0.0, 0.0, Role::Runner));
        let mut clients = BTreeMap::new();
        clients.insert(
            "1".to_string(),
            ClientPlayerState::from_player(1, &Player::new(1.4, 2.4, Role::Tagger)),
        );
        let mut powerups = PowerupPositions::new();
        powerups.insert(3, (4.0, 5.0));

        let snapshot = StateSnapshot {
            server,
            clients,
            powerups,
        };
        let line = ServerMessage::State(snapshot.clone()).encode().unwrap();
        let value: Value = serde_json::from_str(line.trim_end()).unwrap();

        assert_eq!(value["type"], "state");
        assert_eq!(value["data"]["server"]["id"], "server");
        assert_eq!(value["data"]["server"]["role"], "runner");
        assert_eq!(value["data"]["clients"]["1"]["id"], "1");
        assert_eq!(value["data"]["clients"]["1"]["role"], "tagger");
        assert_eq!(value["data"]["powerups"]["3"], json!([4.0, 5.0]));

        match ServerMessage::decode(line.trim_end()).unwrap() {
            ServerMessage::State(parsed) => {
                assert_eq!(parsed.taggers(), vec![1]);
                let client = parsed.client(1).unwrap();
                assert_approx_eq!(client.x, 1.0, 1e-5);
                assert_approx_eq!(client.y, 2.0, 1e-5);
                assert_eq!(parsed.powerups.get(&3), Some(&(4.0, 5.0)));
            }
            other => panic!("Wrong message type after decode: {:?}", other),
        }
    }
}
