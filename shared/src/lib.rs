use serde::{Deserialize, Serialize};

pub const DEFAULT_TABLE_SIZE: u32 = 20;
pub const FRUIT_SCORE: u32 = 10;
pub const MAX_ROOM_PLAYERS: usize = 4;
pub const MIN_PLAYERS_TO_START: usize = 2;
pub const CLIENT_TIMEOUT_SECS: u64 = 5;
pub const PACKET_BUFFER_SIZE: usize = 65_507;

pub type Color = [u8; 3];

/// Drawn for remote players missing from the roster.
pub const DEFAULT_REMOTE_COLOR: Color = [255, 255, 255];

/// A grid coordinate. Serialized as a `[x, y]` pair to match the snapshot schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(i32, i32)", into = "(i32, i32)")]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Wraps both coordinates into `[0, size)`. Returns `None` for a zero-sized table.
    pub fn wrapped(self, size: u32) -> Option<Position> {
        if size == 0 || size > i32::MAX as u32 {
            return None;
        }
        let size = size as i32;
        Some(Position::new(self.x.rem_euclid(size), self.y.rem_euclid(size)))
    }

    /// Unwrapped neighbour one step in `direction`.
    pub fn step(self, direction: Direction) -> Position {
        let (dx, dy) = direction.delta();
        Position::new(self.x + dx, self.y + dy)
    }

    pub fn manhattan(self, other: Position) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

impl From<(i32, i32)> for Position {
    fn from((x, y): (i32, i32)) -> Self {
        Position::new(x, y)
    }
}

impl From<Position> for (i32, i32) {
    fn from(pos: Position) -> Self {
        (pos.x, pos.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Screen-space unit vector: `Up` decreases `y`.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    pub fn parse(name: &str) -> Option<Direction> {
        match name.to_ascii_uppercase().as_str() {
            "UP" => Some(Direction::Up),
            "DOWN" => Some(Direction::Down),
            "LEFT" => Some(Direction::Left),
            "RIGHT" => Some(Direction::Right),
            _ => None,
        }
    }
}

/// One remote player's body as last reported by the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSnapshot {
    pub cells: Vec<Position>,
    pub alive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: String,
    pub color: Color,
    pub username: String,
    #[serde(default)]
    pub score: u32,
    #[serde(default = "default_alive")]
    pub alive: bool,
}

fn default_alive() -> bool {
    true
}

/// Snapshot delivered to every client of a room once per relayed update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundSnapshot {
    pub snakes: Vec<(String, RemoteSnapshot)>,
    pub players: Vec<PlayerInfo>,
}

impl InboundSnapshot {
    pub fn player(&self, id: &str) -> Option<&PlayerInfo> {
        self.players.iter().find(|p| p.id == id)
    }
}

/// Per-tick state the local client reports for its own snake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundUpdate {
    pub cells: Vec<Position>,
    pub direction: Direction,
    pub alive: bool,
    pub score: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomState {
    Waiting,
    Playing,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub id: String,
    pub host_id: String,
    pub state: RoomState,
    pub turn: u64,
    pub table_size: u32,
    pub snapshot: InboundSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub id: String,
    pub player_count: usize,
    pub state: RoomState,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Authenticate {
        token: String,
        username: String,
    },
    CreateRoom {
        color: Color,
        table_size: u32,
    },
    JoinRoom {
        room_id: String,
        color: Color,
    },
    StartGame {
        room_id: String,
    },
    GameUpdate {
        room_id: String,
        update: OutboundUpdate,
    },
    PlayerDied {
        room_id: String,
    },
    LeaveRoom {
        room_id: String,
    },
    ListRooms,
    Heartbeat,
    Disconnect,

    Authenticated {
        user_id: String,
        username: String,
    },
    AuthError {
        message: String,
    },
    RoomCreated {
        room: RoomSnapshot,
    },
    PlayerJoined {
        player_id: String,
        username: String,
        room: RoomSnapshot,
    },
    PlayerLeft {
        player_id: String,
        username: String,
    },
    GameStarted {
        room: RoomSnapshot,
    },
    GameState {
        room: RoomSnapshot,
    },
    PlayerDiedNotice {
        player_id: String,
        username: String,
    },
    GameOver {
        winner: Option<String>,
        final_state: RoomSnapshot,
    },
    ActiveRooms {
        rooms: Vec<RoomSummary>,
    },
    Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_wraps_off_right_edge() {
        let head = Position::new(19, 5);
        let next = head.step(Direction::Right).wrapped(20).unwrap();
        assert_eq!(next, Position::new(0, 5));
    }

    #[test]
    fn test_position_wraps_negative_coordinates() {
        let next = Position::new(0, 0).step(Direction::Up).wrapped(20).unwrap();
        assert_eq!(next, Position::new(0, 19));

        let far = Position::new(-41, 43).wrapped(20).unwrap();
        assert_eq!(far, Position::new(19, 3));
    }

    #[test]
    fn test_position_wrap_rejects_zero_table() {
        assert_eq!(Position::new(3, 3).wrapped(0), None);
    }

    #[test]
    fn test_manhattan_distance() {
        let a = Position::new(0, 0);
        let b = Position::new(2, 4);
        assert_eq!(a.manhattan(b), 6);
        assert_eq!(b.manhattan(a), 6);
        assert_eq!(a.manhattan(a), 0);
    }

    #[test]
    fn test_direction_opposites() {
        assert_eq!(Direction::Up.opposite(), Direction::Down);
        assert_eq!(Direction::Left.opposite(), Direction::Right);
        for dir in [Direction::Up, Direction::Down, Direction::Left, Direction::Right] {
            assert_eq!(dir.opposite().opposite(), dir);
        }
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!(Direction::parse("up"), Some(Direction::Up));
        assert_eq!(Direction::parse("RIGHT"), Some(Direction::Right));
        assert_eq!(Direction::parse("sideways"), None);
    }

    #[test]
    fn test_inbound_snapshot_json_shape() {
        let json = r#"{
            "snakes": [["p2", {"cells": [[1, 2], [1, 3]], "alive": true}]],
            "players": [{"id": "p2", "color": [0, 120, 240], "username": "bob"}]
        }"#;

        let snapshot: InboundSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.snakes.len(), 1);
        let (id, snake) = &snapshot.snakes[0];
        assert_eq!(id, "p2");
        assert_eq!(snake.cells, vec![Position::new(1, 2), Position::new(1, 3)]);
        assert!(snake.alive);

        let player = snapshot.player("p2").unwrap();
        assert_eq!(player.color, [0, 120, 240]);
        assert!(player.alive);
        assert_eq!(player.score, 0);
        assert!(snapshot.player("p3").is_none());
    }

    #[test]
    fn test_outbound_update_json_shape() {
        let update = OutboundUpdate {
            cells: vec![Position::new(10, 10), Position::new(11, 10)],
            direction: Direction::Right,
            alive: true,
            score: 10,
        };

        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "cells": [[10, 10], [11, 10]],
                "direction": "RIGHT",
                "alive": true,
                "score": 10
            })
        );
    }

    #[test]
    fn test_packet_serialization_game_update() {
        let packet = Packet::GameUpdate {
            room_id: "room_1".to_string(),
            update: OutboundUpdate {
                cells: vec![Position::new(3, 4)],
                direction: Direction::Left,
                alive: true,
                score: 20,
            },
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::GameUpdate { room_id, update } => {
                assert_eq!(room_id, "room_1");
                assert_eq!(update.cells, vec![Position::new(3, 4)]);
                assert_eq!(update.direction, Direction::Left);
                assert_eq!(update.score, 20);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_game_over_without_winner() {
        let packet = Packet::GameOver {
            winner: None,
            final_state: RoomSnapshot {
                id: "room_1".to_string(),
                host_id: "alice".to_string(),
                state: RoomState::Finished,
                turn: 42,
                table_size: DEFAULT_TABLE_SIZE,
                snapshot: InboundSnapshot::default(),
            },
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::GameOver {
                winner,
                final_state,
            } => {
                assert_eq!(winner, None);
                assert_eq!(final_state.state, RoomState::Finished);
                assert_eq!(final_state.turn, 42);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }
}
