//! In-memory rooms: membership, round lifecycle and the relayed snapshot
//!
//! The relay never simulates anything. It stores whatever each client reports for its
//! own snake, counts updates as turns, and decides when a round is over from the
//! death reports it receives.

use crate::utils::generate_room_id;
use log::{debug, info};
use shared::{
    Color, InboundSnapshot, OutboundUpdate, PlayerInfo, RemoteSnapshot, RoomSnapshot, RoomState,
    RoomSummary, MAX_ROOM_PLAYERS, MIN_PLAYERS_TO_START,
};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Rejections sent back to the requesting client as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("Room not found")]
    NotFound,
    #[error("Game already started")]
    AlreadyStarted,
    #[error("Room is full")]
    Full,
    #[error("Only host can start the game")]
    NotHost,
    #[error("Need at least 2 players")]
    NotEnoughPlayers,
    #[error("Invalid game or player")]
    InvalidPlayer,
}

#[derive(Debug, Clone)]
pub struct Room {
    pub id: String,
    pub host_id: String,
    pub state: RoomState,
    pub turn: u64,
    pub table_size: u32,
    players: Vec<PlayerInfo>,
    snakes: Vec<(String, RemoteSnapshot)>,
    winner: Option<String>,
    finished_at: Option<Instant>,
}

impl Room {
    fn new(id: String, host_id: &str, table_size: u32) -> Self {
        Self {
            id,
            host_id: host_id.to_string(),
            state: RoomState::Waiting,
            turn: 0,
            table_size,
            players: Vec::new(),
            snakes: Vec::new(),
            winner: None,
            finished_at: None,
        }
    }

    fn add_player(&mut self, user_id: &str, username: &str, color: Color) {
        let info = PlayerInfo {
            id: user_id.to_string(),
            color,
            username: username.to_string(),
            score: 0,
            alive: true,
        };
        match self.players.iter_mut().find(|p| p.id == user_id) {
            Some(existing) => *existing = info,
            None => self.players.push(info),
        }
    }

    fn player_mut(&mut self, user_id: &str) -> Option<&mut PlayerInfo> {
        self.players.iter_mut().find(|p| p.id == user_id)
    }

    pub fn has_player(&self, user_id: &str) -> bool {
        self.players.iter().any(|p| p.id == user_id)
    }

    pub fn player_ids(&self) -> Vec<String> {
        self.players.iter().map(|p| p.id.clone()).collect()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn winner(&self) -> Option<&str> {
        self.winner.as_deref()
    }

    fn alive_players(&self) -> Vec<&PlayerInfo> {
        self.players.iter().filter(|p| p.alive).collect()
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            id: self.id.clone(),
            host_id: self.host_id.clone(),
            state: self.state,
            turn: self.turn,
            table_size: self.table_size,
            snapshot: InboundSnapshot {
                snakes: self.snakes.clone(),
                players: self.players.clone(),
            },
        }
    }

    fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id.clone(),
            player_count: self.players.len(),
            state: self.state,
        }
    }
}

/// Announcement for the end of a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundOver {
    pub winner: Option<String>,
    pub final_state: RoomSnapshot,
}

#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<String, Room>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_room(
        &mut self,
        host_id: &str,
        username: &str,
        color: Color,
        table_size: u32,
    ) -> RoomSnapshot {
        let mut id = generate_room_id();
        while self.rooms.contains_key(&id) {
            id = generate_room_id();
        }

        let mut room = Room::new(id.clone(), host_id, table_size);
        room.add_player(host_id, username, color);
        let snapshot = room.snapshot();
        self.rooms.insert(id.clone(), room);

        info!("Room {} created by {}", id, username);
        snapshot
    }

    pub fn join_room(
        &mut self,
        room_id: &str,
        user_id: &str,
        username: &str,
        color: Color,
    ) -> Result<RoomSnapshot, RoomError> {
        let room = self.rooms.get_mut(room_id).ok_or(RoomError::NotFound)?;
        if room.state != RoomState::Waiting {
            return Err(RoomError::AlreadyStarted);
        }
        if !room.has_player(user_id) && room.players.len() >= MAX_ROOM_PLAYERS {
            return Err(RoomError::Full);
        }

        room.add_player(user_id, username, color);
        info!(
            "{} joined room {} ({} players)",
            username,
            room_id,
            room.players.len()
        );
        Ok(room.snapshot())
    }

    pub fn start_round(&mut self, room_id: &str, user_id: &str) -> Result<RoomSnapshot, RoomError> {
        let room = self
            .rooms
            .get_mut(room_id)
            .filter(|r| r.has_player(user_id))
            .ok_or(RoomError::InvalidPlayer)?;
        if room.host_id != user_id {
            return Err(RoomError::NotHost);
        }
        if room.players.len() < MIN_PLAYERS_TO_START {
            return Err(RoomError::NotEnoughPlayers);
        }

        room.state = RoomState::Playing;
        info!("Round started in room {}", room_id);
        Ok(room.snapshot())
    }

    /// Stores a client's own snake and score. Every accepted update is one turn.
    pub fn apply_update(
        &mut self,
        room_id: &str,
        user_id: &str,
        update: &OutboundUpdate,
    ) -> Option<RoomSnapshot> {
        let room = self.rooms.get_mut(room_id)?;
        let player = room.player_mut(user_id)?;
        player.score = update.score;

        let body = RemoteSnapshot {
            cells: update.cells.clone(),
            alive: update.alive,
        };
        match room.snakes.iter_mut().find(|(id, _)| id == user_id) {
            Some((_, existing)) => *existing = body,
            None => room.snakes.push((user_id.to_string(), body)),
        }

        room.turn += 1;
        Some(room.snapshot())
    }

    /// Marks a player dead. Returns the round result once at most one player is alive.
    pub fn player_died(
        &mut self,
        room_id: &str,
        user_id: &str,
    ) -> Result<Option<RoundOver>, RoomError> {
        let room = self.rooms.get_mut(room_id).ok_or(RoomError::NotFound)?;
        let player = room.player_mut(user_id).ok_or(RoomError::InvalidPlayer)?;
        player.alive = false;
        if let Some((_, snake)) = room.snakes.iter_mut().find(|(id, _)| id == user_id) {
            snake.alive = false;
        }

        if room.state == RoomState::Finished {
            return Ok(None);
        }

        let alive = room.alive_players();
        if alive.len() > 1 {
            debug!("{} players still alive in room {}", alive.len(), room_id);
            return Ok(None);
        }

        let winner = match alive.as_slice() {
            [survivor] => Some(survivor.id.clone()),
            _ => None,
        };
        room.state = RoomState::Finished;
        room.winner = winner.clone();
        room.finished_at = Some(Instant::now());
        info!("Round over in room {}, winner: {:?}", room_id, winner);

        Ok(Some(RoundOver {
            winner,
            final_state: room.snapshot(),
        }))
    }

    /// Drops a player from a room; the room itself goes once it is empty.
    pub fn remove_player(&mut self, room_id: &str, user_id: &str) -> bool {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return false;
        };
        if !room.has_player(user_id) {
            return false;
        }

        room.players.retain(|p| p.id != user_id);
        room.snakes.retain(|(id, _)| id != user_id);

        if room.players.is_empty() {
            self.rooms.remove(room_id);
            info!("Room {} closed, last player left", room_id);
        }
        true
    }

    pub fn rooms_of(&self, user_id: &str) -> Vec<String> {
        self.rooms
            .values()
            .filter(|r| r.has_player(user_id))
            .map(|r| r.id.clone())
            .collect()
    }

    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn members(&self, room_id: &str) -> Vec<String> {
        self.rooms
            .get(room_id)
            .map(Room::player_ids)
            .unwrap_or_default()
    }

    /// Rooms that are waiting or playing, ordered by id.
    pub fn active_rooms(&self) -> Vec<RoomSummary> {
        let mut rooms: Vec<RoomSummary> = self
            .rooms
            .values()
            .filter(|r| r.state != RoomState::Finished)
            .map(Room::summary)
            .collect();
        rooms.sort_by(|a, b| a.id.cmp(&b.id));
        rooms
    }

    /// Deletes rooms that finished more than `linger` ago.
    pub fn sweep_finished(&mut self, linger: Duration) -> Vec<String> {
        let expired: Vec<String> = self
            .rooms
            .values()
            .filter(|r| r.finished_at.is_some_and(|at| at.elapsed() >= linger))
            .map(|r| r.id.clone())
            .collect();

        for id in &expired {
            self.rooms.remove(id);
            debug!("Swept finished room {}", id);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
