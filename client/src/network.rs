//! Client side of the relay protocol: typed inbound events, lobby flow and the tick loop

use crate::config::GameConfig;
use crate::error::ClientError;
use crate::game::{Outbound, SimulationCoordinator};
use crate::input::{InputBuffer, KeyBindings};
use bincode::{deserialize, serialize};
use log::{debug, error, info, trace, warn};
use shared::{Color, Packet, RoomSnapshot, RoomSummary, PACKET_BUFFER_SIZE};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};

/// Capacity of the queue between the receiver task and the tick loop.
pub const EVENT_QUEUE_CAPACITY: usize = 64;

const LOBBY_HEARTBEAT: Duration = Duration::from_secs(1);
const REPLY_TIMEOUT: Duration = Duration::from_secs(2);
/// While the local snake is dead the loop only keeps the connection alive.
const HEARTBEAT_EVERY_TICKS: u64 = 10;

/// Server packets translated for the client, delivered through a bounded queue.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Authenticated {
        user_id: String,
        username: String,
    },
    AuthRejected {
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
    RoundStarted {
        room: RoomSnapshot,
    },
    StateUpdate {
        room: RoomSnapshot,
    },
    PlayerDied {
        player_id: String,
        username: String,
    },
    RoundOver {
        winner: Option<String>,
        final_state: RoomSnapshot,
    },
    ActiveRooms {
        rooms: Vec<RoomSummary>,
    },
    ServerError {
        message: String,
    },
}

impl InboundEvent {
    /// Returns `None` for packets only a client would send.
    pub fn from_packet(packet: Packet) -> Option<Self> {
        let event = match packet {
            Packet::Authenticated { user_id, username } => {
                InboundEvent::Authenticated { user_id, username }
            }
            Packet::AuthError { message } => InboundEvent::AuthRejected { message },
            Packet::RoomCreated { room } => InboundEvent::RoomCreated { room },
            Packet::PlayerJoined {
                player_id,
                username,
                room,
            } => InboundEvent::PlayerJoined {
                player_id,
                username,
                room,
            },
            Packet::PlayerLeft {
                player_id,
                username,
            } => InboundEvent::PlayerLeft {
                player_id,
                username,
            },
            Packet::GameStarted { room } => InboundEvent::RoundStarted { room },
            Packet::GameState { room } => InboundEvent::StateUpdate { room },
            Packet::PlayerDiedNotice {
                player_id,
                username,
            } => InboundEvent::PlayerDied {
                player_id,
                username,
            },
            Packet::GameOver {
                winner,
                final_state,
            } => InboundEvent::RoundOver {
                winner,
                final_state,
            },
            Packet::ActiveRooms { rooms } => InboundEvent::ActiveRooms { rooms },
            Packet::Error { message } => InboundEvent::ServerError { message },
            _ => return None,
        };
        Some(event)
    }
}

/// Identity confirmed by the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub username: String,
}

/// UDP link to the relay. Incoming packets are decoded on a background task and queued.
pub struct NetworkClient {
    socket: Arc<UdpSocket>,
    events: mpsc::Receiver<InboundEvent>,
    backlog: VecDeque<InboundEvent>,
    receiver: JoinHandle<()>,
}

impl NetworkClient {
    pub async fn connect(server_addr: &str) -> Result<Self, ClientError> {
        let socket = Arc::new(UdpSocket::bind("0.0.0.0:0").await?);
        socket.connect(server_addr).await?;
        info!("Connected UDP socket to {}", server_addr);

        let (tx, events) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let receiver = Self::spawn_receiver(Arc::clone(&socket), tx);

        Ok(Self {
            socket,
            events,
            backlog: VecDeque::new(),
            receiver,
        })
    }

    fn spawn_receiver(socket: Arc<UdpSocket>, tx: mpsc::Sender<InboundEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut buffer = vec![0u8; PACKET_BUFFER_SIZE];

            loop {
                match socket.recv(&mut buffer).await {
                    Ok(len) => {
                        let packet = match deserialize::<Packet>(&buffer[..len]) {
                            Ok(packet) => packet,
                            Err(e) => {
                                warn!("Failed to deserialize packet: {}", e);
                                continue;
                            }
                        };
                        let Some(event) = InboundEvent::from_packet(packet) else {
                            warn!("Unexpected packet type from server");
                            continue;
                        };
                        match tx.try_send(event) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(event)) => {
                                warn!("Inbound queue full, dropping {:?}", event);
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => break,
                        }
                    }
                    Err(e) => {
                        debug!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        })
    }

    pub async fn send(&self, packet: &Packet) -> Result<(), ClientError> {
        let data = serialize(packet)?;
        self.socket.send(&data).await?;
        Ok(())
    }

    /// Next queued event without waiting.
    pub fn try_next_event(&mut self) -> Option<InboundEvent> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }
        self.events.try_recv().ok()
    }

    /// Waits for the next event; `None` once the receiver task is gone.
    pub async fn next_event(&mut self) -> Option<InboundEvent> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }
        self.events.recv().await
    }

    /// Waits up to `limit` for an event `matcher` accepts. Other events are kept for later.
    async fn wait_for<T, F>(
        &mut self,
        limit: Duration,
        mut matcher: F,
    ) -> Option<Result<T, ClientError>>
    where
        F: FnMut(&InboundEvent) -> Option<Result<T, ClientError>>,
    {
        let events = &mut self.events;
        let backlog = &mut self.backlog;
        let mut skipped = Vec::new();

        let result = timeout(limit, async {
            while let Some(event) = backlog.pop_front() {
                if let Some(result) = matcher(&event) {
                    return result;
                }
                skipped.push(event);
            }
            loop {
                match events.recv().await {
                    Some(event) => {
                        if let Some(result) = matcher(&event) {
                            return result;
                        }
                        skipped.push(event);
                    }
                    None => return Err(ClientError::Disconnected),
                }
            }
        })
        .await;

        backlog.extend(skipped);
        result.ok()
    }

    /// Sends credentials and waits at most `limit` for the verdict.
    pub async fn authenticate(
        &mut self,
        token: &str,
        username: &str,
        limit: Duration,
    ) -> Result<Session, ClientError> {
        self.send(&Packet::Authenticate {
            token: token.to_string(),
            username: username.to_string(),
        })
        .await?;

        let outcome = self
            .wait_for(limit, |event| match event {
                InboundEvent::Authenticated { user_id, username } => Some(Ok(Session {
                    user_id: user_id.clone(),
                    username: username.clone(),
                })),
                InboundEvent::AuthRejected { message } => {
                    Some(Err(ClientError::AuthRejected(message.clone())))
                }
                _ => None,
            })
            .await;

        match outcome {
            Some(result) => {
                if let Ok(session) = &result {
                    info!("Authenticated as {} ({})", session.username, session.user_id);
                }
                result
            }
            None => Err(ClientError::AuthTimeout(limit)),
        }
    }

    pub async fn create_room(
        &mut self,
        color: Color,
        table_size: u32,
    ) -> Result<RoomSnapshot, ClientError> {
        self.send(&Packet::CreateRoom { color, table_size }).await?;
        self.wait_for(REPLY_TIMEOUT, |event| match event {
            InboundEvent::RoomCreated { room } => Some(Ok(room.clone())),
            InboundEvent::ServerError { message } => Some(Err(ClientError::Server(message.clone()))),
            _ => None,
        })
        .await
        .unwrap_or(Err(ClientError::Timeout(REPLY_TIMEOUT, "room creation")))
    }

    pub async fn join_room(
        &mut self,
        room_id: &str,
        color: Color,
        self_id: &str,
    ) -> Result<RoomSnapshot, ClientError> {
        self.send(&Packet::JoinRoom {
            room_id: room_id.to_string(),
            color,
        })
        .await?;
        self.wait_for(REPLY_TIMEOUT, |event| match event {
            InboundEvent::PlayerJoined {
                player_id, room, ..
            } if player_id == self_id => Some(Ok(room.clone())),
            InboundEvent::ServerError { message } => Some(Err(ClientError::Server(message.clone()))),
            _ => None,
        })
        .await
        .unwrap_or(Err(ClientError::Timeout(REPLY_TIMEOUT, "room join")))
    }

    pub async fn start_round(&self, room_id: &str) -> Result<(), ClientError> {
        self.send(&Packet::StartGame {
            room_id: room_id.to_string(),
        })
        .await
    }

    pub async fn leave_room(&self, room_id: &str) -> Result<(), ClientError> {
        self.send(&Packet::LeaveRoom {
            room_id: room_id.to_string(),
        })
        .await
    }

    pub async fn list_rooms(&mut self) -> Result<Vec<RoomSummary>, ClientError> {
        self.send(&Packet::ListRooms).await?;
        self.wait_for(REPLY_TIMEOUT, |event| match event {
            InboundEvent::ActiveRooms { rooms } => Some(Ok(rooms.clone())),
            _ => None,
        })
        .await
        .unwrap_or(Err(ClientError::Timeout(REPLY_TIMEOUT, "room list")))
    }
}

impl Drop for NetworkClient {
    fn drop(&mut self) {
        self.receiver.abort();
    }
}

/// How a round ended for this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundSummary {
    pub winner: Option<String>,
    pub score: u32,
    pub turns: u64,
    pub interrupted: bool,
}

/// A joined room plus everything needed to play one round in it.
pub struct Client {
    network: NetworkClient,
    config: GameConfig,
    session: Session,
    room_id: String,
    is_host: bool,
}

impl Client {
    /// Creates a room as host.
    pub async fn host(
        mut network: NetworkClient,
        config: GameConfig,
        session: Session,
    ) -> Result<Self, ClientError> {
        let color = config.spawn_for(true).map_or([0, 255, 0], |s| s.color);
        let room = network.create_room(color, config.table_size).await?;
        info!("Created room {}", room.id);

        Ok(Self {
            network,
            config,
            session,
            room_id: room.id,
            is_host: true,
        })
    }

    /// Joins an existing room.
    pub async fn join(
        mut network: NetworkClient,
        config: GameConfig,
        session: Session,
        room_id: &str,
    ) -> Result<Self, ClientError> {
        let color = config.spawn_for(false).map_or([0, 0, 255], |s| s.color);
        let room = network.join_room(room_id, color, &session.user_id).await?;
        info!(
            "Joined room {} ({} players)",
            room.id,
            room.snapshot.players.len()
        );

        Ok(Self {
            network,
            config,
            session,
            room_id: room.id,
            is_host: false,
        })
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn is_host(&self) -> bool {
        self.is_host
    }

    /// Host only: waits for `min_players`, then asks the relay to start.
    /// Everyone: waits for the round-start announcement.
    pub async fn wait_for_round(&mut self, min_players: usize) -> Result<RoomSnapshot, ClientError> {
        let mut heartbeat = interval(LOBBY_HEARTBEAT);
        let mut start_requested = false;
        let mut players = 1;

        loop {
            if self.is_host && !start_requested && players >= min_players {
                info!("{} players present, starting round", players);
                self.network.start_round(&self.room_id).await?;
                start_requested = true;
            }

            tokio::select! {
                event = self.network.next_event() => match event {
                    Some(InboundEvent::PlayerJoined { username, room, .. }) => {
                        players = room.snapshot.players.len();
                        info!("{} joined ({} players)", username, players);
                    }
                    Some(InboundEvent::PlayerLeft { username, .. }) => {
                        players = players.saturating_sub(1);
                        info!("{} left ({} players)", username, players);
                    }
                    Some(InboundEvent::RoundStarted { room }) => return Ok(room),
                    Some(InboundEvent::ServerError { message }) => {
                        warn!("Server error in lobby: {}", message);
                        start_requested = false;
                    }
                    Some(other) => debug!("Ignoring lobby event {:?}", other),
                    None => return Err(ClientError::Disconnected),
                },
                _ = heartbeat.tick() => {
                    if let Err(e) = self.network.send(&Packet::Heartbeat).await {
                        warn!("Heartbeat skipped: {}", e);
                    }
                }
            }
        }
    }

    async fn send_or_skip(&self, packet: Packet) {
        if let Err(e) = self.network.send(&packet).await {
            warn!("Outbound send skipped: {}", e);
        }
    }

    /// Plays one round at the configured tick rate until the relay announces its end.
    ///
    /// Key lines arriving on `keys` are buffered and applied at the next tick. Every tick
    /// drains the inbound queue and merges only the most recent state update.
    pub async fn run_round(
        &mut self,
        started: &RoomSnapshot,
        keys: &mut mpsc::Receiver<String>,
    ) -> Result<RoundSummary, ClientError> {
        let spawn = self
            .config
            .spawn_for(self.is_host)
            .cloned()
            .ok_or(ClientError::Server("no spawn point configured".into()))?;
        let bindings = KeyBindings::from_spawn(&spawn);
        let mut input = InputBuffer::new();

        let mut coordinator =
            SimulationCoordinator::new(self.config.clone(), self.session.user_id.clone());
        coordinator.merge(&started.snapshot);
        coordinator.start_round(&spawn);

        let mut ticker = interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
        let mut silent_ticks: u64 = 0;

        loop {
            tokio::select! {
                Some(line) = keys.recv() => {
                    input.push_line(&bindings, &line);
                },

                _ = ticker.tick() => {
                    let mut latest = None;
                    while let Some(event) = self.network.try_next_event() {
                        match event {
                            InboundEvent::StateUpdate { room } => latest = Some(room.snapshot),
                            InboundEvent::RoundOver { winner, final_state } => {
                                coordinator.merge(&final_state.snapshot);
                                coordinator.finish(winner.clone());
                                info!("Round over, winner: {:?}", winner);
                                return Ok(Self::summarize(&coordinator, false));
                            }
                            InboundEvent::PlayerDied { username, .. } => {
                                info!("{} died", username);
                            }
                            InboundEvent::PlayerLeft { username, .. } => {
                                info!("{} left the room", username);
                            }
                            InboundEvent::ServerError { message } => {
                                warn!("Server error: {}", message);
                            }
                            other => debug!("Ignoring in-round event {:?}", other),
                        }
                    }

                    coordinator.handle_input(&input.drain());

                    match coordinator.tick(latest.as_ref()) {
                        Outbound::Update(update) => {
                            silent_ticks = 0;
                            self.send_or_skip(Packet::GameUpdate {
                                room_id: self.room_id.clone(),
                                update,
                            })
                            .await;
                        }
                        Outbound::Died => {
                            info!(
                                "Reporting death with score {}",
                                coordinator.local_snake().map_or(0, |s| s.score())
                            );
                            self.send_or_skip(Packet::PlayerDied {
                                room_id: self.room_id.clone(),
                            })
                            .await;
                        }
                        Outbound::Silent => {
                            silent_ticks += 1;
                            if silent_ticks % HEARTBEAT_EVERY_TICKS == 0 {
                                self.send_or_skip(Packet::Heartbeat).await;
                            }
                        }
                    }

                    trace!("Turn {}\n{}", coordinator.turn(), coordinator.grid().to_ascii());
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, leaving round");
                    return Ok(Self::summarize(&coordinator, true));
                }
            }
        }
    }

    fn summarize(coordinator: &SimulationCoordinator, interrupted: bool) -> RoundSummary {
        RoundSummary {
            winner: coordinator.winner().map(str::to_string),
            score: coordinator.local_snake().map_or(0, |s| s.score()),
            turns: coordinator.turn(),
            interrupted,
        }
    }

    pub async fn leave(self) {
        if let Err(e) = self.network.leave_room(&self.room_id).await {
            error!("Failed to leave room {}: {}", self.room_id, e);
        }
        if let Err(e) = self.network.send(&Packet::Disconnect).await {
            debug!("Disconnect not sent: {}", e);
        }
    }
}
