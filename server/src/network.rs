//! Server network layer handling UDP communications and room relaying

use crate::client_manager::{ClientManager, Session};
use crate::rooms::{RoomError, RoomRegistry};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, CLIENT_TIMEOUT_SECS, PACKET_BUFFER_SIZE};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

pub type ServerResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// How long a finished room stays listed for late queries before it is deleted.
pub const FINISHED_ROOM_LINGER: Duration = Duration::from_secs(30);

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { session: Session },
    #[allow(dead_code)]
    Shutdown,
}

/// Messages sent from the main loop to the sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        targets: Vec<SocketAddr>,
    },
}

/// Relay server: sessions, rooms and the tasks that move packets.
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    rooms: RoomRegistry,
    sweep_interval: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(addr: &str, max_clients: usize) -> ServerResult<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(
                max_clients,
                Duration::from_secs(CLIENT_TIMEOUT_SECS),
            ))),
            rooms: RoomRegistry::new(),
            sweep_interval: Duration::from_secs(1),
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; PACKET_BUFFER_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet, targets } => {
                        let data = match serialize(&packet) {
                            Ok(data) => data,
                            Err(e) => {
                                error!("Failed to serialize broadcast: {}", e);
                                continue;
                            }
                        };
                        for addr in targets {
                            if let Err(e) = socket.send_to(&data, addr).await {
                                error!("Failed to send to {}: {}", addr, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for session in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { session }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(socket: &UdpSocket, packet: &Packet, addr: SocketAddr) -> ServerResult<()> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn send_error(&self, message: impl Into<String>, addr: SocketAddr) {
        self.send_packet(
            Packet::Error {
                message: message.into(),
            },
            addr,
        );
    }

    /// Sends `packet` to every member of `room_id` with a live session.
    async fn broadcast_to_room(&self, room_id: &str, packet: Packet) {
        let targets: Vec<SocketAddr> = {
            let clients = self.clients.read().await;
            self.rooms
                .members(room_id)
                .iter()
                .filter_map(|user_id| clients.addr_of(user_id))
                .collect()
        };

        if targets.is_empty() {
            return;
        }
        if let Err(e) = self.game_tx.send(GameMessage::BroadcastPacket { packet, targets }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Processes incoming packets and updates room state
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        let accepted = {
            let mut clients = self.clients.write().await;
            clients.touch(addr)
        };
        if !accepted {
            warn!("Rejecting {}: server full", addr);
            self.send_error("Server full", addr);
            return;
        }

        let identity = {
            let clients = self.clients.read().await;
            clients.identity(addr)
        };

        match packet {
            Packet::Authenticate { token, username } => {
                if token.trim().is_empty() {
                    warn!("Empty token from {}", addr);
                    self.send_packet(
                        Packet::AuthError {
                            message: "Authentication failed".to_string(),
                        },
                        addr,
                    );
                    return;
                }

                let user_id = token.trim().to_string();
                {
                    let mut clients = self.clients.write().await;
                    clients.authenticate(addr, &user_id, &username);
                }
                self.send_packet(Packet::Authenticated { user_id, username }, addr);
            }

            Packet::ListRooms => {
                let rooms = self.rooms.active_rooms();
                self.send_packet(Packet::ActiveRooms { rooms }, addr);
            }

            Packet::Heartbeat => {}

            Packet::Disconnect => {
                let session = {
                    let mut clients = self.clients.write().await;
                    clients.remove(addr)
                };
                if let Some(session) = session {
                    self.drop_session(session).await;
                }
            }

            packet => match identity {
                Some((user_id, username)) => {
                    self.handle_room_packet(packet, addr, &user_id, &username)
                        .await
                }
                None => match packet {
                    Packet::CreateRoom { .. } | Packet::JoinRoom { .. } | Packet::StartGame { .. } => {
                        self.send_error("Not authenticated", addr);
                    }
                    other => debug!("Ignoring {:?} from unauthenticated {}", other, addr),
                },
            },
        }
    }

    async fn handle_room_packet(
        &mut self,
        packet: Packet,
        addr: SocketAddr,
        user_id: &str,
        username: &str,
    ) {
        match packet {
            Packet::CreateRoom { color, table_size } => {
                let room = self.rooms.create_room(user_id, username, color, table_size);
                self.send_packet(Packet::RoomCreated { room }, addr);
            }

            Packet::JoinRoom { room_id, color } => {
                match self.rooms.join_room(&room_id, user_id, username, color) {
                    Ok(room) => {
                        let packet = Packet::PlayerJoined {
                            player_id: user_id.to_string(),
                            username: username.to_string(),
                            room,
                        };
                        self.broadcast_to_room(&room_id, packet).await;
                    }
                    Err(e) => self.reject(e, addr),
                }
            }

            Packet::StartGame { room_id } => match self.rooms.start_round(&room_id, user_id) {
                Ok(room) => {
                    self.broadcast_to_room(&room_id, Packet::GameStarted { room })
                        .await
                }
                Err(e) => self.reject(e, addr),
            },

            Packet::GameUpdate { room_id, update } => {
                match self.rooms.apply_update(&room_id, user_id, &update) {
                    Some(room) => {
                        self.broadcast_to_room(&room_id, Packet::GameState { room })
                            .await
                    }
                    None => debug!("Dropping update from {} for room {}", user_id, room_id),
                }
            }

            Packet::PlayerDied { room_id } => match self.rooms.player_died(&room_id, user_id) {
                Ok(over) => {
                    info!("{} died in room {}", username, room_id);
                    let notice = Packet::PlayerDiedNotice {
                        player_id: user_id.to_string(),
                        username: username.to_string(),
                    };
                    self.broadcast_to_room(&room_id, notice).await;

                    if let Some(over) = over {
                        let packet = Packet::GameOver {
                            winner: over.winner,
                            final_state: over.final_state,
                        };
                        self.broadcast_to_room(&room_id, packet).await;
                    }
                }
                Err(e) => debug!("Ignoring death of {} in {}: {}", user_id, room_id, e),
            },

            Packet::LeaveRoom { room_id } => {
                if self.rooms.remove_player(&room_id, user_id) {
                    info!("{} left room {}", username, room_id);
                    let packet = Packet::PlayerLeft {
                        player_id: user_id.to_string(),
                        username: username.to_string(),
                    };
                    self.broadcast_to_room(&room_id, packet).await;
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    fn reject(&self, error: RoomError, addr: SocketAddr) {
        debug!("Rejected request from {}: {}", addr, error);
        self.send_error(error.to_string(), addr);
    }

    /// Removes a closed session's user from every room it was in.
    async fn drop_session(&mut self, session: Session) {
        let Some(user_id) = session.user_id else {
            return;
        };

        for room_id in self.rooms.rooms_of(&user_id) {
            if self.rooms.remove_player(&room_id, &user_id) {
                let packet = Packet::PlayerLeft {
                    player_id: user_id.clone(),
                    username: session.username.clone(),
                };
                self.broadcast_to_room(&room_id, packet).await;
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> ServerResult<()> {
        // Initialize concurrent tasks
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut sweep_interval = interval(self.sweep_interval);

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { session }) => {
                            info!("Session {} timed out", session.addr);
                            self.drop_session(session).await;
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Periodic housekeeping
                _ = sweep_interval.tick() => {
                    let swept = self.rooms.sweep_finished(FINISHED_ROOM_LINGER);
                    if !swept.is_empty() {
                        let sessions = self.clients.read().await.len();
                        debug!("Swept {} finished rooms, {} rooms and {} sessions remain",
                               swept.len(), self.rooms.len(), sessions);
                    }
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{RoomState, DEFAULT_TABLE_SIZE};

    async fn start_server() -> SocketAddr {
        let mut server = Server::new("127.0.0.1:0", 8).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = server.run().await;
        });
        addr
    }

    async fn client(server: SocketAddr) -> UdpSocket {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.connect(server).await.unwrap();
        socket
    }

    async fn send(socket: &UdpSocket, packet: &Packet) {
        socket.send(&serialize(packet).unwrap()).await.unwrap();
    }

    async fn recv(socket: &UdpSocket) -> Packet {
        let mut buf = vec![0u8; PACKET_BUFFER_SIZE];
        let len = tokio::time::timeout(Duration::from_secs(2), socket.recv(&mut buf))
            .await
            .expect("no reply from server")
            .unwrap();
        deserialize(&buf[..len]).unwrap()
    }

    async fn login(socket: &UdpSocket, token: &str) {
        send(
            socket,
            &Packet::Authenticate {
                token: token.to_string(),
                username: token.to_uppercase(),
            },
        )
        .await;
        match recv(socket).await {
            Packet::Authenticated { user_id, .. } => assert_eq!(user_id, token),
            other => panic!("Unexpected packet {:?}", other),
        }
    }

    #[test]
    fn test_server_message_creation() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let msg = ServerMessage::PacketReceived {
            packet: Packet::Heartbeat,
            addr,
        };

        match msg {
            ServerMessage::PacketReceived { packet, addr: a } => {
                assert_eq!(a, addr);
                assert!(matches!(packet, Packet::Heartbeat));
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[tokio::test]
    async fn test_empty_token_rejected() {
        let server = start_server().await;
        let socket = client(server).await;

        send(
            &socket,
            &Packet::Authenticate {
                token: "  ".to_string(),
                username: "nobody".to_string(),
            },
        )
        .await;

        match recv(&socket).await {
            Packet::AuthError { message } => assert_eq!(message, "Authentication failed"),
            other => panic!("Unexpected packet {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_room_requests_need_authentication() {
        let server = start_server().await;
        let socket = client(server).await;

        send(
            &socket,
            &Packet::CreateRoom {
                color: [1, 2, 3],
                table_size: DEFAULT_TABLE_SIZE,
            },
        )
        .await;

        match recv(&socket).await {
            Packet::Error { message } => assert_eq!(message, "Not authenticated"),
            other => panic!("Unexpected packet {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_two_player_round() {
        let server = start_server().await;
        let host = client(server).await;
        let guest = client(server).await;
        login(&host, "alice").await;
        login(&guest, "bob").await;

        send(
            &host,
            &Packet::CreateRoom {
                color: [0, 255, 0],
                table_size: DEFAULT_TABLE_SIZE,
            },
        )
        .await;
        let room_id = match recv(&host).await {
            Packet::RoomCreated { room } => room.id,
            other => panic!("Unexpected packet {:?}", other),
        };

        send(
            &host,
            &Packet::StartGame {
                room_id: room_id.clone(),
            },
        )
        .await;
        match recv(&host).await {
            Packet::Error { message } => assert_eq!(message, "Need at least 2 players"),
            other => panic!("Unexpected packet {:?}", other),
        }

        send(
            &guest,
            &Packet::JoinRoom {
                room_id: room_id.clone(),
                color: [0, 0, 255],
            },
        )
        .await;
        for socket in [&host, &guest] {
            match recv(socket).await {
                Packet::PlayerJoined { player_id, room, .. } => {
                    assert_eq!(player_id, "bob");
                    assert_eq!(room.snapshot.players.len(), 2);
                }
                other => panic!("Unexpected packet {:?}", other),
            }
        }

        send(
            &host,
            &Packet::StartGame {
                room_id: room_id.clone(),
            },
        )
        .await;
        for socket in [&host, &guest] {
            match recv(socket).await {
                Packet::GameStarted { room } => assert_eq!(room.state, RoomState::Playing),
                other => panic!("Unexpected packet {:?}", other),
            }
        }

        send(
            &guest,
            &Packet::PlayerDied {
                room_id: room_id.clone(),
            },
        )
        .await;
        for socket in [&host, &guest] {
            match recv(socket).await {
                Packet::PlayerDiedNotice { player_id, .. } => assert_eq!(player_id, "bob"),
                other => panic!("Unexpected packet {:?}", other),
            }
            match recv(socket).await {
                Packet::GameOver { winner, final_state } => {
                    assert_eq!(winner.as_deref(), Some("alice"));
                    assert_eq!(final_state.state, RoomState::Finished);
                }
                other => panic!("Unexpected packet {:?}", other),
            }
        }

        send(&host, &Packet::ListRooms).await;
        match recv(&host).await {
            Packet::ActiveRooms { rooms } => assert!(rooms.is_empty()),
            other => panic!("Unexpected packet {:?}", other),
        }
    }
}
