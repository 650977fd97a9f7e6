//! # Room Relay Server Library
//!
//! This library provides the relay authority for the networked snake game. It does
//! not simulate the board. Each client is authoritative for its own snake, and the
//! server stores what every client reports, relays it to the rest of the room, and
//! decides when a round is over.
//!
//! ## Core Responsibilities
//!
//! ### Sessions
//! Every peer address gets a session on its first packet. A session becomes usable
//! for room operations after it authenticates; the token it presents is taken as its
//! user id. Any packet counts as a heartbeat and silent sessions are dropped after
//! five seconds, which removes the user from its rooms.
//!
//! ### Rooms
//! Rooms hold up to four players. The host starts a round once at least two players
//! are present. During a round each `GameUpdate` replaces the sender's snake in the
//! room snapshot, bumps the turn counter and is relayed to every member. When at most
//! one player is left alive the round ends and the survivor, if any, is the winner.
//! Finished rooms are deleted thirty seconds later, empty rooms immediately.
//!
//! ## Module Organization
//!
//! ### Client Manager Module (`client_manager`)
//! - Sessions keyed by socket address
//! - Capacity limit and timeout sweep
//!
//! ### Rooms Module (`rooms`)
//! - Membership rules and their error messages
//! - Round lifecycle and winner selection
//! - Active room listing
//!
//! ### Network Module (`network`)
//! - UDP socket, receiver and sender tasks
//! - Packet dispatch and room broadcasts
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     // Relay for at most 32 concurrent sessions
//!     let mut server = Server::new("127.0.0.1:8080", 32).await?;
//!
//!     // Runs until the receiver task stops
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! The server uses an event-driven architecture with internal async tasks that handle:
//! - **Network Receiver**: Continuously listens for incoming packets
//! - **Network Sender**: Drains the outgoing queue of direct sends and room broadcasts
//! - **Timeout Checker**: Monitors sessions and reports the silent ones
//! - **Main Loop**: Dispatches packets and sweeps finished rooms

pub mod client_manager;
pub mod network;
pub mod rooms;
pub mod utils;
