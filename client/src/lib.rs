//! # Snake Client Library
//!
//! Client side of the networked snake game. Every client simulates its own snake
//! on a toroidal grid and treats the other players as opaque snapshots relayed by
//! the server.
//!
//! ## Architecture Overview
//!
//! ### Local Authority
//! Each client is authoritative for its own snake only. Movement, fruit eating and
//! collisions are resolved locally every tick and the resulting cells are sent out.
//! Remote snakes are never simulated, they are redrawn from the latest snapshot.
//!
//! ### Snapshot Merging
//! Inbound snapshots are merged at the start of a tick. Departed players have their
//! cells cleared, newly dead players turn into residue that blocks movement for the
//! rest of the round.
//!
//! ### Fruit Placement
//! Fruit is placed on the empty cell farthest (Manhattan distance) from anything on
//! the grid, so a fresh fruit never lands next to a snake.
//!
//! ## Module Organization
//!
//! ### Grid Module (`grid`)
//! - Tagged cell states and toroidal coordinate wrapping
//! - Residue left behind by dead snakes
//!
//! ### Snake Module (`snake`)
//! - Direction changes with reversal protection
//! - Movement, growth and collision precedence
//!
//! ### Fruit Module (`fruit`)
//! - Maximin fruit placement with a deterministic tie-break
//!
//! ### Game Module (`game`)
//! - `SimulationCoordinator`, owner of the per-tick sequence
//! - Remote roster bookkeeping
//!
//! ### Network Module (`network`)
//! - UDP link to the relay server and typed inbound events
//! - Lobby flow and the round loop
//!
//! ### Input and Config Modules (`input`, `config`)
//! - Key bindings read from stdin lines
//! - JSON configuration with defaults
//!
//! ## Usage Example
//!
//! ```rust
//! use client::config::GameConfig;
//! use client::game::{Outbound, SimulationCoordinator};
//! use shared::{Direction, InboundSnapshot};
//!
//! let config = GameConfig::default();
//! let spawn = config.spawns[0].clone();
//! let mut game = SimulationCoordinator::new(config, "alice");
//! game.start_round(&spawn);
//!
//! game.handle_input(&[Direction::Up]);
//! match game.tick(Some(&InboundSnapshot::default())) {
//!     Outbound::Update(update) => assert_eq!(update.direction, Direction::Up),
//!     other => panic!("unexpected {:?}", other),
//! }
//! assert_eq!(game.turn(), 1);
//! ```

pub mod config;
pub mod error;
pub mod fruit;
pub mod game;
pub mod grid;
pub mod input;
pub mod network;
pub mod snake;
