//! # Tank Arena Server Library
//!
//! The authoritative server for a top-down multiplayer tank game played on a
//! destructible tile map. Tanks drive over terrain, fight over neutral
//! pillboxes and refuelling bases, and send out a builder to harvest trees,
//! lay roads, walls, boats and mines. The server owns the only copy of the
//! world; clients send inputs and receive filtered updates.
//!
//! ## Core Responsibilities
//!
//! ### Deterministic Simulation
//! Every tick runs the same systems in the same order over ordered maps, so
//! the same seed and inputs always give the same world. Bots are fed
//! observations built from the settled state and their commands are applied
//! on the next tick exactly like a human's input frames.
//!
//! ### Connection Handling
//! - Per-connection token bucket and invalid-message counter
//! - Per-address throttling of new connections
//! - Capacity checks before a player is created
//! - Silent connections dropped after a timeout
//!
//! ### Per-Player Broadcasting
//! Each player gets a one-off welcome with the full map, then per-tick deltas
//! scoped to the area around their tank. Enemy resource counts and enemy
//! mines are never revealed.
//!
//! ## Module Organization
//!
//! - `world`, `entities`: the terrain grid and the entity arena
//! - `systems`: player movement, combat, builders, structures, terrain
//!   effects, respawns and bot input, run by [`game::GameState::tick`]
//! - `match_state`: alliances, mine visibility and the win condition
//! - `bots`: bot controllers, the profile registry and the runtime adapter
//! - `visibility`: per-player delta construction
//! - `ingress`, `client_manager`, `network`: the TCP front end
//! - `maps`, `config`, `events`, `error`: supporting types
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::maps;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let map = maps::builtin(&config.map_name).ok_or("unknown map")?;
//!
//!     // Binds the listener and spawns any startup bots
//!     let server = Server::new(config, map).await?;
//!
//!     // Runs until Ctrl-C:
//!     // - accepts connections and reads their packets
//!     // - steps the world every 20 ms
//!     // - sends each player their visible changes
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod bots;
pub mod client_manager;
pub mod config;
pub mod entities;
pub mod error;
pub mod events;
pub mod game;
pub mod ingress;
pub mod maps;
pub mod match_state;
pub mod network;
pub mod systems;
pub mod visibility;
pub mod world;
