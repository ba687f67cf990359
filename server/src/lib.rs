//! # Game Master Library
//!
//! This library provides the authoritative game master for the "Project Game"
//! board game. Two teams of autonomous agents race to uncover the hidden goal
//! fields in their own goal area by carrying pieces there. The game master owns
//! the only true copy of the board, validates every agent request and answers
//! it with the outcome and the time the agent must wait before acting again.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Board
//! The board tracks pieces, goal fields and, for every field, the Manhattan
//! distance to the nearest piece. Distances are recomputed whenever a piece
//! appears or disappears, so agents can navigate by moving and discovering.
//!
//! ### Time Penalties
//! Every accepted action delays the acting agent by a configured multiple of
//! the base time penalty. Requests arriving before the delay has passed are
//! rejected without touching the game state.
//!
//! ### Team Communication
//! Teammates exchange opaque knowledge blobs through a two-phase handshake
//! mediated by the game master. A request from the team leader must be
//! answered before the target may do anything else.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Event Loop
//! All requests are funnelled through one event loop which owns the game
//! state. Network tasks only receive and send datagrams; they never mutate
//! the game.
//!
//! ### Explicit Game Time
//! The game state never reads a clock. Every operation takes the current game
//! time in milliseconds, which keeps the rules deterministic and testable.
//!
//! ## Module Organization
//!
//! - `board`: fields, pieces, goals and the distance field
//! - `players`: per-agent state and eligibility windows
//! - `communication`: the request/agreement handshake
//! - `game`: rule enforcement for every action
//! - `client_manager`: address to agent id mapping and duplicate filtering
//! - `network`: UDP transport and request dispatch
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use shared::GameRules;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new("127.0.0.1:8080", GameRules::default()).await?;
//!
//!     // Waits for both teams, starts the game and serves requests until shutdown
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod board;
pub mod client_manager;
pub mod communication;
pub mod game;
pub mod network;
pub mod players;
