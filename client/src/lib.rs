//! # Agent Library
//!
//! This library implements an autonomous agent for the "Project Game" board
//! game. An agent only ever sees fragments of the board: the distance reported
//! after each of its moves, the 3x3 neighbourhood returned by a discover, the
//! outcome of placing a piece and whatever its teammates share with it. It
//! keeps all of that in a local mirror of the board and asks the game master
//! for every change it wants to make.
//!
//! ## Module Organization
//!
//! ### Board Module (`board`)
//! The agent's partial mirror of the board. Every field carries the game time
//! of its last write, which lets two mirrors be merged field by field without
//! either side losing newer knowledge.
//!
//! ### State Module (`state`)
//! What the agent believes about itself: position, held piece and what it
//! knows about that piece, current time penalty, and whether the game runs.
//!
//! ### Decision Module (`decision`)
//! Chooses the next request. The bundled [`decision::GreedyDecisionModule`]
//! follows the distance field to pieces, checks them, carries valid ones to
//! untried goal fields and periodically shares its board with the team.
//!
//! ### Network Module (`network`)
//! The agent's event loop. Only one action is in flight at a time, yet
//! communication requests from teammates keep being served while the agent
//! waits for its answer or sits out a penalty.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::decision::GreedyDecisionModule;
//! use client::network::Agent;
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//! use shared::Team;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let decision = GreedyDecisionModule::new(StdRng::from_entropy(), 10);
//!     let mut agent = Agent::new(
//!         "127.0.0.1:8080",
//!         Team::Red,
//!         false,
//!         decision,
//!         Duration::from_millis(20),
//!         Duration::from_secs(2),
//!     )
//!     .await?;
//!
//!     let winner = agent.run().await?;
//!     println!("Winner: {:?}", winner);
//!     Ok(())
//! }
//! ```

pub mod board;
pub mod decision;
pub mod network;
pub mod state;
