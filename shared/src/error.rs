//! Failure kinds reported back to agents as the result of a rejected request.

use serde::{Deserialize, Serialize};

/// Every recoverable failure an action, join or merge can produce.
///
/// All variants except [`GameError::UnknownAgent`] are part of the game's
/// modeled behavior and travel back to the requesting agent inside an
/// action response. None of them change any state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum GameError {
    #[error("Move leaves the board or enters the enemy goal area")]
    OutOfBoardMove,
    #[error("Target field is occupied by another agent")]
    AgentCollisionMove,
    #[error("Invalid piece operation: {0}")]
    PieceOperation(String),
    #[error("Request arrived during time penalty, eligible again at {wait_until}ms")]
    Delay { wait_until: u64 },
    #[error("Agent has a pending communication with its leader")]
    PendingLeaderCommunication,
    #[error("Agent {sender_id} still waits for a response from agent {target_id}")]
    CommunicationInProgress { sender_id: u32, target_id: u32 },
    #[error("No communication data for pair ({sender_id}, {target_id})")]
    Communication { sender_id: u32, target_id: u32 },
    #[error("Game setup error: {0}")]
    GameSetup(String),
    #[error("Invalid discovery result: {0}")]
    InvalidDiscoveryResult(String),
    #[error("The game has already ended")]
    GameOver,
    #[error("Agent {0} is not registered")]
    UnknownAgent(u32),
}

impl GameError {
    /// True for contract violations that indicate a bug in the caller rather
    /// than a legitimate game outcome.
    pub fn is_defect(&self) -> bool {
        matches!(self, GameError::UnknownAgent(_))
    }
}
