use serde::{Deserialize, Serialize};

mod error;
mod rules;

pub use error::GameError;
pub use rules::{AgentGameRules, GameRules};

pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    JoinGame {
        client_version: u32,
        team_id: u8,
        wants_to_be_leader: bool,
    },
    Action {
        message_id: u64,
        action: ActionRequest,
    },
    Disconnect,

    JoinResponse {
        result: Result<u32, GameError>,
    },
    StartGame {
        rules: AgentGameRules,
        timestamp: u64,
    },
    ActionResponse {
        message_id: u64,
        timestamp: u64,
        wait_until: u64,
        result: Result<ActionOutcome, GameError>,
    },
    /// Sent to the target of a communication request.
    CommunicationRequest {
        requester_id: u32,
        timestamp: u64,
    },
    /// Sent to the original requester once the target has answered.
    CommunicationResponse {
        /// Message id of the request being answered
        request_message_id: u64,
        responder_id: u32,
        agreement: bool,
        data: Option<Vec<u8>>,
        timestamp: u64,
        wait_until: u64,
    },
    EndGame {
        winner: Team,
        timestamp: u64,
    },
}

/// Everything an agent can ask the game master to do.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum ActionRequest {
    Move(MoveDirection),
    PickPiece,
    PutPiece,
    DestroyPiece,
    CheckPiece,
    Discover,
    CommunicationRequest {
        target_id: u32,
        data: Vec<u8>,
    },
    CommunicationAgreement {
        requester_id: u32,
        agreement: bool,
        data: Vec<u8>,
    },
}

/// Successful result of an [`ActionRequest`].
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum ActionOutcome {
    Moved {
        position: Position,
        distance: Option<u32>,
    },
    PiecePicked,
    PiecePut(PutPieceResult),
    PieceDestroyed,
    PieceChecked {
        is_valid: bool,
    },
    Discovered(DiscoveryResult),
    CommunicationRequested,
    /// Answer accepted; carries the requester's payload when the exchange happened.
    CommunicationAnswered {
        requester_id: u32,
        data: Option<Vec<u8>>,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Team {
    Red,
    Blue,
}

impl Team {
    pub fn from_id(id: u8) -> Option<Team> {
        match id {
            0 => Some(Team::Red),
            1 => Some(Team::Blue),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        match self {
            Team::Red => 0,
            Team::Blue => 1,
        }
    }

    pub fn opponent(self) -> Team {
        match self {
            Team::Red => Team::Blue,
            Team::Blue => Team::Red,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
    Left,
    Right,
}

impl MoveDirection {
    pub const ALL: [MoveDirection; 4] = [
        MoveDirection::Up,
        MoveDirection::Down,
        MoveDirection::Left,
        MoveDirection::Right,
    ];
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

impl Position {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    /// Returns the neighbouring field in `direction`, or None when it lies
    /// outside a `width` x `height` board. `Up` increases y.
    pub fn step(self, direction: MoveDirection, width: usize, height: usize) -> Option<Position> {
        let (x, y) = match direction {
            MoveDirection::Up => (Some(self.x), self.y.checked_add(1)),
            MoveDirection::Down => (Some(self.x), self.y.checked_sub(1)),
            MoveDirection::Left => (self.x.checked_sub(1), Some(self.y)),
            MoveDirection::Right => (self.x.checked_add(1), Some(self.y)),
        };
        match (x, y) {
            (Some(x), Some(y)) if x < width && y < height => Some(Position { x, y }),
            _ => None,
        }
    }

    pub fn manhattan(self, other: Position) -> usize {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum PutPieceResult {
    PieceInTaskArea,
    PieceWasFake,
    PieceGoalRealized,
    PieceGoalUnrealized,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveredField {
    pub x: usize,
    pub y: usize,
    pub distance: u32,
}

/// Distances around an agent; fields without a known distance are omitted.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct DiscoveryResult {
    pub fields: Vec<DiscoveredField>,
}
