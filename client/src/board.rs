//! Agent-side mirror of the board
//!
//! The agent never sees the authoritative board. It fills this mirror from
//! the answers to its own actions, from discovery results and from boards
//! shared by teammates. Every field remembers the game time of its last
//! write so two partial mirrors can be merged without losing newer knowledge.

use serde::{Deserialize, Serialize};
use shared::{DiscoveryResult, GameError, GameRules, Position};

/// What the agent knows about a goal area field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum GoalInfo {
    #[default]
    Unknown,
    /// A valid piece placed here realized a goal
    RealizedGoal,
    /// A valid piece placed here did not realize a goal
    NotGoal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AgentField {
    /// Distance to the nearest piece, None while unknown
    pub distance: Option<u32>,
    pub goal_info: GoalInfo,
    /// Game time of the last write, 0 for never written
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentBoard {
    width: usize,
    height: usize,
    goal_area_height: usize,
    fields: Vec<AgentField>,
}

/// Empty board used until the game starts
impl Default for AgentBoard {
    fn default() -> Self {
        AgentBoard::new(0, 0, 0)
    }
}

impl AgentBoard {
    pub fn new(width: usize, height: usize, goal_area_height: usize) -> Self {
        Self {
            width,
            height,
            goal_area_height,
            fields: vec![AgentField::default(); width * height],
        }
    }

    pub fn from_rules(rules: &GameRules) -> Self {
        Self::new(rules.board_width, rules.board_height, rules.goal_area_height)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn goal_area_height(&self) -> usize {
        self.goal_area_height
    }

    pub fn contains(&self, position: Position) -> bool {
        position.x < self.width && position.y < self.height
    }

    fn index(&self, position: Position) -> Option<usize> {
        self.contains(position)
            .then(|| position.y * self.width + position.x)
    }

    pub fn field(&self, position: Position) -> Option<&AgentField> {
        self.index(position).map(|i| &self.fields[i])
    }

    pub fn distance_at(&self, position: Position) -> Option<u32> {
        self.field(position).and_then(|f| f.distance)
    }

    pub fn goal_info(&self, position: Position) -> GoalInfo {
        self.field(position).map(|f| f.goal_info).unwrap_or_default()
    }

    /// Overwrites the distance of one field unconditionally. Used for answers
    /// to the agent's own actions, which are always the freshest knowledge.
    pub fn set_distance(&mut self, position: Position, distance: Option<u32>, timestamp: u64) -> Result<(), GameError> {
        let i = self.index(position).ok_or(GameError::OutOfBoardMove)?;
        self.fields[i].distance = distance;
        self.fields[i].timestamp = timestamp;
        Ok(())
    }

    pub fn set_goal_info(&mut self, position: Position, goal_info: GoalInfo, timestamp: u64) -> Result<(), GameError> {
        let i = self.index(position).ok_or(GameError::OutOfBoardMove)?;
        self.fields[i].goal_info = goal_info;
        self.fields[i].timestamp = timestamp;
        Ok(())
    }

    /// Writes the reported distances; every other field is left untouched.
    /// A result naming a field outside the board is rejected as a whole.
    pub fn apply_discovery(&mut self, result: &DiscoveryResult, timestamp: u64) -> Result<(), GameError> {
        if let Some(field) = result
            .fields
            .iter()
            .find(|f| !self.contains(Position::new(f.x, f.y)))
        {
            return Err(GameError::InvalidDiscoveryResult(format!(
                "field ({}, {}) is outside a {}x{} board",
                field.x, field.y, self.width, self.height
            )));
        }

        for discovered in &result.fields {
            self.set_distance(
                Position::new(discovered.x, discovered.y),
                Some(discovered.distance),
                timestamp,
            )?;
        }
        Ok(())
    }

    /// Adopts every field of `other` written strictly later than ours.
    /// Returns the number of fields taken over.
    pub fn merge(&mut self, other: &AgentBoard) -> Result<usize, GameError> {
        if self.width != other.width
            || self.height != other.height
            || self.goal_area_height != other.goal_area_height
        {
            return Err(GameError::InvalidDiscoveryResult(format!(
                "cannot merge a {}x{} board into a {}x{} board",
                other.width, other.height, self.width, self.height
            )));
        }

        let mut updated = 0;
        for (mine, theirs) in self.fields.iter_mut().zip(&other.fields) {
            if theirs.timestamp > mine.timestamp {
                *mine = *theirs;
                updated += 1;
            }
        }
        Ok(updated)
    }

    /// Serializes the mirror into a communication payload.
    pub fn encode(&self) -> Result<Vec<u8>, GameError> {
        bincode::serialize(self).map_err(|e| GameError::InvalidDiscoveryResult(e.to_string()))
    }

    /// Parses a teammate's payload, rejecting anything that is not a
    /// well-formed board.
    pub fn decode(data: &[u8]) -> Result<Self, GameError> {
        let board: AgentBoard =
            bincode::deserialize(data).map_err(|e| GameError::InvalidDiscoveryResult(e.to_string()))?;
        if board.fields.len() != board.width * board.height {
            return Err(GameError::InvalidDiscoveryResult(format!(
                "board of {}x{} carries {} fields",
                board.width,
                board.height,
                board.fields.len()
            )));
        }
        Ok(board)
    }
}
