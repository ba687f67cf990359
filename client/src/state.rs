//! Everything an agent believes about itself and the board

use crate::board::{AgentBoard, GoalInfo};
use log::{debug, info};
use shared::{AgentGameRules, DiscoveryResult, GameError, MoveDirection, Position, PutPieceResult, Team};

/// Agent's knowledge of the piece it carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PieceState {
    #[default]
    Unknown,
    Valid,
    Invalid,
}

#[derive(Debug, Default)]
pub struct AgentState {
    pub rules: Option<AgentGameRules>,
    pub board: AgentBoard,
    pub position: Position,
    pub holds_piece: bool,
    pub piece_state: PieceState,
    /// Game time from which the game master accepts our next request
    pub wait_until: u64,
    pub game_started: bool,
    pub game_ended: bool,
    pub winner: Option<Team>,
}

impl AgentState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies the rules received when the game starts.
    pub fn setup(&mut self, rules: AgentGameRules) {
        self.board = AgentBoard::from_rules(&rules.rules);
        self.position = rules.start;
        self.holds_piece = false;
        self.piece_state = PieceState::Unknown;
        self.game_started = true;
        self.rules = Some(rules);
    }

    pub fn agent_id(&self) -> Option<u32> {
        self.rules.as_ref().map(|r| r.agent_id)
    }

    pub fn team(&self) -> Option<Team> {
        self.rules.as_ref().map(|r| r.team)
    }

    pub fn is_leader(&self) -> bool {
        self.rules.as_ref().map(|r| r.is_leader()).unwrap_or(false)
    }

    pub fn is_in_own_goal_area(&self) -> bool {
        match &self.rules {
            Some(r) => r.rules.is_in_goal_area(self.position, r.team),
            None => false,
        }
    }

    /// Pieces only ever lie on fields outside both goal areas.
    pub fn is_in_task_area(&self) -> bool {
        match &self.rules {
            Some(r) => r.rules.goal_area_owner(self.position.y).is_none(),
            None => false,
        }
    }

    /// Records a confirmed move. Moves leaving the mirror are rejected
    /// before anything changes.
    pub fn move_agent(&mut self, direction: MoveDirection, distance: Option<u32>, timestamp: u64) -> Result<(), GameError> {
        let target = self
            .position
            .step(direction, self.board.width(), self.board.height())
            .ok_or(GameError::OutOfBoardMove)?;

        self.board.set_distance(target, distance, timestamp)?;
        self.position = target;
        Ok(())
    }

    /// The piece under us leaves the board, so the distance we knew for this
    /// field no longer holds.
    pub fn pick_up_piece(&mut self, timestamp: u64) -> Result<(), GameError> {
        if self.holds_piece {
            return Err(GameError::PieceOperation(
                "Picking up piece when agent has one already".to_string(),
            ));
        }

        self.holds_piece = true;
        self.piece_state = PieceState::Unknown;
        if self.board.contains(self.position) {
            self.board.set_distance(self.position, None, timestamp)?;
        }
        Ok(())
    }

    pub fn place_piece(&mut self, result: PutPieceResult, timestamp: u64) -> Result<(), GameError> {
        if !self.holds_piece {
            return Err(GameError::PieceOperation(
                "Placing piece when agent doesn't have it".to_string(),
            ));
        }

        self.holds_piece = false;
        self.piece_state = PieceState::Unknown;

        if !self.board.contains(self.position) {
            return Ok(());
        }
        match result {
            PutPieceResult::PieceInTaskArea => self.board.set_distance(self.position, Some(0), timestamp)?,
            PutPieceResult::PieceGoalRealized => {
                info!("Goal realized at ({}, {})", self.position.x, self.position.y);
                self.board
                    .set_goal_info(self.position, GoalInfo::RealizedGoal, timestamp)?
            }
            PutPieceResult::PieceGoalUnrealized => {
                self.board
                    .set_goal_info(self.position, GoalInfo::NotGoal, timestamp)?
            }
            PutPieceResult::PieceWasFake => {}
        }
        Ok(())
    }

    pub fn destroy_piece(&mut self) -> Result<(), GameError> {
        if !self.holds_piece {
            return Err(GameError::PieceOperation(
                "Destroying piece when agent doesn't have it".to_string(),
            ));
        }
        self.holds_piece = false;
        self.piece_state = PieceState::Unknown;
        Ok(())
    }

    pub fn set_piece_state(&mut self, piece_state: PieceState) {
        self.piece_state = piece_state;
    }

    pub fn discover(&mut self, result: &DiscoveryResult, timestamp: u64) -> Result<(), GameError> {
        self.board.apply_discovery(result, timestamp)
    }

    /// Merges a teammate's board payload into ours.
    pub fn update_board_with_communication_data(&mut self, data: &[u8]) -> Result<usize, GameError> {
        let other = AgentBoard::decode(data)?;
        let updated = self.board.merge(&other)?;
        debug!("Merged teammate board, {} fields updated", updated);
        Ok(updated)
    }

    pub fn end_game(&mut self, winner: Team) {
        self.game_ended = true;
        self.winner = Some(winner);
    }

    /// None while the game runs.
    pub fn is_winning(&self) -> Option<bool> {
        match (self.winner, self.team()) {
            (Some(winner), Some(team)) => Some(winner == team),
            _ => None,
        }
    }
}
