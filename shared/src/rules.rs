//! Game configuration shared by the game master and the agents.

use crate::{GameError, Position, Team};
use serde::{Deserialize, Serialize};

/// Global rules of a match, fixed for its whole duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRules {
    pub board_width: usize,
    pub board_height: usize,
    /// Rows at each end of the board that belong to one team.
    pub goal_area_height: usize,
    /// Goals hidden in each team's goal area.
    pub goal_count: u32,
    pub team_size: usize,
    /// Upper bound on pieces in play (lying on the board or held).
    pub max_pieces_on_board: usize,
    pub initial_pieces: usize,
    pub bad_piece_probability: f64,
    pub piece_spawn_interval_ms: u64,
    /// Penalty unit in milliseconds, scaled by the per-action multipliers.
    pub base_time_penalty: u64,
    pub move_multiplier: u64,
    pub discover_multiplier: u64,
    pub pick_up_piece_multiplier: u64,
    pub check_piece_multiplier: u64,
    pub destroy_piece_multiplier: u64,
    pub put_piece_multiplier: u64,
    pub communication_multiplier: u64,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            board_width: 8,
            board_height: 12,
            goal_area_height: 2,
            goal_count: 3,
            team_size: 3,
            max_pieces_on_board: 6,
            initial_pieces: 4,
            bad_piece_probability: 0.3,
            piece_spawn_interval_ms: 2000,
            base_time_penalty: 100,
            move_multiplier: 1,
            discover_multiplier: 2,
            pick_up_piece_multiplier: 1,
            check_piece_multiplier: 2,
            destroy_piece_multiplier: 1,
            put_piece_multiplier: 1,
            communication_multiplier: 3,
        }
    }
}

impl GameRules {
    /// Rejects configurations that cannot produce a playable board.
    pub fn validate(&self) -> Result<(), GameError> {
        let setup = |msg: String| Err(GameError::GameSetup(msg));

        if self.board_width == 0 || self.board_height == 0 {
            return setup("board must have at least one field".to_string());
        }
        if self.goal_area_height == 0 || 2 * self.goal_area_height >= self.board_height {
            return setup(format!(
                "goal area height {} does not fit a board of height {}",
                self.goal_area_height, self.board_height
            ));
        }
        let goal_cells = self.board_width * self.goal_area_height;
        if self.goal_count == 0 || self.goal_count as usize > goal_cells {
            return setup(format!(
                "{} goals cannot be placed in {} goal area fields",
                self.goal_count, goal_cells
            ));
        }
        if self.team_size == 0 || self.team_size > goal_cells {
            return setup(format!(
                "team of {} does not fit in {} goal area fields",
                self.team_size, goal_cells
            ));
        }
        if !(0.0..=1.0).contains(&self.bad_piece_probability) {
            return setup(format!(
                "bad piece probability {} is outside [0, 1]",
                self.bad_piece_probability
            ));
        }
        if self.initial_pieces > self.max_pieces_on_board {
            return setup("more initial pieces than the board allows".to_string());
        }
        Ok(())
    }

    /// Returns the team whose goal area contains row `y`, if any.
    pub fn goal_area_owner(&self, y: usize) -> Option<Team> {
        if y < self.goal_area_height {
            Some(Team::Blue)
        } else if y >= self.board_height.saturating_sub(self.goal_area_height) && y < self.board_height {
            Some(Team::Red)
        } else {
            None
        }
    }

    pub fn is_in_goal_area(&self, position: Position, team: Team) -> bool {
        self.goal_area_owner(position.y) == Some(team)
    }
}

/// The rules as seen by one agent: global rules plus everything the game
/// master decided about that agent when the roster was finalised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentGameRules {
    pub rules: GameRules,
    pub agent_id: u32,
    pub team: Team,
    pub start: Position,
    pub team_ids: Vec<u32>,
    pub leader_id: u32,
}

impl AgentGameRules {
    pub fn is_leader(&self) -> bool {
        self.agent_id == self.leader_id
    }

    pub fn teammates(&self) -> impl Iterator<Item = u32> + '_ {
        self.team_ids.iter().copied().filter(move |id| *id != self.agent_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_are_valid() {
        assert!(GameRules::default().validate().is_ok());
    }

    #[test]
    fn test_overlapping_goal_areas_rejected() {
        let rules = GameRules {
            board_height: 4,
            goal_area_height: 2,
            ..GameRules::default()
        };
        assert!(matches!(rules.validate(), Err(GameError::GameSetup(_))));
    }

    #[test]
    fn test_too_many_goals_rejected() {
        let rules = GameRules {
            board_width: 2,
            goal_area_height: 1,
            goal_count: 3,
            ..GameRules::default()
        };
        assert!(matches!(rules.validate(), Err(GameError::GameSetup(_))));
    }

    #[test]
    fn test_bad_probability_rejected() {
        let rules = GameRules {
            bad_piece_probability: 1.5,
            ..GameRules::default()
        };
        assert!(rules.validate().is_err());
    }

    #[test]
    fn test_goal_area_owner_bands() {
        let rules = GameRules {
            board_height: 8,
            goal_area_height: 2,
            ..GameRules::default()
        };
        assert_eq!(rules.goal_area_owner(0), Some(Team::Blue));
        assert_eq!(rules.goal_area_owner(1), Some(Team::Blue));
        assert_eq!(rules.goal_area_owner(2), None);
        assert_eq!(rules.goal_area_owner(5), None);
        assert_eq!(rules.goal_area_owner(6), Some(Team::Red));
        assert_eq!(rules.goal_area_owner(7), Some(Team::Red));
        assert_eq!(rules.goal_area_owner(8), None);
    }

    #[test]
    fn test_agent_rules_teammates_exclude_self() {
        let agent_rules = AgentGameRules {
            rules: GameRules::default(),
            agent_id: 2,
            team: Team::Red,
            start: Position::new(0, 0),
            team_ids: vec![1, 2, 3],
            leader_id: 1,
        };
        assert!(!agent_rules.is_leader());
        assert_eq!(agent_rules.teammates().collect::<Vec<_>>(), vec![1, 3]);
    }
}
