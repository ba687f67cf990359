//! Action selection for an agent
//!
//! The network loop asks a [`DecisionModule`] for the next request whenever
//! it has no action in flight and the time penalty has passed. Incoming
//! communication requests are handed to the module as they arrive; a request
//! from the team leader jumps the queue because the game master blocks every
//! other action until it is agreed to.

use crate::board::GoalInfo;
use crate::state::{AgentState, PieceState};
use log::{debug, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use shared::{ActionRequest, GameError, MoveDirection, Position, Team};
use std::collections::{HashSet, VecDeque};

pub trait DecisionModule: Send {
    /// Next request to send. Only called while no other action is in flight.
    fn choose_action(&mut self, state: &AgentState) -> Result<ActionRequest, GameError>;

    /// A teammate asked to exchange boards with us.
    fn add_sender_to_communication_queue(&mut self, state: &AgentState, requester_id: u32);

    /// The teammate we asked has answered.
    fn save_communication_result(
        &mut self,
        state: &mut AgentState,
        responder_id: u32,
        agreement: bool,
        data: Option<Vec<u8>>,
    ) -> Result<(), GameError>;

    /// The game master rejected our request to `target_id`, so no answer
    /// will ever arrive.
    fn communication_request_failed(&mut self, target_id: u32);
}

/// Walks toward pieces by following the distance field, carries valid
/// pieces home and tries every goal field it has no knowledge of.
pub struct GreedyDecisionModule<R: Rng + Send> {
    rng: R,
    communication_queue: VecDeque<u32>,
    awaiting_answer: HashSet<u32>,
    /// Position of the last discover, cleared by any move
    discovered_at: Option<Position>,
    /// Actions between two board exchanges initiated by us, 0 disables them
    share_interval: u32,
    actions_since_share: u32,
    next_teammate: usize,
}

impl<R: Rng + Send> GreedyDecisionModule<R> {
    pub fn new(rng: R, share_interval: u32) -> Self {
        Self {
            rng,
            communication_queue: VecDeque::new(),
            awaiting_answer: HashSet::new(),
            discovered_at: None,
            share_interval,
            actions_since_share: 0,
            next_teammate: 0,
        }
    }

    pub fn queued_requests(&self) -> impl Iterator<Item = u32> + '_ {
        self.communication_queue.iter().copied()
    }

    fn answer_next_request(&mut self, state: &AgentState) -> Result<Option<ActionRequest>, GameError> {
        match self.communication_queue.pop_front() {
            Some(requester_id) => Ok(Some(ActionRequest::CommunicationAgreement {
                requester_id,
                agreement: true,
                data: state.board.encode()?,
            })),
            None => Ok(None),
        }
    }

    /// Leaders share with each teammate in turn, everyone else with the leader.
    fn share_target(&mut self, state: &AgentState) -> Option<u32> {
        let rules = state.rules.as_ref()?;
        let target = if rules.is_leader() {
            let teammates: Vec<u32> = rules.teammates().collect();
            if teammates.is_empty() {
                return None;
            }
            let target = teammates[self.next_teammate % teammates.len()];
            self.next_teammate += 1;
            target
        } else {
            rules.leader_id
        };
        (!self.awaiting_answer.contains(&target)).then_some(target)
    }

    fn allowed_directions(&self, state: &AgentState) -> Vec<MoveDirection> {
        let Some(rules) = state.rules.as_ref() else {
            return Vec::new();
        };
        MoveDirection::ALL
            .into_iter()
            .filter(|direction| {
                state
                    .position
                    .step(*direction, state.board.width(), state.board.height())
                    .map(|target| !rules.rules.is_in_goal_area(target, rules.team.opponent()))
                    .unwrap_or(false)
            })
            .collect()
    }

    fn random_move(&mut self, state: &AgentState) -> ActionRequest {
        let directions = self.allowed_directions(state);
        let direction = directions
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(MoveDirection::Up);
        ActionRequest::Move(direction)
    }

    /// Neighbour with the smallest known distance, if it is closer than here.
    fn descend(&mut self, state: &AgentState) -> Option<MoveDirection> {
        let here = state.board.distance_at(state.position).unwrap_or(u32::MAX);
        let candidates: Vec<(MoveDirection, u32)> = self
            .allowed_directions(state)
            .into_iter()
            .filter_map(|direction| {
                let target = state
                    .position
                    .step(direction, state.board.width(), state.board.height())?;
                state.board.distance_at(target).map(|d| (direction, d))
            })
            .filter(|(_, distance)| *distance < here)
            .collect();

        let best = candidates.iter().map(|(_, d)| *d).min()?;
        let best: Vec<MoveDirection> = candidates
            .into_iter()
            .filter(|(_, d)| *d == best)
            .map(|(direction, _)| direction)
            .collect();
        best.choose(&mut self.rng).copied()
    }

    fn seek_piece(&mut self, state: &AgentState) -> ActionRequest {
        if state.board.distance_at(state.position) == Some(0) {
            return ActionRequest::PickPiece;
        }
        if let Some(direction) = self.descend(state) {
            return ActionRequest::Move(direction);
        }
        if self.discovered_at != Some(state.position) {
            return ActionRequest::Discover;
        }
        self.random_move(state)
    }

    /// Closest own goal field we know nothing about.
    fn untried_goal_field(&self, state: &AgentState) -> Option<Position> {
        let rules = state.rules.as_ref()?;
        (0..state.board.height())
            .filter(|y| rules.rules.goal_area_owner(*y) == Some(rules.team))
            .flat_map(|y| (0..state.board.width()).map(move |x| Position::new(x, y)))
            .filter(|p| state.board.goal_info(*p) == GoalInfo::Unknown)
            .min_by_key(|p| p.manhattan(state.position))
    }

    fn carry_home(&mut self, state: &AgentState) -> ActionRequest {
        if state.is_in_own_goal_area() && state.board.goal_info(state.position) == GoalInfo::Unknown {
            return ActionRequest::PutPiece;
        }
        if !state.is_in_own_goal_area() {
            if let Some(team) = state.team() {
                return ActionRequest::Move(homeward(team));
            }
        }

        let target = match self.untried_goal_field(state) {
            Some(target) => target,
            None => return self.random_move(state),
        };
        let direction = if target.y > state.position.y {
            MoveDirection::Up
        } else if target.y < state.position.y {
            MoveDirection::Down
        } else if target.x > state.position.x {
            MoveDirection::Right
        } else {
            MoveDirection::Left
        };
        ActionRequest::Move(direction)
    }
}

impl<R: Rng + Send> DecisionModule for GreedyDecisionModule<R> {
    fn choose_action(&mut self, state: &AgentState) -> Result<ActionRequest, GameError> {
        if let Some(answer) = self.answer_next_request(state)? {
            return Ok(answer);
        }

        self.actions_since_share += 1;
        if self.share_interval > 0 && self.actions_since_share >= self.share_interval {
            if let Some(target_id) = self.share_target(state) {
                self.actions_since_share = 0;
                self.awaiting_answer.insert(target_id);
                return Ok(ActionRequest::CommunicationRequest {
                    target_id,
                    data: state.board.encode()?,
                });
            }
        }

        let action = if !state.holds_piece {
            self.seek_piece(state)
        } else {
            match state.piece_state {
                PieceState::Unknown => ActionRequest::CheckPiece,
                PieceState::Invalid => ActionRequest::DestroyPiece,
                PieceState::Valid => self.carry_home(state),
            }
        };

        match action {
            ActionRequest::Discover => self.discovered_at = Some(state.position),
            ActionRequest::Move(_) => self.discovered_at = None,
            _ => {}
        }
        Ok(action)
    }

    fn add_sender_to_communication_queue(&mut self, state: &AgentState, requester_id: u32) {
        let leader_id = state.rules.as_ref().map(|r| r.leader_id);
        if self.communication_queue.contains(&requester_id) {
            return;
        }
        if leader_id == Some(requester_id) {
            debug!("Leader {} asked to communicate, answering first", requester_id);
            self.communication_queue.push_front(requester_id);
        } else {
            self.communication_queue.push_back(requester_id);
        }
    }

    fn save_communication_result(
        &mut self,
        state: &mut AgentState,
        responder_id: u32,
        agreement: bool,
        data: Option<Vec<u8>>,
    ) -> Result<(), GameError> {
        self.awaiting_answer.remove(&responder_id);
        match (agreement, data) {
            (true, Some(data)) => {
                state.update_board_with_communication_data(&data)?;
            }
            (true, None) => warn!("Agent {} agreed but sent no board", responder_id),
            (false, _) => debug!("Agent {} refused to communicate", responder_id),
        }
        Ok(())
    }

    fn communication_request_failed(&mut self, target_id: u32) {
        debug!("Request to agent {} rejected, may ask again", target_id);
        self.awaiting_answer.remove(&target_id);
    }
}

/// Direction that brings `team` closer to its own goal area.
pub fn homeward(team: Team) -> MoveDirection {
    match team {
        Team::Red => MoveDirection::Up,
        Team::Blue => MoveDirection::Down,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::AgentBoard;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shared::{AgentGameRules, GameRules};

    fn state_for(agent_id: u32, leader_id: u32, start: Position) -> AgentState {
        let mut state = AgentState::new();
        state.setup(AgentGameRules {
            rules: GameRules {
                board_width: 8,
                board_height: 8,
                goal_area_height: 2,
                ..GameRules::default()
            },
            agent_id,
            team: Team::Red,
            start,
            team_ids: vec![1, 2, 3],
            leader_id,
        });
        state
    }

    fn module() -> GreedyDecisionModule<StdRng> {
        GreedyDecisionModule::new(StdRng::seed_from_u64(3), 0)
    }

    #[test]
    fn test_leader_request_answered_first() {
        let state = state_for(2, 1, Position::new(4, 4));
        let mut decision = module();

        decision.add_sender_to_communication_queue(&state, 3);
        decision.add_sender_to_communication_queue(&state, 1);
        decision.add_sender_to_communication_queue(&state, 3);
        assert_eq!(decision.queued_requests().collect::<Vec<_>>(), vec![1, 3]);

        match decision.choose_action(&state).unwrap() {
            ActionRequest::CommunicationAgreement { requester_id, agreement, data } => {
                assert_eq!(requester_id, 1);
                assert!(agreement);
                assert_eq!(AgentBoard::decode(&data).unwrap(), state.board);
            }
            other => panic!("Unexpected action: {:?}", other),
        }
    }

    #[test]
    fn test_picks_piece_under_agent() {
        let mut state = state_for(2, 1, Position::new(4, 4));
        state.board.set_distance(Position::new(4, 4), Some(0), 1).unwrap();

        assert_eq!(module().choose_action(&state).unwrap(), ActionRequest::PickPiece);
    }

    #[test]
    fn test_discovers_then_descends() {
        let mut state = state_for(2, 1, Position::new(4, 4));
        let mut decision = module();

        assert_eq!(decision.choose_action(&state).unwrap(), ActionRequest::Discover);

        state.board.set_distance(Position::new(4, 4), Some(2), 5).unwrap();
        state.board.set_distance(Position::new(3, 4), Some(1), 5).unwrap();
        state.board.set_distance(Position::new(5, 4), Some(3), 5).unwrap();
        assert_eq!(
            decision.choose_action(&state).unwrap(),
            ActionRequest::Move(MoveDirection::Left)
        );
    }

    #[test]
    fn test_no_second_discover_on_same_field() {
        let state = state_for(2, 1, Position::new(4, 4));
        let mut decision = module();

        assert_eq!(decision.choose_action(&state).unwrap(), ActionRequest::Discover);
        assert!(matches!(decision.choose_action(&state).unwrap(), ActionRequest::Move(_)));
    }

    #[test]
    fn test_piece_handling() {
        let mut state = state_for(2, 1, Position::new(4, 4));
        let mut decision = module();
        state.holds_piece = true;

        assert_eq!(decision.choose_action(&state).unwrap(), ActionRequest::CheckPiece);

        state.piece_state = PieceState::Invalid;
        assert_eq!(decision.choose_action(&state).unwrap(), ActionRequest::DestroyPiece);

        state.piece_state = PieceState::Valid;
        assert_eq!(
            decision.choose_action(&state).unwrap(),
            ActionRequest::Move(homeward(Team::Red))
        );
    }

    #[test]
    fn test_puts_piece_on_untried_goal_field() {
        let mut state = state_for(2, 1, Position::new(4, 7));
        state.holds_piece = true;
        state.piece_state = PieceState::Valid;
        let mut decision = module();

        assert_eq!(decision.choose_action(&state).unwrap(), ActionRequest::PutPiece);

        state.board.set_goal_info(Position::new(4, 7), GoalInfo::NotGoal, 3).unwrap();
        assert!(matches!(decision.choose_action(&state).unwrap(), ActionRequest::Move(_)));
    }

    #[test]
    fn test_random_moves_avoid_enemy_goal_area() {
        let state = state_for(2, 1, Position::new(0, 2));
        let decision = module();

        let directions = decision.allowed_directions(&state);
        assert!(!directions.contains(&MoveDirection::Down));
        assert!(!directions.contains(&MoveDirection::Left));
        assert_eq!(directions.len(), 2);
    }

    #[test]
    fn test_shares_board_with_leader() {
        let state = state_for(2, 1, Position::new(4, 4));
        let mut decision = GreedyDecisionModule::new(StdRng::seed_from_u64(1), 1);

        match decision.choose_action(&state).unwrap() {
            ActionRequest::CommunicationRequest { target_id, .. } => assert_eq!(target_id, 1),
            other => panic!("Unexpected action: {:?}", other),
        }
        // no second request while the leader has not answered
        assert!(!matches!(
            decision.choose_action(&state).unwrap(),
            ActionRequest::CommunicationRequest { .. }
        ));
    }

    #[test]
    fn test_rejected_request_allows_asking_again() {
        let state = state_for(2, 1, Position::new(4, 4));
        let mut decision = GreedyDecisionModule::new(StdRng::seed_from_u64(1), 1);

        assert!(matches!(
            decision.choose_action(&state).unwrap(),
            ActionRequest::CommunicationRequest { target_id: 1, .. }
        ));
        decision.communication_request_failed(1);

        assert!(matches!(
            decision.choose_action(&state).unwrap(),
            ActionRequest::CommunicationRequest { target_id: 1, .. }
        ));
    }

    #[test]
    fn test_communication_result_merges_board() {
        let mut state = state_for(1, 1, Position::new(4, 4));
        let mut decision = module();
        let mut other = AgentBoard::new(8, 8, 2);
        other.set_distance(Position::new(6, 6), Some(1), 40).unwrap();

        decision
            .save_communication_result(&mut state, 2, true, Some(other.encode().unwrap()))
            .unwrap();
        assert_eq!(state.board.distance_at(Position::new(6, 6)), Some(1));
    }
}
