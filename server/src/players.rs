//! Per-agent records kept by the game master
//!
//! A [`PlayerState`] is created when an agent joins and lives until the game
//! ends. Besides position and held piece it carries the eligibility window:
//! a request is accepted only once `last_request_timestamp + last_action_delay`
//! has passed.

use crate::board::Piece;
use log::debug;
use shared::{GameError, Position, Team};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct PlayerState {
    pub id: u32,
    pub team: Team,
    pub is_leader: bool,
    /// Assigned when the game starts
    pub position: Option<Position>,
    pub piece: Option<Piece>,
    /// Set while a leader-initiated communication with this player is unanswered
    pub pending_leader_communication: bool,
    /// Game time in milliseconds of the last accepted request
    pub last_request_timestamp: u64,
    /// Milliseconds the player must wait after `last_request_timestamp`
    pub last_action_delay: u64,
}

impl PlayerState {
    pub fn new(id: u32, team: Team, is_leader: bool) -> Self {
        Self {
            id,
            team,
            is_leader,
            position: None,
            piece: None,
            pending_leader_communication: false,
            last_request_timestamp: 0,
            last_action_delay: 0,
        }
    }

    /// Game time from which the next request will be accepted
    pub fn wait_until(&self) -> u64 {
        self.last_request_timestamp + self.last_action_delay
    }

    pub fn is_eligible_for_action(&self, now: u64) -> bool {
        now >= self.wait_until()
    }

    /// Fails if a leader communication is pending or the penalty has not elapsed.
    pub fn check_eligibility(&self, now: u64) -> Result<(), GameError> {
        if self.pending_leader_communication {
            return Err(GameError::PendingLeaderCommunication);
        }
        self.check_delay(now)
    }

    /// Delay-only part of the eligibility check.
    pub fn check_delay(&self, now: u64) -> Result<(), GameError> {
        if !self.is_eligible_for_action(now) {
            return Err(GameError::Delay {
                wait_until: self.wait_until(),
            });
        }
        Ok(())
    }

    /// Starts a fresh penalty of `delay` ms.
    pub fn delay(&mut self, now: u64, delay: u64) {
        self.last_request_timestamp = now;
        self.last_action_delay = delay;
    }

    /// Adds `delay` ms on top of whatever is left of the current penalty.
    pub fn add_delay(&mut self, now: u64, delay: u64) {
        let remaining = self.wait_until().saturating_sub(now);
        self.last_action_delay = delay + remaining;
        self.last_request_timestamp = now;
    }

    pub fn position(&self) -> Result<Position, GameError> {
        self.position
            .ok_or_else(|| GameError::GameSetup(format!("Agent {} has not been placed on the board", self.id)))
    }
}

/// Owns every [`PlayerState`], indexed by agent id.
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    players: BTreeMap<u32, PlayerState>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, player: PlayerState) {
        self.players.insert(player.id, player);
    }

    pub fn contains(&self, id: u32) -> bool {
        self.players.contains_key(&id)
    }

    pub fn get(&self, id: u32) -> Result<&PlayerState, GameError> {
        self.players.get(&id).ok_or(GameError::UnknownAgent(id))
    }

    pub fn get_mut(&mut self, id: u32) -> Result<&mut PlayerState, GameError> {
        self.players.get_mut(&id).ok_or(GameError::UnknownAgent(id))
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlayerState> {
        self.players.values()
    }

    pub fn team(&self, team: Team) -> impl Iterator<Item = &PlayerState> {
        self.players.values().filter(move |p| p.team == team)
    }

    pub fn team_size(&self, team: Team) -> usize {
        self.team(team).count()
    }

    pub fn leader_of(&self, team: Team) -> Option<u32> {
        self.team(team).find(|p| p.is_leader).map(|p| p.id)
    }

    /// Returns the id of the player standing on `position`, if any.
    pub fn occupant(&self, position: Position) -> Option<u32> {
        self.players
            .values()
            .find(|p| p.position == Some(position))
            .map(|p| p.id)
    }

    /// Fresh penalty for one player, see [`PlayerState::delay`].
    pub fn delay_player(&mut self, id: u32, now: u64, delay: u64) -> Result<u64, GameError> {
        let player = self.get_mut(id)?;
        debug!("Delaying agent {} by {}ms", id, delay);
        player.delay(now, delay);
        Ok(player.wait_until())
    }

    /// Accumulating penalty for one player, see [`PlayerState::add_delay`].
    pub fn add_delay(&mut self, id: u32, now: u64, delay: u64) -> Result<u64, GameError> {
        let player = self.get_mut(id)?;
        player.add_delay(now, delay);
        debug!("Adding delay for agent {}, now it's {}ms", id, player.last_action_delay);
        Ok(player.wait_until())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_player_is_eligible() {
        let player = PlayerState::new(1, Team::Red, false);
        assert!(player.check_eligibility(0).is_ok());
        assert_eq!(player.wait_until(), 0);
        assert!(player.position.is_none());
    }

    #[test]
    fn test_delay_window() {
        let mut player = PlayerState::new(1, Team::Red, false);
        player.delay(1000, 200);

        assert_eq!(
            player.check_eligibility(1199),
            Err(GameError::Delay { wait_until: 1200 })
        );
        assert!(player.check_eligibility(1200).is_ok());
        assert!(player.check_eligibility(5000).is_ok());
    }

    #[test]
    fn test_delay_replaces_previous_penalty() {
        let mut player = PlayerState::new(1, Team::Red, false);
        player.delay(0, 1000);
        player.delay(100, 50);
        assert_eq!(player.wait_until(), 150);
    }

    #[test]
    fn test_add_delay_accumulates_remaining_penalty() {
        let mut player = PlayerState::new(1, Team::Blue, false);
        player.delay(1000, 500);

        // 300ms of the old penalty are left at t=1200
        player.add_delay(1200, 300);
        assert_eq!(player.last_request_timestamp, 1200);
        assert_eq!(player.last_action_delay, 600);
        assert_eq!(player.wait_until(), 1800);
    }

    #[test]
    fn test_add_delay_after_penalty_elapsed() {
        let mut player = PlayerState::new(1, Team::Blue, false);
        player.delay(0, 100);
        player.add_delay(500, 300);
        assert_eq!(player.last_action_delay, 300);
    }

    #[test]
    fn test_pending_leader_communication_blocks_before_delay() {
        let mut player = PlayerState::new(2, Team::Red, false);
        player.delay(0, 1000);
        player.pending_leader_communication = true;

        assert_eq!(
            player.check_eligibility(10),
            Err(GameError::PendingLeaderCommunication)
        );
        assert_eq!(player.check_delay(10), Err(GameError::Delay { wait_until: 1000 }));
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = PlayerRegistry::new();
        registry.insert(PlayerState::new(1, Team::Red, true));
        registry.insert(PlayerState::new(2, Team::Red, false));
        registry.insert(PlayerState::new(3, Team::Blue, false));

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.team_size(Team::Red), 2);
        assert_eq!(registry.leader_of(Team::Red), Some(1));
        assert_eq!(registry.leader_of(Team::Blue), None);
        assert_eq!(registry.get(9).unwrap_err(), GameError::UnknownAgent(9));
    }

    #[test]
    fn test_registry_occupant() {
        let mut registry = PlayerRegistry::new();
        let mut player = PlayerState::new(4, Team::Blue, false);
        player.position = Some(Position::new(2, 1));
        registry.insert(player);

        assert_eq!(registry.occupant(Position::new(2, 1)), Some(4));
        assert_eq!(registry.occupant(Position::new(1, 2)), None);
    }

    #[test]
    fn test_registry_delay_returns_wait_until() {
        let mut registry = PlayerRegistry::new();
        registry.insert(PlayerState::new(1, Team::Red, false));

        assert_eq!(registry.delay_player(1, 100, 250), Ok(350));
        // 150ms left + 100ms new, counted from t=200
        assert_eq!(registry.add_delay(1, 200, 100), Ok(450));
        assert!(registry.delay_player(5, 0, 1).is_err());
    }
}
