//! Authoritative game state
//!
//! [`GameMasterState`] owns the board, the player roster and the
//! communication slots. Every action first checks the caller's eligibility,
//! then validates the game rules, and only then commits; a rejected action
//! leaves all state untouched. Accepted actions start a new time penalty of
//! `multiplier * base_time_penalty` for the acting player.
//!
//! All methods take the current game time `now` in milliseconds, which keeps
//! the state free of clocks and makes every outcome reproducible.

use crate::board::GameMasterBoard;
use crate::communication::{CommunicationCoordinator, CommunicationExchange};
use crate::players::{PlayerRegistry, PlayerState};
use log::{debug, info};
use rand::Rng;
use shared::{
    AgentGameRules, DiscoveredField, DiscoveryResult, GameError, GameRules, MoveDirection,
    Position, PutPieceResult, Team,
};
use std::collections::BTreeMap;

pub struct GameMasterState {
    rules: GameRules,
    pub board: GameMasterBoard,
    pub players: PlayerRegistry,
    communication: CommunicationCoordinator,
    pub undiscovered_red_goals_left: u32,
    pub undiscovered_blue_goals_left: u32,
    pub game_started: bool,
    pub game_ended: bool,
    pub winner: Option<Team>,
}

impl GameMasterState {
    pub fn new(rules: GameRules) -> Result<Self, GameError> {
        rules.validate()?;
        Ok(Self {
            board: GameMasterBoard::new(&rules),
            players: PlayerRegistry::new(),
            communication: CommunicationCoordinator::new(),
            undiscovered_red_goals_left: rules.goal_count,
            undiscovered_blue_goals_left: rules.goal_count,
            game_started: false,
            game_ended: false,
            winner: None,
            rules,
        })
    }

    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    pub fn goals_left(&self, team: Team) -> u32 {
        match team {
            Team::Red => self.undiscovered_red_goals_left,
            Team::Blue => self.undiscovered_blue_goals_left,
        }
    }

    /// Registers an agent. Returns whether it became its team's leader.
    ///
    /// The first agent that asks for leadership gets it; if nobody asked, the
    /// agent taking the last free slot of the team is made leader.
    pub fn join_game(&mut self, agent_id: u32, team_id: u8, wants_to_be_leader: bool) -> Result<bool, GameError> {
        if self.game_started {
            return Err(GameError::GameSetup("The game has already started".to_string()));
        }
        if self.players.contains(agent_id) {
            return Err(GameError::GameSetup(format!("Agent with Id {} is already connected", agent_id)));
        }
        let team = Team::from_id(team_id).ok_or_else(|| GameError::GameSetup(format!("No team with Id {}", team_id)))?;

        let team_members = self.players.team_size(team);
        if team_members >= self.rules.team_size {
            return Err(GameError::GameSetup(format!("Team {:?} is full", team)));
        }

        let is_leader = if self.players.leader_of(team).is_some() {
            false
        } else if team_members == self.rules.team_size - 1 {
            true
        } else {
            wants_to_be_leader
        };

        self.players.insert(PlayerState::new(agent_id, team, is_leader));
        info!(
            "Agent {} joined team {:?}{}",
            agent_id,
            team,
            if is_leader { " as leader" } else { "" }
        );
        Ok(is_leader)
    }

    /// Both teams are complete.
    pub fn is_ready_to_start(&self) -> bool {
        !self.game_started
            && self.players.team_size(Team::Red) == self.rules.team_size
            && self.players.team_size(Team::Blue) == self.rules.team_size
    }

    /// Places players and goals, spawns the initial pieces and returns the
    /// rules every agent gets.
    pub fn start_game<R: Rng>(&mut self, rng: &mut R) -> Result<BTreeMap<u32, AgentGameRules>, GameError> {
        if !self.is_ready_to_start() {
            return Err(GameError::GameSetup("Teams are not complete".to_string()));
        }

        self.initialize_player_positions();
        self.board.place_goals(self.rules.goal_count, rng);
        for _ in 0..self.rules.initial_pieces {
            self.generate_piece(rng);
        }
        self.game_started = true;

        info!(
            "Game started on a {}x{} board with {} pieces",
            self.rules.board_width,
            self.rules.board_height,
            self.board.piece_count()
        );
        self.agent_game_rules()
    }

    /// Spreads each team over its own goal area: rows grow away from the
    /// board edge, columns fan out from the centre.
    pub fn initialize_player_positions(&mut self) {
        let width = self.rules.board_width;
        let height = self.rules.board_height;

        let distance = |n: usize| if n % 2 == 0 { n / 2 } else { n / 2 + 1 };
        let side = |n: usize| if n % 2 == 0 { 1isize } else { -1isize };
        let column = |origin: usize, n: usize, flip: usize| {
            let offset = distance(n % width) as isize * side(n + flip);
            (origin as isize + offset).clamp(0, width as isize - 1) as usize
        };

        for team in [Team::Red, Team::Blue] {
            let ids: Vec<u32> = self.players.team(team).map(|p| p.id).collect();
            for (i, id) in ids.into_iter().enumerate() {
                let position = match team {
                    Team::Red => Position::new(column(width / 2, i, 0), height - 1 - i / width),
                    Team::Blue => Position::new(column((width - 1) / 2, i, 1), i / width),
                };
                if let Ok(player) = self.players.get_mut(id) {
                    player.position = Some(position);
                }
            }
        }
    }

    /// Per-agent view of the configuration. Pure over the current roster.
    pub fn agent_game_rules(&self) -> Result<BTreeMap<u32, AgentGameRules>, GameError> {
        let mut result = BTreeMap::new();
        for player in self.players.iter() {
            let team_ids: Vec<u32> = self.players.team(player.team).map(|p| p.id).collect();
            let leader_id = self
                .players
                .leader_of(player.team)
                .ok_or_else(|| GameError::GameSetup(format!("Team {:?} has no leader", player.team)))?;
            result.insert(
                player.id,
                AgentGameRules {
                    rules: self.rules.clone(),
                    agent_id: player.id,
                    team: player.team,
                    start: player.position()?,
                    team_ids,
                    leader_id,
                },
            );
        }
        Ok(result)
    }

    /// Spawns a piece in the task area if the board is below its maximum.
    pub fn generate_piece<R: Rng>(&mut self, rng: &mut R) -> Option<Position> {
        let valid_probability = 1.0 - self.rules.bad_piece_probability;
        self.board
            .generate_piece(valid_probability, self.rules.max_pieces_on_board, rng)
    }

    /// Game time from which `player_id` is eligible again.
    pub fn wait_until(&self, player_id: u32) -> Result<u64, GameError> {
        Ok(self.players.get(player_id)?.wait_until())
    }

    fn ensure_running(&self) -> Result<(), GameError> {
        if self.game_ended {
            return Err(GameError::GameOver);
        }
        if !self.game_started {
            return Err(GameError::GameSetup("The game has not started yet".to_string()));
        }
        Ok(())
    }

    /// Common prologue of every action: the game runs and the player may act.
    fn eligible_player(&self, player_id: u32, now: u64) -> Result<&PlayerState, GameError> {
        self.ensure_running()?;
        let player = self.players.get(player_id)?;
        player.check_eligibility(now)?;
        Ok(player)
    }

    fn delay_player(&mut self, player_id: u32, multiplier: u64, now: u64) -> Result<(), GameError> {
        let delay = multiplier * self.rules.base_time_penalty;
        self.players.delay_player(player_id, now, delay)?;
        Ok(())
    }

    /// Moves one field. Returns the new position and its distance to the nearest piece.
    pub fn move_player(
        &mut self,
        player_id: u32,
        direction: MoveDirection,
        now: u64,
    ) -> Result<(Position, Option<u32>), GameError> {
        let player = self.eligible_player(player_id, now)?;
        let team = player.team;

        let target = player
            .position()?
            .step(direction, self.board.width(), self.board.height())
            .ok_or(GameError::OutOfBoardMove)?;

        if self.board.is_in_goal_area(target, team.opponent()) {
            return Err(GameError::OutOfBoardMove);
        }
        if self.players.occupant(target).is_some() {
            return Err(GameError::AgentCollisionMove);
        }

        self.players.get_mut(player_id)?.position = Some(target);
        self.delay_player(player_id, self.rules.move_multiplier, now)?;

        Ok((target, self.board.distance_at(target)))
    }

    pub fn pick_up_piece(&mut self, player_id: u32, now: u64) -> Result<(), GameError> {
        let player = self.eligible_player(player_id, now)?;
        if player.piece.is_some() {
            return Err(GameError::PieceOperation("Cannot pick up piece if you already have one".to_string()));
        }
        let position = player.position()?;

        let piece = self
            .board
            .remove_piece(position)
            .ok_or_else(|| GameError::PieceOperation("No piece on this field".to_string()))?;

        self.players.get_mut(player_id)?.piece = Some(piece);
        self.delay_player(player_id, self.rules.pick_up_piece_multiplier, now)?;
        Ok(())
    }

    pub fn put_piece(&mut self, player_id: u32, now: u64) -> Result<PutPieceResult, GameError> {
        let player = self.eligible_player(player_id, now)?;
        let piece = player
            .piece
            .ok_or_else(|| GameError::PieceOperation("Player doesn't have a piece".to_string()))?;
        let team = player.team;
        let position = player.position()?;

        if self.board.field(position).has_piece() {
            return Err(GameError::PieceOperation("Cannot put another piece on this field".to_string()));
        }

        self.players.get_mut(player_id)?.piece = None;
        self.delay_player(player_id, self.rules.put_piece_multiplier, now)?;

        if !self.board.is_in_goal_area(position, team) {
            self.board.place_piece(position, piece);
            return Ok(PutPieceResult::PieceInTaskArea);
        }

        self.board.discard_piece();
        let result = if !piece.is_valid {
            PutPieceResult::PieceWasFake
        } else if self.board.reveal_goal(position) {
            self.realize_goal(team);
            PutPieceResult::PieceGoalRealized
        } else {
            PutPieceResult::PieceGoalUnrealized
        };
        debug!("Agent {} put piece at ({}, {}): {:?}", player_id, position.x, position.y, result);
        Ok(result)
    }

    fn realize_goal(&mut self, team: Team) {
        let counter = match team {
            Team::Red => &mut self.undiscovered_red_goals_left,
            Team::Blue => &mut self.undiscovered_blue_goals_left,
        };
        *counter = counter.saturating_sub(1);
        info!("Team {:?} realized a goal, {} left", team, *counter);

        if self.undiscovered_red_goals_left == 0 || self.undiscovered_blue_goals_left == 0 {
            let winner = if self.undiscovered_blue_goals_left == 0 {
                Team::Blue
            } else {
                Team::Red
            };
            self.game_ended = true;
            self.winner = Some(winner);
            info!("Game ended, team {:?} won", winner);
        }
    }

    pub fn destroy_piece(&mut self, player_id: u32, now: u64) -> Result<(), GameError> {
        let player = self.eligible_player(player_id, now)?;
        if player.piece.is_none() {
            return Err(GameError::PieceOperation("Player doesn't have a piece".to_string()));
        }

        self.players.get_mut(player_id)?.piece = None;
        self.board.discard_piece();
        self.delay_player(player_id, self.rules.destroy_piece_multiplier, now)?;
        Ok(())
    }

    /// Reveals whether the held piece is valid.
    pub fn check_piece(&mut self, player_id: u32, now: u64) -> Result<bool, GameError> {
        let player = self.eligible_player(player_id, now)?;
        let piece = player
            .piece
            .ok_or_else(|| GameError::PieceOperation("Player doesn't have a piece".to_string()))?;

        self.delay_player(player_id, self.rules.check_piece_multiplier, now)?;
        Ok(piece.is_valid)
    }

    /// Distances in the 3x3 window around the player; unknown fields are left out.
    pub fn discover(&mut self, player_id: u32, now: u64) -> Result<DiscoveryResult, GameError> {
        let position = self.eligible_player(player_id, now)?.position()?;
        self.delay_player(player_id, self.rules.discover_multiplier, now)?;

        let window = self.board.neighborhood(position);
        let mut fields = Vec::new();
        for (i, column) in window.iter().enumerate() {
            for (j, distance) in column.iter().enumerate() {
                if let Some(distance) = distance {
                    fields.push(DiscoveredField {
                        x: position.x + i - 1,
                        y: position.y + j - 1,
                        distance: *distance,
                    });
                }
            }
        }
        debug!("Discovery result for {}: {:?}", player_id, fields);
        Ok(DiscoveryResult { fields })
    }

    /// First half of the handshake, see [`CommunicationCoordinator::request`].
    pub fn communication_request(
        &mut self,
        sender_id: u32,
        target_id: u32,
        data: Vec<u8>,
        message_id: u64,
        now: u64,
    ) -> Result<(), GameError> {
        self.ensure_running()?;
        self.communication
            .request(&mut self.players, sender_id, target_id, data, message_id, now)
    }

    /// Second half of the handshake, see [`CommunicationCoordinator::respond`].
    pub fn communication_agreement(
        &mut self,
        responder_id: u32,
        requester_id: u32,
        agreement: bool,
        data: Vec<u8>,
        now: u64,
    ) -> Result<CommunicationExchange, GameError> {
        self.ensure_running()?;
        let delay = self.rules.communication_multiplier * self.rules.base_time_penalty;
        self.communication.respond(
            &mut self.players,
            requester_id,
            responder_id,
            agreement,
            data,
            delay,
            now,
        )
    }
}
