use crate::decision::DecisionModule;
use crate::state::{AgentState, PieceState};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{ActionOutcome, ActionRequest, GameError, Packet, Team, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::interval;

/// The request we are waiting an answer for
#[derive(Debug)]
struct Outstanding {
    message_id: u64,
    action: ActionRequest,
    sent_at: Instant,
}

/// Agent process: joins a team, then alternates between asking its decision
/// module for the next action and serving whatever the game master sends.
pub struct Agent<D: DecisionModule> {
    socket: UdpSocket,
    server_addr: SocketAddr,
    team: Team,
    wants_to_be_leader: bool,
    decision: D,
    state: AgentState,
    agent_id: Option<u32>,

    next_message_id: u64,
    outstanding: Option<Outstanding>,
    response_timeout: Duration,
    action_interval: Duration,

    /// Game time received with `StartGame` and the local instant it arrived
    clock: Option<(u64, Instant)>,
}

impl<D: DecisionModule> Agent<D> {
    pub async fn new(
        server_addr: &str,
        team: Team,
        wants_to_be_leader: bool,
        decision: D,
        action_interval: Duration,
        response_timeout: Duration,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Agent {
            socket,
            server_addr,
            team,
            wants_to_be_leader,
            decision,
            state: AgentState::new(),
            agent_id: None,
            next_message_id: 1,
            outstanding: None,
            response_timeout,
            action_interval,
            clock: None,
        })
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn agent_id(&self) -> Option<u32> {
        self.agent_id
    }

    /// Current game time as the game master counts it.
    fn game_now(&self) -> u64 {
        match self.clock {
            Some((start, received_at)) => start + received_at.elapsed().as_millis() as u64,
            None => 0,
        }
    }

    async fn join(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!(
            "Joining team {:?}{}",
            self.team,
            if self.wants_to_be_leader { " as leader" } else { "" }
        );

        let packet = Packet::JoinGame {
            client_version: PROTOCOL_VERSION,
            team_id: self.team.id(),
            wants_to_be_leader: self.wants_to_be_leader,
        };
        self.send_packet(&packet).await
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    fn handle_packet(&mut self, packet: Packet) -> Result<(), Box<dyn std::error::Error>> {
        match packet {
            Packet::JoinResponse { result } => match result {
                Ok(agent_id) => {
                    info!("Joined the game, agent id {}", agent_id);
                    self.agent_id = Some(agent_id);
                }
                Err(e) => {
                    warn!("Failed to join the game: {}", e);
                    return Err(e.into());
                }
            },

            Packet::StartGame { rules, timestamp } => {
                info!(
                    "Game started, agent {} starts at ({}, {}){}",
                    rules.agent_id,
                    rules.start.x,
                    rules.start.y,
                    if rules.is_leader() { " as team leader" } else { "" }
                );
                self.agent_id = Some(rules.agent_id);
                self.clock = Some((timestamp, Instant::now()));
                self.state.setup(rules);
            }

            Packet::ActionResponse {
                message_id,
                timestamp,
                wait_until,
                result,
            } => match self.outstanding.take() {
                Some(outstanding) if outstanding.message_id == message_id => {
                    self.state.wait_until = wait_until;
                    self.apply_result(outstanding.action, result, timestamp);
                }
                other => {
                    debug!("Ignoring response to message {}", message_id);
                    self.outstanding = other;
                }
            },

            Packet::CommunicationRequest { requester_id, .. } => {
                debug!("Agent {} wants to communicate", requester_id);
                self.decision
                    .add_sender_to_communication_queue(&self.state, requester_id);
            }

            Packet::CommunicationResponse {
                request_message_id,
                responder_id,
                agreement,
                data,
                wait_until,
                ..
            } => {
                debug!(
                    "Agent {} {} to communicate (message {})",
                    responder_id,
                    if agreement { "agreed" } else { "refused" },
                    request_message_id
                );
                self.state.wait_until = self.state.wait_until.max(wait_until);
                if let Err(e) =
                    self.decision
                        .save_communication_result(&mut self.state, responder_id, agreement, data)
                {
                    error!("Invalid board from agent {}: {}", responder_id, e);
                }
            }

            Packet::EndGame { winner, .. } => {
                self.state.end_game(winner);
                info!(
                    "Game over, team {:?} won, we {}",
                    winner,
                    if winner == self.team { "won" } else { "lost" }
                );
            }

            _ => {
                warn!("Unexpected packet type");
            }
        }
        Ok(())
    }

    /// Mirrors an answered action into the local state.
    fn apply_result(&mut self, action: ActionRequest, result: Result<ActionOutcome, GameError>, timestamp: u64) {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.apply_error(&action, e, timestamp);
                return;
            }
        };

        let applied = match (action, outcome) {
            (ActionRequest::Move(direction), ActionOutcome::Moved { position, distance }) => {
                let moved = self.state.move_agent(direction, distance, timestamp);
                if moved.is_err() || self.state.position != position {
                    warn!("Position out of sync, adopting ({}, {})", position.x, position.y);
                    self.state.position = position;
                    self.state.board.set_distance(position, distance, timestamp)
                } else {
                    Ok(())
                }
            }
            (other, ActionOutcome::Moved { .. }) => {
                warn!("Move outcome for {:?}, ignoring", other);
                Ok(())
            }
            (_, ActionOutcome::PiecePicked) => self.state.pick_up_piece(timestamp),
            (_, ActionOutcome::PiecePut(put_result)) => {
                debug!("Piece put: {:?}", put_result);
                self.state.place_piece(put_result, timestamp)
            }
            (_, ActionOutcome::PieceDestroyed) => self.state.destroy_piece(),
            (_, ActionOutcome::PieceChecked { is_valid }) => {
                self.state.set_piece_state(if is_valid { PieceState::Valid } else { PieceState::Invalid });
                Ok(())
            }
            (_, ActionOutcome::Discovered(discovery)) => self.state.discover(&discovery, timestamp),
            (_, ActionOutcome::CommunicationRequested) => Ok(()),
            (_, ActionOutcome::CommunicationAnswered { requester_id, data }) => match data {
                Some(data) => self
                    .state
                    .update_board_with_communication_data(&data)
                    .map(|_| ())
                    .map_err(|e| {
                        warn!("Board from agent {} rejected", requester_id);
                        e
                    }),
                None => Ok(()),
            },
        };

        if let Err(e) = applied {
            warn!("Could not apply action result: {}", e);
        }
    }

    /// A rejection tells us something about the world we got wrong.
    fn apply_error(&mut self, action: &ActionRequest, error: GameError, timestamp: u64) {
        debug!("{:?} rejected: {}", action, error);
        if let ActionRequest::CommunicationRequest { target_id, .. } = action {
            self.decision.communication_request_failed(*target_id);
        }

        match (action, error) {
            (_, GameError::GameOver) => self.state.game_ended = true,
            (_, GameError::Delay { wait_until }) => {
                self.state.wait_until = self.state.wait_until.max(wait_until)
            }
            (ActionRequest::PickPiece, GameError::PieceOperation(_)) => {
                // nothing to pick up here after all
                let position = self.state.position;
                if let Err(e) = self.state.board.set_distance(position, None, timestamp) {
                    warn!("Could not forget distance: {}", e);
                }
            }
            (ActionRequest::PutPiece, GameError::PieceOperation(_))
                if self.state.holds_piece && self.state.is_in_task_area() =>
            {
                // another piece lies here, ours is still in hand
                let position = self.state.position;
                if let Err(e) = self.state.board.set_distance(position, Some(0), timestamp) {
                    warn!("Could not record piece: {}", e);
                }
            }
            (
                ActionRequest::PutPiece | ActionRequest::CheckPiece | ActionRequest::DestroyPiece,
                GameError::PieceOperation(_),
            ) => {
                self.state.holds_piece = false;
                self.state.piece_state = PieceState::Unknown;
            }
            (_, other) => debug!("Agent continues after {}", other),
        }
    }

    /// Sends the next action once the previous one is answered (or timed
    /// out) and the penalty has elapsed.
    async fn maybe_act(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if !self.state.game_started || self.state.game_ended {
            return Ok(());
        }

        if let Some(outstanding) = &self.outstanding {
            if outstanding.sent_at.elapsed() < self.response_timeout {
                return Ok(());
            }
            warn!(
                "No response to message {} within {:?}, giving up on it",
                outstanding.message_id, self.response_timeout
            );
            self.outstanding = None;
        }

        if self.game_now() < self.state.wait_until {
            return Ok(());
        }

        let action = self.decision.choose_action(&self.state)?;
        let message_id = self.next_message_id;
        self.next_message_id += 1;

        debug!("Sending {:?} as message {}", action, message_id);
        self.send_packet(&Packet::Action {
            message_id,
            action: action.clone(),
        })
        .await?;

        self.outstanding = Some(Outstanding {
            message_id,
            action,
            sent_at: Instant::now(),
        });
        Ok(())
    }

    /// Plays until the game ends. Returns the winning team, if announced.
    pub async fn run(&mut self) -> Result<Option<Team>, Box<dyn std::error::Error>> {
        self.join().await?;

        let mut action_interval = interval(self.action_interval);
        let mut buffer = [0u8; 65536];

        while !self.state.game_ended {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            match deserialize::<Packet>(&buffer[0..len]) {
                                Ok(packet) => self.handle_packet(packet)?,
                                Err(e) => warn!("Failed to deserialize packet: {}", e),
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = action_interval.tick() => {
                    if let Err(e) = self.maybe_act().await {
                        error!("Error sending action: {}", e);
                    }
                },
            }
        }

        let _ = self.send_packet(&Packet::Disconnect).await;

        Ok(self.state.winner)
    }
}
