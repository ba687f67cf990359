//! Game master network layer: UDP transport and request dispatch

use crate::client_manager::ClientManager;
use crate::game::GameMasterState;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{ActionOutcome, ActionRequest, GameError, GameRules, Packet, PROTOCOL_VERSION};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Agents silent for longer than this are reported
const CLIENT_SILENCE_WARNING: Duration = Duration::from_secs(10);

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Messages sent from game loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<u32>,
    },
}

/// Applies one action request to the game state and returns every packet it
/// produces, addressed by agent id. The requesting agent always gets exactly
/// one `ActionResponse`, placed first.
///
/// Contract defects (unknown agent ids) are returned as errors instead of
/// being answered.
pub fn dispatch_action(
    game: &mut GameMasterState,
    agent_id: u32,
    message_id: u64,
    action: ActionRequest,
    now: u64,
) -> Result<Vec<(u32, Packet)>, GameError> {
    let mut outgoing = Vec::new();

    let result = match action {
        ActionRequest::Move(direction) => game
            .move_player(agent_id, direction, now)
            .map(|(position, distance)| ActionOutcome::Moved { position, distance }),
        ActionRequest::PickPiece => game.pick_up_piece(agent_id, now).map(|_| ActionOutcome::PiecePicked),
        ActionRequest::PutPiece => game.put_piece(agent_id, now).map(ActionOutcome::PiecePut),
        ActionRequest::DestroyPiece => game
            .destroy_piece(agent_id, now)
            .map(|_| ActionOutcome::PieceDestroyed),
        ActionRequest::CheckPiece => game
            .check_piece(agent_id, now)
            .map(|is_valid| ActionOutcome::PieceChecked { is_valid }),
        ActionRequest::Discover => game.discover(agent_id, now).map(ActionOutcome::Discovered),
        ActionRequest::CommunicationRequest { target_id, data } => game
            .communication_request(agent_id, target_id, data, message_id, now)
            .map(|_| {
                outgoing.push((
                    target_id,
                    Packet::CommunicationRequest {
                        requester_id: agent_id,
                        timestamp: now,
                    },
                ));
                ActionOutcome::CommunicationRequested
            }),
        ActionRequest::CommunicationAgreement {
            requester_id,
            agreement,
            data,
        } => game
            .communication_agreement(agent_id, requester_id, agreement, data, now)
            .map(|exchange| {
                outgoing.push((
                    requester_id,
                    Packet::CommunicationResponse {
                        request_message_id: exchange.request_message_id,
                        responder_id: agent_id,
                        agreement: exchange.agreement,
                        data: exchange.responder_data,
                        timestamp: now,
                        wait_until: exchange.requester_wait_until,
                    },
                ));
                ActionOutcome::CommunicationAnswered {
                    requester_id,
                    data: exchange.requester_data,
                }
            }),
    };

    match &result {
        Err(err) if err.is_defect() => return Err(err.clone()),
        Err(err) => debug!("Agent {} request {} rejected: {}", agent_id, message_id, err),
        Ok(_) => {}
    }

    let wait_until = game.wait_until(agent_id)?;
    outgoing.insert(
        0,
        (
            agent_id,
            Packet::ActionResponse {
                message_id,
                timestamp: now,
                wait_until,
                result,
            },
        ),
    );
    Ok(outgoing)
}

/// Game master server: owns the authoritative state and serializes every
/// request through its single event loop
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    game_state: GameMasterState,
    rng: StdRng,
    started_at: Instant,
    spawn_interval: Duration,
    end_announced: bool,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(addr: &str, rules: GameRules) -> Result<Self, Box<dyn std::error::Error>> {
        let max_clients = 2 * rules.team_size;
        let spawn_interval = Duration::from_millis(rules.piece_spawn_interval_ms.max(1));
        let game_state = GameMasterState::new(rules)?;

        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Game master listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            game_state,
            rng: StdRng::from_entropy(),
            started_at: Instant::now(),
            spawn_interval,
            end_announced: false,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Milliseconds since the server started; the clock of every timestamp
    fn now(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    /// Spawns task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 65536];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }

                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to agent {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that reports agents whose connection went quiet
    async fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            let mut reported: HashSet<u32> = HashSet::new();

            loop {
                interval.tick().await;

                let silent: HashSet<u32> = {
                    let clients_guard = clients.read().await;
                    clients_guard.check_timeouts(CLIENT_SILENCE_WARNING).into_iter().collect()
                };

                for client_id in silent.difference(&reported) {
                    warn!(
                        "Agent {} silent for over {:?}, its player stays in the game",
                        client_id, CLIENT_SILENCE_WARNING
                    );
                }
                reported = silent;
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    async fn send_to_agent(&self, agent_id: u32, packet: Packet) {
        let addr = {
            let clients = self.clients.read().await;
            clients.addr_of(agent_id)
        };
        match addr {
            Some(addr) => self.send_packet(packet, addr),
            None => warn!("No connection for agent {}, dropping {:?}", agent_id, packet),
        }
    }

    fn broadcast_packet(&self, packet: Packet, exclude: Option<u32>) {
        if let Err(e) = self.game_tx.send(GameMessage::BroadcastPacket { packet, exclude }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Processes incoming packets and updates game state
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::JoinGame {
                client_version,
                team_id,
                wants_to_be_leader,
            } => {
                self.handle_join(addr, client_version, team_id, wants_to_be_leader)
                    .await;
            }

            Packet::Action { message_id, action } => {
                let agent_id = {
                    let mut clients = self.clients.write().await;
                    let sender = clients.find_client_by_addr(addr);
                    match sender {
                        Some(id) if clients.accept_message(id, message_id) => Some(id),
                        Some(id) => {
                            warn!("Agent {} resent message {}, ignoring", id, message_id);
                            None
                        }
                        None => {
                            warn!("Action from unknown address {}", addr);
                            None
                        }
                    }
                };

                if let Some(agent_id) = agent_id {
                    self.handle_action(agent_id, message_id, action).await;
                }
            }

            Packet::Disconnect => {
                let client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(client_id) = client_id {
                    let mut clients = self.clients.write().await;
                    clients.remove_client(&client_id);
                }
            }

            _ => {
                warn!("Unexpected packet type from agent at {}", addr);
            }
        }
    }

    async fn handle_join(&mut self, addr: SocketAddr, client_version: u32, team_id: u8, wants_to_be_leader: bool) {
        info!("Agent joining from {} (version: {})", addr, client_version);

        let result = if client_version != PROTOCOL_VERSION {
            Err(GameError::GameSetup(format!("Unsupported protocol version {}", client_version)))
        } else {
            let existing = {
                let clients = self.clients.read().await;
                clients.find_client_by_addr(addr)
            };
            match existing {
                Some(id) => Err(GameError::GameSetup(format!("Agent with Id {} is already connected", id))),
                None => self.register_agent(addr, team_id, wants_to_be_leader).await,
            }
        };

        if let Err(e) = &result {
            warn!("Join from {} rejected: {}", addr, e);
        }
        self.send_packet(Packet::JoinResponse { result }, addr);

        if self.game_state.is_ready_to_start() {
            self.start_game().await;
        }
    }

    async fn register_agent(&mut self, addr: SocketAddr, team_id: u8, wants_to_be_leader: bool) -> Result<u32, GameError> {
        let agent_id = {
            let mut clients = self.clients.write().await;
            clients
                .add_client(addr)
                .ok_or_else(|| GameError::GameSetup("Server full".to_string()))?
        };

        if let Err(e) = self.game_state.join_game(agent_id, team_id, wants_to_be_leader) {
            let mut clients = self.clients.write().await;
            clients.remove_client(&agent_id);
            return Err(e);
        }
        Ok(agent_id)
    }

    async fn start_game(&mut self) {
        let agent_rules = match self.game_state.start_game(&mut self.rng) {
            Ok(rules) => rules,
            Err(e) => {
                error!("Failed to start the game: {}", e);
                return;
            }
        };

        let timestamp = self.now();
        for (agent_id, rules) in agent_rules {
            debug!("Agent {} starts at ({}, {})", agent_id, rules.start.x, rules.start.y);
            self.send_to_agent(agent_id, Packet::StartGame { rules, timestamp })
                .await;
        }
    }

    async fn handle_action(&mut self, agent_id: u32, message_id: u64, action: ActionRequest) {
        let now = self.now();
        debug!("Agent {} requested {:?} (message {})", agent_id, action, message_id);

        match dispatch_action(&mut self.game_state, agent_id, message_id, action, now) {
            Ok(outgoing) => {
                for (target, packet) in outgoing {
                    self.send_to_agent(target, packet).await;
                }
            }
            Err(e) => error!("Dropping request {} of agent {}: {}", message_id, agent_id, e),
        }

        if self.game_state.game_ended && !self.end_announced {
            if let Some(winner) = self.game_state.winner {
                self.end_announced = true;
                info!("Announcing winner {:?}", winner);
                self.broadcast_packet(Packet::EndGame { winner, timestamp: now }, None);
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let mut spawn_interval = interval(self.spawn_interval);

        info!("Game master started, waiting for agents");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Game master shutting down");
                            break;
                        }
                    }
                },

                _ = spawn_interval.tick() => {
                    if self.game_state.game_started && !self.game_state.game_ended {
                        if let Some(position) = self.game_state.generate_piece(&mut self.rng) {
                            debug!("Piece spawned at ({}, {})", position.x, position.y);
                        }
                    }
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{MoveDirection, Team};

    fn test_rules() -> GameRules {
        GameRules {
            board_width: 8,
            board_height: 8,
            goal_area_height: 2,
            goal_count: 1,
            team_size: 2,
            initial_pieces: 0,
            base_time_penalty: 100,
            ..GameRules::default()
        }
    }

    fn started_game() -> GameMasterState {
        let mut game = GameMasterState::new(test_rules()).unwrap();
        for (id, team) in [(1, 0), (2, 0), (3, 1), (4, 1)] {
            game.join_game(id, team, id == 1 || id == 3).unwrap();
        }
        let mut rng = StdRng::seed_from_u64(9);
        game.start_game(&mut rng).unwrap();
        game
    }

    #[test]
    fn test_move_response_carries_wait_until() {
        let mut game = started_game();
        let outgoing = dispatch_action(&mut game, 1, 1, ActionRequest::Move(MoveDirection::Down), 500).unwrap();

        assert_eq!(outgoing.len(), 1);
        match &outgoing[0] {
            (
                1,
                Packet::ActionResponse {
                    message_id,
                    timestamp,
                    wait_until,
                    result: Ok(ActionOutcome::Moved { .. }),
                },
            ) => {
                assert_eq!(*message_id, 1);
                assert_eq!(*timestamp, 500);
                assert_eq!(*wait_until, 600);
            }
            other => panic!("Unexpected packet: {:?}", other),
        }
    }

    #[test]
    fn test_rejected_action_is_answered() {
        let mut game = started_game();
        let outgoing = dispatch_action(&mut game, 2, 4, ActionRequest::PutPiece, 0).unwrap();

        match &outgoing[0] {
            (2, Packet::ActionResponse { result: Err(GameError::PieceOperation(_)), .. }) => {}
            other => panic!("Unexpected packet: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_agent_is_not_answered() {
        let mut game = started_game();
        let result = dispatch_action(&mut game, 42, 1, ActionRequest::Discover, 0);
        assert_eq!(result.unwrap_err(), GameError::UnknownAgent(42));
    }

    #[test]
    fn test_communication_request_notifies_target() {
        let mut game = started_game();
        let outgoing = dispatch_action(
            &mut game,
            1,
            7,
            ActionRequest::CommunicationRequest {
                target_id: 2,
                data: vec![1, 2, 3],
            },
            50,
        )
        .unwrap();

        assert_eq!(outgoing.len(), 2);
        assert!(matches!(
            outgoing[0],
            (1, Packet::ActionResponse { result: Ok(ActionOutcome::CommunicationRequested), .. })
        ));
        assert!(matches!(
            outgoing[1],
            (2, Packet::CommunicationRequest { requester_id: 1, timestamp: 50 })
        ));
    }

    #[test]
    fn test_communication_agreement_routes_both_payloads() {
        let mut game = started_game();
        dispatch_action(
            &mut game,
            1,
            6,
            ActionRequest::CommunicationRequest { target_id: 2, data: vec![1] },
            0,
        )
        .unwrap();

        let outgoing = dispatch_action(
            &mut game,
            2,
            1,
            ActionRequest::CommunicationAgreement {
                requester_id: 1,
                agreement: true,
                data: vec![2],
            },
            10,
        )
        .unwrap();

        match &outgoing[0] {
            (
                2,
                Packet::ActionResponse {
                    result: Ok(ActionOutcome::CommunicationAnswered { requester_id, data }),
                    ..
                },
            ) => {
                assert_eq!(*requester_id, 1);
                assert_eq!(data.as_deref(), Some(&[1u8][..]));
            }
            other => panic!("Unexpected packet: {:?}", other),
        }
        match &outgoing[1] {
            (
                1,
                Packet::CommunicationResponse {
                    request_message_id,
                    responder_id,
                    agreement,
                    data,
                    ..
                },
            ) => {
                assert_eq!(*request_message_id, 6);
                assert_eq!(*responder_id, 2);
                assert!(*agreement);
                assert_eq!(data.as_deref(), Some(&[2u8][..]));
            }
            other => panic!("Unexpected packet: {:?}", other),
        }
    }

    #[test]
    fn test_teams_and_leaders_after_start() {
        let game = started_game();
        assert_eq!(game.players.leader_of(Team::Red), Some(1));
        assert_eq!(game.players.leader_of(Team::Blue), Some(3));
    }

    #[test]
    fn test_server_binds_ephemeral_port() {
        let port = tokio_test::block_on(async {
            let server = Server::new("127.0.0.1:0", test_rules()).await.unwrap();
            server.local_addr().unwrap().port()
        });
        assert_ne!(port, 0);
    }

    #[test]
    fn test_channel_communication() {
        let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();

        let msg = ServerMessage::PacketReceived {
            packet: Packet::Disconnect,
            addr,
        };
        assert!(tx.send(msg).is_ok());

        match rx.try_recv().unwrap() {
            ServerMessage::PacketReceived { packet: Packet::Disconnect, addr: a } => assert_eq!(a, addr),
            other => panic!("Unexpected message type: {:?}", other),
        }
    }
}
