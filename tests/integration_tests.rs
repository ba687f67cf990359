//! Integration tests for the game master and agent components
//!
//! These tests drive a real game master over UDP sockets and check the
//! protocol end to end: joining, game start, answered actions, duplicate
//! filtering and time penalties.

use bincode::{deserialize, serialize};
use server::network::Server;
use shared::{ActionOutcome, ActionRequest, GameError, GameRules, MoveDirection, Packet, Team, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

fn duel_rules() -> GameRules {
    GameRules {
        board_width: 6,
        board_height: 8,
        goal_area_height: 2,
        goal_count: 1,
        team_size: 1,
        max_pieces_on_board: 4,
        initial_pieces: 2,
        piece_spawn_interval_ms: 60_000,
        base_time_penalty: 500,
        ..GameRules::default()
    }
}

async fn start_server(rules: GameRules) -> SocketAddr {
    let mut server = Server::new("127.0.0.1:0", rules).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    addr
}

async fn send(socket: &UdpSocket, addr: SocketAddr, packet: &Packet) {
    socket.send_to(&serialize(packet).unwrap(), addr).await.unwrap();
}

async fn recv(socket: &UdpSocket) -> Packet {
    let mut buf = [0u8; 65536];
    let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .expect("Timed out waiting for packet")
        .unwrap();
    deserialize(&buf[..len]).unwrap()
}

async fn join(addr: SocketAddr, team: Team) -> (UdpSocket, Result<u32, GameError>) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    send(
        &socket,
        addr,
        &Packet::JoinGame {
            client_version: PROTOCOL_VERSION,
            team_id: team.id(),
            wants_to_be_leader: false,
        },
    )
    .await;

    match recv(&socket).await {
        Packet::JoinResponse { result } => (socket, result),
        other => panic!("Expected join response, got {:?}", other),
    }
}

/// WIRE PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    #[test]
    fn error_results_survive_serialization() {
        let packet = Packet::ActionResponse {
            message_id: 9,
            timestamp: 100,
            wait_until: 400,
            result: Err(GameError::CommunicationInProgress {
                sender_id: 1,
                target_id: 2,
            }),
        };

        match deserialize::<Packet>(&serialize(&packet).unwrap()).unwrap() {
            Packet::ActionResponse { message_id, result, .. } => {
                assert_eq!(message_id, 9);
                assert_eq!(
                    result,
                    Err(GameError::CommunicationInProgress {
                        sender_id: 1,
                        target_id: 2
                    })
                );
            }
            other => panic!("Unexpected packet: {:?}", other),
        }
    }

    #[test]
    fn malformed_packet_handling() {
        let malformed_data = vec![
            vec![],
            vec![0xFF; 10],
            vec![0x00, 0x01, 0x02],
            b"not a packet".to_vec(),
        ];

        for data in malformed_data {
            assert!(deserialize::<Packet>(&data).is_err());
        }
    }

    #[test]
    fn invalid_rules_rejected_at_startup() {
        let rules = GameRules {
            goal_area_height: 4,
            board_height: 8,
            ..GameRules::default()
        };
        let result = tokio_test::block_on(Server::new("127.0.0.1:0", rules));
        assert!(result.is_err());
    }
}

/// GAME MASTER ROUND TRIPS
mod server_tests {
    use super::*;

    #[tokio::test]
    async fn join_start_and_act() {
        let addr = start_server(duel_rules()).await;

        let (red, red_id) = join(addr, Team::Red).await;
        let red_id = red_id.unwrap();
        let (blue, blue_id) = join(addr, Team::Blue).await;
        let blue_id = blue_id.unwrap();
        assert_ne!(red_id, blue_id);

        let red_rules = match recv(&red).await {
            Packet::StartGame { rules, .. } => rules,
            other => panic!("Expected game start, got {:?}", other),
        };
        assert_eq!(red_rules.agent_id, red_id);
        assert_eq!(red_rules.team, Team::Red);
        // the only agent of a team always leads it
        assert_eq!(red_rules.leader_id, red_id);
        assert!(red_rules.rules.is_in_goal_area(red_rules.start, Team::Red));

        match recv(&blue).await {
            Packet::StartGame { rules, .. } => assert_eq!(rules.team, Team::Blue),
            other => panic!("Expected game start, got {:?}", other),
        }

        send(
            &red,
            addr,
            &Packet::Action {
                message_id: 1,
                action: ActionRequest::Discover,
            },
        )
        .await;

        let first_wait = match recv(&red).await {
            Packet::ActionResponse {
                message_id,
                timestamp,
                wait_until,
                result: Ok(ActionOutcome::Discovered(discovery)),
            } => {
                assert_eq!(message_id, 1);
                assert_eq!(wait_until, timestamp + 1000);
                // two pieces are on the board, so every field has a distance
                assert!(!discovery.fields.is_empty());
                wait_until
            }
            other => panic!("Expected discovery, got {:?}", other),
        };

        // a replayed message id is dropped, the fresh one is answered
        let replay = Packet::Action {
            message_id: 1,
            action: ActionRequest::Move(MoveDirection::Down),
        };
        send(&red, addr, &replay).await;
        send(
            &red,
            addr,
            &Packet::Action {
                message_id: 2,
                action: ActionRequest::Move(MoveDirection::Down),
            },
        )
        .await;

        match recv(&red).await {
            Packet::ActionResponse {
                message_id,
                wait_until,
                result,
                ..
            } => {
                assert_eq!(message_id, 2);
                assert_eq!(result, Err(GameError::Delay { wait_until: first_wait }));
                assert_eq!(wait_until, first_wait);
            }
            other => panic!("Expected delay error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn join_rejections() {
        let addr = start_server(duel_rules()).await;

        let (_red, red_id) = join(addr, Team::Red).await;
        assert!(red_id.is_ok());

        let (_second_red, result) = join(addr, Team::Red).await;
        assert!(matches!(result, Err(GameError::GameSetup(_))));

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        send(
            &socket,
            addr,
            &Packet::JoinGame {
                client_version: PROTOCOL_VERSION + 1,
                team_id: Team::Blue.id(),
                wants_to_be_leader: true,
            },
        )
        .await;
        assert!(matches!(
            recv(&socket).await,
            Packet::JoinResponse {
                result: Err(GameError::GameSetup(_))
            }
        ));
    }

    #[tokio::test]
    async fn communication_across_teams_rejected() {
        let addr = start_server(duel_rules()).await;
        let (red, red_id) = join(addr, Team::Red).await;
        let (blue, blue_id) = join(addr, Team::Blue).await;
        let (_red_id, blue_id) = (red_id.unwrap(), blue_id.unwrap());
        recv(&red).await;
        recv(&blue).await;

        send(
            &red,
            addr,
            &Packet::Action {
                message_id: 1,
                action: ActionRequest::CommunicationRequest {
                    target_id: blue_id,
                    data: vec![1, 2, 3],
                },
            },
        )
        .await;

        match recv(&red).await {
            Packet::ActionResponse { result, .. } => {
                assert!(matches!(result, Err(GameError::Communication { .. })))
            }
            other => panic!("Expected communication error, got {:?}", other),
        }
    }
}
