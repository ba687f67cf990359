//! Agent connection roster for the game master
//!
//! This module keeps the network-facing side of every agent:
//! - address <-> agent id mapping used to route responses
//! - per-agent message id tracking so a retransmitted request is never
//!   applied twice
//! - last activity tracking for reporting silent agents
//!
//! Game-side player records live in [`crate::players`]; a player is never
//! removed from the game when its connection goes quiet.

use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A connected agent process
#[derive(Debug)]
pub struct Client {
    /// Agent id assigned by the server
    pub id: u32,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this agent
    pub last_seen: Instant,
    /// Highest action message id already handled
    pub last_message_id: Option<u64>,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            last_message_id: None,
        }
    }

    /// Records activity and decides whether `message_id` is new.
    ///
    /// Message ids grow per agent, so anything at or below the last handled
    /// id is a duplicate and must not be processed again.
    pub fn accept_message(&mut self, message_id: u64) -> bool {
        self.last_seen = Instant::now();
        match self.last_message_id {
            Some(last) if message_id <= last => false,
            _ => {
                self.last_message_id = Some(message_id);
                true
            }
        }
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Tracks every agent connection and hands out agent ids
pub struct ClientManager {
    clients: HashMap<u32, Client>,
    next_client_id: u32,
    max_clients: usize,
}

impl ClientManager {
    /// Agent ids start from 1.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Registers a new connection. Returns None when the server is full.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Agent {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));

        Some(client_id)
    }

    pub fn remove_client(&mut self, client_id: &u32) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!("Agent {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn addr_of(&self, client_id: u32) -> Option<SocketAddr> {
        self.clients.get(&client_id).map(|client| client.addr)
    }

    /// Returns false for unknown agents and already handled message ids.
    pub fn accept_message(&mut self, client_id: u32, message_id: u64) -> bool {
        self.clients
            .get_mut(&client_id)
            .map(|client| client.accept_message(message_id))
            .unwrap_or(false)
    }

    /// Agents silent for longer than `timeout`. They stay registered.
    pub fn check_timeouts(&self, timeout: Duration) -> Vec<u32> {
        self.clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn get_client_addrs(&self) -> Vec<(u32, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    #[test]
    fn test_client_creation() {
        let client = Client::new(1, test_addr());

        assert_eq!(client.id, 1);
        assert_eq!(client.addr, test_addr());
        assert_eq!(client.last_message_id, None);
    }

    #[test]
    fn test_client_rejects_replayed_messages() {
        let mut client = Client::new(1, test_addr());

        assert!(client.accept_message(1));
        assert!(client.accept_message(2));
        assert!(!client.accept_message(2));
        assert!(!client.accept_message(1));
        assert!(client.accept_message(7));
        assert_eq!(client.last_message_id, Some(7));
    }

    #[test]
    fn test_client_timeout() {
        let mut client = Client::new(1, test_addr());

        assert!(!client.is_timed_out(Duration::from_secs(1)));

        client.last_seen = Instant::now() - Duration::from_secs(2);

        assert!(client.is_timed_out(Duration::from_secs(1)));
    }

    #[test]
    fn test_add_multiple_clients() {
        let mut manager = ClientManager::new(3);

        assert_eq!(manager.add_client(test_addr()), Some(1));
        assert_eq!(manager.add_client(test_addr2()), Some(2));
        assert_eq!(manager.len(), 2);
        assert!(!manager.is_empty());
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1);

        assert!(manager.add_client(test_addr()).is_some());
        assert!(manager.add_client(test_addr2()).is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_remove_client() {
        let mut manager = ClientManager::new(2);
        let client_id = manager.add_client(test_addr()).unwrap();

        assert!(manager.remove_client(&client_id));
        assert!(!manager.remove_client(&client_id));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_find_client_by_addr() {
        let mut manager = ClientManager::new(2);
        let client_id1 = manager.add_client(test_addr()).unwrap();
        let client_id2 = manager.add_client(test_addr2()).unwrap();

        assert_eq!(manager.find_client_by_addr(test_addr()), Some(client_id1));
        assert_eq!(manager.addr_of(client_id2), Some(test_addr2()));

        let unknown_addr: SocketAddr = "192.168.1.1:9999".parse().unwrap();
        assert_eq!(manager.find_client_by_addr(unknown_addr), None);
    }

    #[test]
    fn test_accept_message_for_unknown_agent() {
        let mut manager = ClientManager::new(2);
        assert!(!manager.accept_message(999, 1));
    }

    #[test]
    fn test_check_timeouts_keeps_agents() {
        let mut manager = ClientManager::new(2);
        let client_id = manager.add_client(test_addr()).unwrap();
        manager.clients.get_mut(&client_id).unwrap().last_seen =
            Instant::now() - Duration::from_secs(10);

        assert_eq!(manager.check_timeouts(Duration::from_secs(5)), vec![client_id]);
        assert_eq!(manager.len(), 1);
    }
}
