//! Two-phase communication handshake between teammates
//!
//! Scheme:
//! 1. requester -> game master: payload is stored in the slot of the ordered
//!    pair (requester, target); the target is told who wants to talk.
//! 2. target -> game master: agreement or refusal plus its own payload.
//!    On agreement both payloads are swapped and both agents are delayed.
//!
//! A slot holds at most one unanswered request. A request from the team
//! leader locks the target (`pending_leader_communication`) until it agrees.

use crate::players::PlayerRegistry;
use log::debug;
use shared::GameError;
use std::collections::HashMap;

/// Payload waiting in a slot for the target's answer
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCommunication {
    pub data: Vec<u8>,
    pub message_id: u64,
}

/// Result of a valid answer, routed back to both participants
#[derive(Debug, Clone, PartialEq)]
pub struct CommunicationExchange {
    pub requester_id: u32,
    pub responder_id: u32,
    pub agreement: bool,
    /// Message id of the original request
    pub request_message_id: u64,
    /// Requester's payload, handed to the responder on agreement
    pub requester_data: Option<Vec<u8>>,
    /// Responder's payload, forwarded to the requester on agreement
    pub responder_data: Option<Vec<u8>>,
    pub requester_wait_until: u64,
    pub responder_wait_until: u64,
}

#[derive(Debug, Default)]
pub struct CommunicationCoordinator {
    slots: HashMap<(u32, u32), PendingCommunication>,
}

impl CommunicationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self, sender_id: u32, target_id: u32) -> bool {
        self.slots.contains_key(&(sender_id, target_id))
    }

    /// Stores a payload for the ordered pair. Fails while an older one is unconsumed.
    pub fn save_communication_data(
        &mut self,
        sender_id: u32,
        target_id: u32,
        data: Vec<u8>,
        message_id: u64,
    ) -> Result<(), GameError> {
        if self.is_pending(sender_id, target_id) {
            return Err(GameError::CommunicationInProgress { sender_id, target_id });
        }
        self.slots
            .insert((sender_id, target_id), PendingCommunication { data, message_id });
        Ok(())
    }

    /// Takes the stored payload out of the slot, leaving it empty.
    pub fn get_communication_data(
        &mut self,
        sender_id: u32,
        target_id: u32,
    ) -> Result<PendingCommunication, GameError> {
        self.slots
            .remove(&(sender_id, target_id))
            .ok_or(GameError::Communication { sender_id, target_id })
    }

    /// Phase one: validates the requester and parks its payload.
    pub fn request(
        &mut self,
        players: &mut PlayerRegistry,
        sender_id: u32,
        target_id: u32,
        data: Vec<u8>,
        message_id: u64,
        now: u64,
    ) -> Result<(), GameError> {
        let sender = players.get(sender_id)?;
        let target = players.get(target_id)?;
        sender.check_eligibility(now)?;

        if sender_id == target_id || sender.team != target.team {
            return Err(GameError::Communication { sender_id, target_id });
        }

        let sender_is_leader = sender.is_leader;
        self.save_communication_data(sender_id, target_id, data, message_id)?;

        if sender_is_leader {
            players.get_mut(target_id)?.pending_leader_communication = true;
            debug!("Agent {} has now pending leader communication!", target_id);
        }
        Ok(())
    }

    /// Rejects answers that would bypass or decline a pending leader request.
    pub fn verify_leader_communication_state(
        players: &PlayerRegistry,
        requester_id: u32,
        responder_id: u32,
        agreement: bool,
    ) -> Result<(), GameError> {
        let requester = players.get(requester_id)?;
        let responder = players.get(responder_id)?;

        if responder.pending_leader_communication && !requester.is_leader {
            return Err(GameError::PendingLeaderCommunication);
        }
        if responder.pending_leader_communication && requester.is_leader && !agreement {
            return Err(GameError::PendingLeaderCommunication);
        }
        Ok(())
    }

    /// Phase two: consumes the slot and, on agreement, swaps payloads and
    /// delays both partners by `delay` ms on top of their remaining penalty.
    pub fn respond(
        &mut self,
        players: &mut PlayerRegistry,
        requester_id: u32,
        responder_id: u32,
        agreement: bool,
        data: Vec<u8>,
        delay: u64,
        now: u64,
    ) -> Result<CommunicationExchange, GameError> {
        players.get(responder_id)?.check_delay(now)?;
        Self::verify_leader_communication_state(players, requester_id, responder_id, agreement)?;

        let pending = self.get_communication_data(requester_id, responder_id)?;

        let (requester_data, responder_data) = if agreement {
            if players.get(requester_id)?.is_leader {
                players.get_mut(responder_id)?.pending_leader_communication = false;
                debug!("Agent {} no longer has pending leader communication!", responder_id);
            }
            players.add_delay(responder_id, now, delay)?;
            players.add_delay(requester_id, now, delay)?;
            (Some(pending.data), Some(data))
        } else {
            debug!("Agent {} refused to communicate with agent {}", responder_id, requester_id);
            (None, None)
        };

        Ok(CommunicationExchange {
            requester_id,
            responder_id,
            agreement,
            request_message_id: pending.message_id,
            requester_data,
            responder_data,
            requester_wait_until: players.get(requester_id)?.wait_until(),
            responder_wait_until: players.get(responder_id)?.wait_until(),
        })
    }
}
