use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::clock::SharedTickSource;
use crate::domain::membership::bitmap::MemberBitmap;
use crate::domain::membership::version_retry::{RetryPolicy, RetryState, VersionRetry};
use crate::error::Result;

/// Version/membership proposal exchanged between peers. `members` is a base64 member bitmap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipProposal {
    pub from: usize,
    pub version: u64,
    pub members: String,
}

/// Result of negotiation that a scheduling pass consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipVerdict {
    pub version: u64,
    pub members: MemberBitmap,
}

impl MembershipVerdict {
    pub fn new(version: u64, members: MemberBitmap) -> Self {
        MembershipVerdict { version, members }
    }

    pub fn contains(&self, slot: usize) -> bool {
        self.members.contains(slot)
    }
}

/// Negotiates membership for the local node with every peer slot it expects to hear from.
#[derive(Debug)]
pub struct Negotiator {
    local_slot: usize,
    max_nodes: usize,
    clock: SharedTickSource,
    policy: RetryPolicy,
    version: u64,
    members: MemberBitmap,
    peers: BTreeMap<usize, VersionRetry>,
}

impl Negotiator {
    pub fn new(local_slot: usize, max_nodes: usize, clock: SharedTickSource, policy: RetryPolicy) -> Result<Self> {
        let members = MemberBitmap::from_slots(max_nodes, [local_slot])?;
        Ok(Negotiator { local_slot, max_nodes, clock, policy, version: 0, members, peers: BTreeMap::new() })
    }

    pub fn local_slot(&self) -> usize {
        self.local_slot
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn peer_state(&self, slot: usize) -> Option<RetryState> {
        self.peers.get(&slot).map(VersionRetry::state)
    }

    /// Starts a new negotiation round with the given peers and returns the proposal to broadcast.
    pub fn start_round(&mut self, peers: impl IntoIterator<Item = usize>) -> Result<MembershipProposal> {
        self.version += 1;
        self.peers.clear();

        let mut members = MemberBitmap::from_slots(self.max_nodes, [self.local_slot])?;
        for slot in peers {
            if slot == self.local_slot {
                continue;
            }
            members.insert(slot)?;
            self.peers.insert(slot, VersionRetry::new(self.clock.clone(), self.policy));
        }
        self.members = members;

        log::info!("Membership round {} started with {} peers", self.version, self.peers.len());
        Ok(self.proposal())
    }

    /// The proposal currently on offer, e.g. to resend to peers returned by [`Negotiator::on_tick`].
    pub fn proposal(&self) -> MembershipProposal {
        MembershipProposal { from: self.local_slot, version: self.version, members: self.members.encode() }
    }

    /// Handles a proposal from a peer: the sender is confirmed, everyone else still pending gets more patience.
    pub fn on_proposal(&mut self, proposal: &MembershipProposal) -> Result<()> {
        if proposal.from == self.local_slot {
            return Ok(());
        }
        let proposed = MemberBitmap::decode(&proposal.members, self.max_nodes)?;

        let sender =
            self.peers.entry(proposal.from).or_insert_with(|| VersionRetry::new(self.clock.clone(), self.policy));
        sender.confirm();

        for (slot, tracker) in self.peers.iter_mut() {
            if *slot != proposal.from {
                tracker.note_activity();
            }
        }

        if proposal.version > self.version {
            log::debug!("Adopting membership version {} from slot {}", proposal.version, proposal.from);
            self.version = proposal.version;
            self.members = proposed;
            self.members.insert(self.local_slot)?;
        } else if proposal.version == self.version {
            self.members = self.members.union(&proposed);
        }
        self.members.insert(proposal.from)?;
        Ok(())
    }

    /// Advances every pending peer's timer; returns the peer slots the proposal must be resent to.
    pub fn on_tick(&mut self) -> Vec<usize> {
        let mut resend = Vec::new();
        for (slot, tracker) in self.peers.iter_mut() {
            if tracker.retry() {
                resend.push(*slot);
            } else if tracker.state() == RetryState::GaveUp && self.members.remove(*slot) {
                log::warn!("No answer from slot {} after {} tries, dropping it from membership", slot, self.policy.max_tries);
            }
        }
        resend
    }

    /// External confirmation: stop retrying every peer that is still pending.
    pub fn confirm_all(&mut self) {
        for tracker in self.peers.values_mut().filter(|t| t.is_pending()) {
            tracker.confirm();
        }
    }

    /// True once no peer is waiting for an answer.
    pub fn is_settled(&self) -> bool {
        self.peers.values().all(|t| !t.is_pending())
    }

    /// Local node plus every peer that has not been given up on.
    pub fn verdict(&self) -> MembershipVerdict {
        let mut members = MemberBitmap::new(self.max_nodes);
        for slot in self.members.iter() {
            let active = slot == self.local_slot || self.peers.get(&slot).is_none_or(VersionRetry::is_active);
            if active {
                // slots come from a bitmap of the same size
                let _ = members.insert(slot);
            }
        }
        MembershipVerdict::new(self.version, members)
    }
}
