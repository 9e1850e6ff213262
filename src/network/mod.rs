//! ## Network module
//!
//! Everything that crosses the wire, plus the loop that owns the request ledger.
//!
//! ## Sub-modules
//! - [peers]: UDP heartbeat transport producing [`PeerUpdate`]s
//! - [udp_broadcast]: UDP transport for [`NetworkMessage`](crate::world_view::NetworkMessage)s
//! - [gossip]: Merging received messages into the ledger
//! - [local_network]: The request-control loop
//!
//! ## Membership
//! [`PeerRoster`] is the node's current view of who is reachable. [`apply_peer_update`] folds a
//! [`PeerUpdate`] into the ledger and starts the departure grace period for lost peers.
//! [`check_departures`] releases the hall calls of peers that stayed away past
//! [`config::DEPARTURE_GRACE`].

pub mod gossip;
pub mod local_network;
pub mod peers;
pub mod udp_broadcast;

use std::collections::HashMap;

use tokio::time::Instant;

use crate::config;
use crate::print;
use crate::world_view::ledger::RequestLedger;

/// Membership change reported by the heartbeat receiver.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PeerUpdate {
    /// Every peer currently alive, sorted.
    pub peers: Vec<String>,
    /// Peer seen for the first time, if any.
    pub new: Option<String>,
    /// Peers that just timed out, sorted.
    pub lost: Vec<String>,
}

/// Peers currently believed reachable.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PeerRoster {
    /// Reachable peers, possibly including the local node.
    pub peers: Vec<String>,
}

impl PeerRoster {
    /// `true` if `id` is in the roster.
    pub fn contains(&self, id: &str) -> bool {
        self.peers.iter().any(|p| p == id)
    }

    /// Replaces the roster with the one in `update`.
    pub fn apply(&mut self, update: &PeerUpdate) {
        self.peers = update.peers.clone();
    }
}

/// Peers that have been lost but not yet declared departed.
#[derive(Debug, Default)]
pub struct DepartureTracker {
    lost_at: HashMap<String, Instant>,
}

impl DepartureTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the grace period for newly lost peers and cancels it for peers that are back.
    pub fn observe(&mut self, local_id: &str, update: &PeerUpdate, now: Instant) {
        for id in &update.lost {
            if id != local_id {
                self.lost_at.entry(id.clone()).or_insert(now);
            }
        }
        self.lost_at.retain(|id, _| !update.peers.contains(id));
    }

    /// Removes and returns the peers whose grace period has run out.
    pub fn expired(&mut self, now: Instant) -> Vec<String> {
        let mut gone: Vec<String> = self
            .lost_at
            .iter()
            .filter(|(_, at)| now.saturating_duration_since(**at) >= config::DEPARTURE_GRACE)
            .map(|(id, _)| id.clone())
            .collect();
        gone.sort();
        for id in &gone {
            self.lost_at.remove(id);
        }
        gone
    }

    /// `true` if `id` is within its grace period.
    pub fn is_pending(&self, id: &str) -> bool {
        self.lost_at.contains_key(id)
    }
}

/// Folds a membership change into the ledger.
///
/// ## Behavior
/// - The roster is replaced with `update.peers`.
/// - The local node becomes connected when it is reported `new`, and disconnected when it is in `lost`.
/// - Lost peers start their departure grace period.
pub fn apply_peer_update(ledger: &mut RequestLedger, departures: &mut DepartureTracker, update: &PeerUpdate, now: Instant) {
    ledger.roster.apply(update);

    let local_id = ledger.local_id().to_string();
    if update.new.as_deref() == Some(local_id.as_str()) {
        if !ledger.connected {
            print::ok(format!("{} is connected to the elevator network", local_id));
        }
        ledger.connected = true;
    }
    if update.lost.contains(&local_id) {
        print::warn(format!("{} lost its own heartbeat, treating itself as disconnected", local_id));
        ledger.connected = false;
    }
    if let Some(new) = update.new.as_ref().filter(|id| **id != local_id) {
        print::info(format!("Peer {} joined", new));
    }
    for lost in update.lost.iter().filter(|id| **id != local_id) {
        print::warn(format!("Peer {} lost", lost));
    }

    departures.observe(&local_id, update, now);
}

/// Releases the hall calls of every peer whose grace period ran out.
///
/// ## Returns
/// The departed peers. A non-empty result means an assignment run should happen now.
pub fn check_departures(ledger: &mut RequestLedger, departures: &mut DepartureTracker, now: Instant) -> Vec<String> {
    let departed: Vec<String> = departures
        .expired(now)
        .into_iter()
        .filter(|id| !ledger.roster.contains(id))
        .collect();

    for peer in &departed {
        print::warn(format!("Peer {} departed", peer));
        ledger.release_departed(peer);
    }
    departed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elevio::ButtonType;
    use crate::world_view::request::{RequestRecord, RequestState};
    use crate::world_view::ElevatorInfo;
    use std::time::Duration;

    fn update(peers: &[&str], new: Option<&str>, lost: &[&str]) -> PeerUpdate {
        PeerUpdate {
            peers: peers.iter().map(|p| p.to_string()).collect(),
            new: new.map(str::to_string),
            lost: lost.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn connected_flag_follows_own_join_and_loss() {
        let mut ledger = RequestLedger::new("a", None);
        let mut departures = DepartureTracker::new();
        let now = Instant::now();

        apply_peer_update(&mut ledger, &mut departures, &update(&["a"], Some("a"), &[]), now);
        assert!(ledger.connected);

        apply_peer_update(&mut ledger, &mut departures, &update(&["a", "b"], Some("b"), &[]), now);
        assert!(ledger.connected);
        assert!(ledger.roster.contains("b"));

        apply_peer_update(&mut ledger, &mut departures, &update(&["b"], None, &["a"]), now);
        assert!(!ledger.connected);
        assert!(!departures.is_pending("a"));
    }

    #[test]
    fn returning_peer_cancels_departure() {
        let mut departures = DepartureTracker::new();
        let t0 = Instant::now();
        departures.observe("a", &update(&["a"], None, &["b"]), t0);
        assert!(departures.is_pending("b"));

        departures.observe("a", &update(&["a", "b"], Some("b"), &[]), t0 + Duration::from_secs(1));
        assert!(!departures.is_pending("b"));
        assert!(departures.expired(t0 + Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn departed_peer_hands_back_its_hall_calls() {
        let mut ledger = RequestLedger::new("a", None);
        let mut departures = DepartureTracker::new();
        let t0 = Instant::now();
        apply_peer_update(&mut ledger, &mut departures, &update(&["a", "b"], Some("a"), &[]), t0);

        // b owns hall up at floor 2 and told everybody.
        ledger.hall[2][0] = RequestRecord { state: RequestState::Assigned, count: 4, aware_list: vec!["b".into(), "a".into()] };
        let mut msg = ledger.build_message(None);
        msg.sender_id = "b".into();
        ledger.record_peer_claims(&msg);
        ledger.elevators.insert("b".into(), ElevatorInfo { available: true, ..Default::default() });

        apply_peer_update(&mut ledger, &mut departures, &update(&["a"], None, &["b"]), t0);
        assert!(check_departures(&mut ledger, &mut departures, t0 + Duration::from_secs(1)).is_empty());
        assert_eq!(ledger.hall[2][0].state, RequestState::Assigned);

        let departed = check_departures(&mut ledger, &mut departures, t0 + config::DEPARTURE_GRACE);
        assert_eq!(departed, vec!["b".to_string()]);
        assert_eq!(
            ledger.hall[2][0],
            RequestRecord { state: RequestState::Unassigned, count: 5, aware_list: vec!["a".into()] }
        );
        assert!(!ledger.elevators["b"].available);
        assert!(!ledger.is_sole_assigned_to_local(2, ButtonType::HallUp));

        // Declared once only.
        assert!(check_departures(&mut ledger, &mut departures, t0 + Duration::from_secs(60)).is_empty());
    }
}
