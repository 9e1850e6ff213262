//! # Gossip merge
//!
//! Folds a peer's [`NetworkMessage`] into the local [`RequestLedger`].
//!
//! Every record is versioned by `(count, state)`. A higher count always wins. For equal counts the
//! state precedence is `Completed < Unassigned < Assigned`, and an equal version only brings news
//! when it names aware nodes the local record does not have. Merging is commutative and idempotent,
//! so lost, duplicated and reordered messages all converge to the same ledger.

use crate::config;
use crate::elevio::ButtonType;
use crate::print;
use crate::world_view::ledger::RequestLedger;
use crate::world_view::request::{RequestRecord, RequestState};
use crate::world_view::NetworkMessage;

/// What a merged message changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Hall cells whose record was replaced or grew.
    pub hall_changed: Vec<(u8, ButtonType)>,
    /// The local cab table changed and must be persisted.
    pub local_cabs_changed: bool,
}

/// Decides whether `incoming` carries newer information than `local`.
pub fn can_accept_request(local: &RequestRecord, incoming: &RequestRecord) -> bool {
    if incoming.count != local.count {
        return incoming.count > local.count;
    }
    if incoming.state == local.state && incoming.aware_subset_of(local) {
        return false;
    }
    match (local.state, incoming.state) {
        (RequestState::Completed, _) => true,
        (RequestState::Unassigned, RequestState::Completed) => false,
        (RequestState::Unassigned, _) => true,
        (RequestState::Assigned, RequestState::Assigned) => true,
        (RequestState::Assigned, _) => false,
    }
}

/// Merges `incoming` into `local` and marks `local_id` aware of the result.
///
/// The same version keeps the local aware order and appends the new names. A different version
/// replaces the record.
///
/// ## Returns
/// `true` if the record was accepted.
pub fn merge_record(local: &mut RequestRecord, incoming: &RequestRecord, local_id: &str) -> bool {
    if !can_accept_request(local, incoming) {
        return false;
    }
    if local.same_version(incoming) {
        for id in &incoming.aware_list {
            local.add_aware(id);
        }
    } else {
        *local = incoming.clone();
    }
    local.add_aware(local_id);
    true
}

/// Merges a received message into the ledger.
///
/// ## Behavior
/// - Messages from the local node, and every message while disconnected, are ignored.
/// - The sender's status report overwrites the stored one.
/// - The sender's own hall claims are recorded for departure handling and the commit check.
/// - Hall records are merged cell by cell, and every cab table in the message is merged floor by floor.
///
/// ## Returns
/// `None` if the message was ignored.
pub fn merge_message(ledger: &mut RequestLedger, msg: &NetworkMessage) -> Option<MergeOutcome> {
    if msg.sender_id == ledger.local_id() || !ledger.connected {
        return None;
    }
    if let Some(note) = &msg.debug_log {
        print::peer_log(format!("{}: {}", msg.sender_id, note));
    }

    ledger.elevators.insert(msg.sender_id.clone(), msg.elevator_info());
    ledger.record_peer_claims(msg);

    let local_id = ledger.local_id().to_string();
    let mut outcome = MergeOutcome::default();

    for floor in 0..config::N_FLOORS {
        for button in [ButtonType::HallUp, ButtonType::HallDown] {
            let incoming = &msg.hall_requests[floor][button.index()];
            if merge_record(&mut ledger.hall[floor][button.index()], incoming, &local_id) {
                outcome.hall_changed.push((floor as u8, button));
            }
        }
    }

    for (owner, incoming) in &msg.cab_requests {
        let table = ledger.cabs.entry(owner.clone()).or_default();
        let mut changed = false;
        for (local, incoming) in table.iter_mut().zip(incoming.iter()) {
            changed |= merge_record(local, incoming, &local_id);
        }
        if changed && *owner == local_id {
            outcome.local_cabs_changed = true;
        }
    }

    Some(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::PeerUpdate;
    use RequestState::{Assigned, Completed, Unassigned};

    fn rec(state: RequestState, count: u32, aware: &[&str]) -> RequestRecord {
        RequestRecord { state, count, aware_list: aware.iter().map(|a| a.to_string()).collect() }
    }

    fn connected(id: &str) -> RequestLedger {
        let mut ledger = RequestLedger::new(id, None);
        ledger.connected = true;
        ledger.roster.apply(&PeerUpdate { peers: vec!["a".into(), "b".into(), "c".into()], new: None, lost: Vec::new() });
        ledger
    }

    fn sorted(mut v: Vec<String>) -> Vec<String> {
        v.sort();
        v
    }

    #[test]
    fn count_decides_before_state() {
        assert!(!can_accept_request(&rec(Completed, 3, &["a"]), &rec(Assigned, 2, &["b"])));
        assert!(can_accept_request(&rec(Assigned, 3, &["a"]), &rec(Completed, 4, &["b"])));
    }

    #[test]
    fn equal_count_follows_state_precedence() {
        let cases = [
            (Unassigned, Unassigned, true),
            (Unassigned, Assigned, true),
            (Unassigned, Completed, false),
            (Assigned, Unassigned, false),
            (Assigned, Assigned, true),
            (Assigned, Completed, false),
            (Completed, Unassigned, true),
            (Completed, Assigned, true),
            (Completed, Completed, true),
        ];
        for (local, incoming, accept) in cases {
            assert_eq!(
                can_accept_request(&rec(local, 5, &["a"]), &rec(incoming, 5, &["b"])),
                accept,
                "local {:?} incoming {:?}",
                local,
                incoming
            );
        }
    }

    #[test]
    fn same_version_without_new_names_is_rejected() {
        let local = rec(Unassigned, 2, &["a", "b"]);
        assert!(!can_accept_request(&local, &rec(Unassigned, 2, &["b"])));
        assert!(!can_accept_request(&local, &rec(Unassigned, 2, &[])));
        assert!(can_accept_request(&local, &rec(Unassigned, 2, &["c"])));
    }

    #[test]
    fn merge_grows_or_replaces_and_adds_self() {
        let mut local = rec(Unassigned, 1, &["a"]);
        assert!(merge_record(&mut local, &rec(Unassigned, 1, &["c", "b"]), "a"));
        assert_eq!(local, rec(Unassigned, 1, &["a", "c", "b"]));

        assert!(merge_record(&mut local, &rec(Assigned, 1, &["b"]), "a"));
        assert_eq!(local, rec(Assigned, 1, &["b", "a"]));

        // Merging the same record again changes nothing.
        assert!(!merge_record(&mut local, &rec(Assigned, 1, &["b"]), "a"));
        assert_eq!(local, rec(Assigned, 1, &["b", "a"]));
    }

    #[test]
    fn merge_order_does_not_matter() {
        let incoming = [
            rec(Unassigned, 1, &["b"]),
            rec(Unassigned, 1, &["c"]),
            rec(Assigned, 1, &["b"]),
            rec(Completed, 1, &["c"]),
            rec(Assigned, 1, &["c"]),
            rec(Unassigned, 0, &["b"]),
            rec(Assigned, 1, &["b"]),
        ];

        let mut results = Vec::new();
        let mut order: Vec<usize> = (0..incoming.len()).collect();
        // Every rotation forwards and backwards.
        for _ in 0..incoming.len() {
            order.rotate_left(1);
            for reversed in [false, true] {
                let mut local = RequestRecord::default();
                let seq: Vec<usize> = if reversed { order.iter().rev().copied().collect() } else { order.clone() };
                for i in seq {
                    merge_record(&mut local, &incoming[i], "a");
                }
                results.push((local.state, local.count, sorted(local.aware_list)));
            }
        }

        let expected = (Assigned, 1, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        assert!(results.iter().all(|r| *r == expected), "{:?}", results);
    }

    #[test]
    fn own_and_disconnected_messages_are_ignored() {
        let mut ledger = connected("a");
        let mut own = ledger.build_message(None);
        own.hall_requests[0][0] = rec(Assigned, 9, &["a"]);
        assert!(merge_message(&mut ledger, &own).is_none());

        let mut peer = connected("b").build_message(None);
        peer.hall_requests[0][0] = rec(Assigned, 9, &["b"]);
        ledger.connected = false;
        assert!(merge_message(&mut ledger, &peer).is_none());
        assert_eq!(ledger.hall[0][0], RequestRecord::default());
    }

    #[test]
    fn peer_message_updates_hall_status_and_claims() {
        let mut ledger = connected("a");
        let mut peer_ledger = connected("b");
        peer_ledger.hall[1][1] = rec(Assigned, 2, &["b"]);
        peer_ledger.update_local_info(crate::world_view::ElevatorInfo {
            available: true,
            current_floor: Some(3),
            ..Default::default()
        });
        let msg = peer_ledger.build_message(Some("b assigned 1/1".into()));

        let outcome = merge_message(&mut ledger, &msg).unwrap();
        assert_eq!(outcome.hall_changed, vec![(1, ButtonType::HallDown)]);
        assert_eq!(ledger.hall[1][1], rec(Assigned, 2, &["b", "a"]));
        assert_eq!(ledger.elevators["b"].current_floor, Some(3));
        assert!(ledger.claimed_by_peer(1, ButtonType::HallDown));
        assert!(!ledger.is_sole_assigned_to_local(1, ButtonType::HallDown));
    }

    #[test]
    fn restarted_node_recovers_cab_calls_from_peer() {
        let mut before_crash = connected("a");
        before_crash.cabs.get_mut("a").unwrap()[2] = rec(Assigned, 1, &["a"]);

        // b learned about a's cab call earlier.
        let mut b = connected("b");
        merge_message(&mut b, &before_crash.build_message(None)).unwrap();
        assert_eq!(b.cabs["a"][2].state, Assigned);

        let mut restarted = connected("a");
        let outcome = merge_message(&mut restarted, &b.build_message(None)).unwrap();
        assert!(outcome.local_cabs_changed);
        assert_eq!(restarted.local_cabs()[2].state, Assigned);
        assert!(restarted.local_cabs()[2].is_aware("a"));
    }
}
