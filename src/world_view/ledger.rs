//! # Request ledger
//!
//! The node's replicated belief about every request: the hall table, the cab tables of every
//! known elevator, the latest status report of every elevator and the current peer roster.
//!
//! The ledger is owned by the request-control loop and only ever mutated from there.
//! Gossip merging lives in [`crate::network::gossip`], the demotion sweep in
//! [`crate::manager::conflict`] and the solver round in [`crate::manager`].
//!
//! ## Ownership
//! The first entry of an Assigned record's aware list is the node that committed it. Merging
//! keeps the local order and appends newcomers, so the owner stays first until the list is
//! filtered against the roster.

use std::collections::{BTreeMap, HashMap};

use anyhow::bail;

use crate::config;
use crate::elevio::{ButtonEvent, ButtonType};
use crate::network::PeerRoster;
use crate::print;
use crate::world_view::request::{CabRequestTable, CabRequests, HallRequestTable, RequestRecord, RequestState};
use crate::world_view::{ElevatorBehaviour, ElevatorInfo, NetworkMessage, OrderMatrix};

/// Hall cells a peer last announced as its own, with the count it announced them at.
pub type HallClaims = [[Option<u32>; config::N_HALL_BUTTONS]; config::N_FLOORS];

/// What a button press did to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressOutcome {
    /// Hall press while disconnected.
    Dropped,
    /// Request already in a state the press does not change.
    Unchanged,
    /// Hall record updated, negotiation continues.
    HallUpdated,
    /// Hall record taken by the local elevator at once (elevator idle or open at that floor).
    HallServedLocally,
    /// Local cab record updated. Must be persisted.
    CabUpdated,
}

/// Replicated request state of one node.
#[derive(Debug, Clone)]
pub struct RequestLedger {
    local_id: String,
    /// Hall table.
    pub hall: HallRequestTable,
    /// Cab tables of every known elevator, including the local one.
    pub cabs: CabRequestTable,
    /// Latest status report per elevator, including the local one.
    pub elevators: BTreeMap<String, ElevatorInfo>,
    /// Current peer roster.
    pub roster: PeerRoster,
    /// Whether the local node believes it is on the network.
    pub connected: bool,
    /// Hall cells each peer last announced as its own.
    pub peer_claims: HashMap<String, HallClaims>,
}

impl RequestLedger {
    /// Creates an empty ledger. `persisted` seeds the local cab table.
    pub fn new(local_id: &str, persisted: Option<CabRequests>) -> Self {
        let mut cabs = CabRequestTable::new();
        cabs.insert(local_id.to_string(), persisted.unwrap_or_default());
        let mut elevators = BTreeMap::new();
        elevators.insert(local_id.to_string(), ElevatorInfo::default());

        RequestLedger {
            local_id: local_id.to_string(),
            hall: HallRequestTable::default(),
            cabs,
            elevators,
            roster: PeerRoster::default(),
            connected: false,
            peer_claims: HashMap::new(),
        }
    }

    /// ID of the local node.
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Local cab table.
    pub fn local_cabs(&self) -> CabRequests {
        self.cabs.get(&self.local_id).cloned().unwrap_or_default()
    }

    fn local_cabs_mut(&mut self) -> &mut CabRequests {
        self.cabs.entry(self.local_id.clone()).or_default()
    }

    /// Latest status of the local elevator.
    pub fn local_info(&self) -> ElevatorInfo {
        self.elevators.get(&self.local_id).copied().unwrap_or_default()
    }

    /// Stores the local elevator's status.
    pub fn update_local_info(&mut self, info: ElevatorInfo) {
        self.elevators.insert(self.local_id.clone(), info);
    }

    /// `true` for the local node and every peer in the roster.
    pub fn in_roster(&self, id: &str) -> bool {
        id == self.local_id || self.roster.contains(id)
    }

    /// Number of nodes in the roster, counting the local node.
    pub fn roster_size(&self) -> usize {
        let mut size = self.roster.peers.len();
        if !self.roster.contains(&self.local_id) {
            size += 1;
        }
        size
    }

    /// Hall record at `floor`, `button`.
    pub fn hall_record(&self, floor: usize, button: ButtonType) -> &RequestRecord {
        &self.hall[floor][button.index()]
    }

    /// Aware nodes of a record that are still in the roster.
    pub fn roster_aware<'a>(&'a self, record: &'a RequestRecord) -> impl Iterator<Item = &'a String> + 'a {
        record.aware_list.iter().filter(move |id| self.in_roster(id))
    }

    /// `true` if the hall request is Assigned and the local node is the only roster member aware of it.
    pub fn is_sole_assigned_to_local(&self, floor: usize, button: ButtonType) -> bool {
        let record = self.hall_record(floor, button);
        if record.state != RequestState::Assigned {
            return false;
        }
        let mut aware = self.roster_aware(record);
        matches!((aware.next(), aware.next()), (Some(id), None) if *id == self.local_id)
    }

    /// `true` if another roster member has announced the cell as its own at the local count or later.
    pub fn claimed_by_peer(&self, floor: usize, button: ButtonType) -> bool {
        let count = self.hall_record(floor, button).count;
        self.peer_claims.iter().any(|(id, claims)| {
            id != &self.local_id
                && self.roster.contains(id)
                && claims[floor][button.index()].map_or(false, |c| c >= count)
        })
    }

    /// `true` if the local node may commit the hall cell to itself.
    ///
    /// The cell is free when at most one node is aware of it, the local node heads the aware list,
    /// or no other roster member currently announces it as its own.
    pub fn is_uncontested(&self, floor: usize, button: ButtonType) -> bool {
        let record = self.hall_record(floor, button);
        record.aware_list.len() <= 1
            || record.aware_list[0] == self.local_id
            || !self.claimed_by_peer(floor, button)
    }

    /// Records the hall cells `msg.sender_id` owns according to its own broadcast.
    pub fn record_peer_claims(&mut self, msg: &NetworkMessage) {
        let mut claims = HallClaims::default();
        for (floor, row) in msg.hall_requests.iter().enumerate() {
            for (btn, record) in row.iter().enumerate() {
                if record.state == RequestState::Assigned && record.aware_list.first() == Some(&msg.sender_id) {
                    claims[floor][btn] = Some(record.count);
                }
            }
        }
        self.peer_claims.insert(msg.sender_id.clone(), claims);
    }

    /// Applies a local button press.
    ///
    /// ## Parameters
    /// `ev`: The press
    /// `info`: Current status of the local elevator, used for the immediate-serve shortcut
    ///
    /// ## Returns
    /// What changed, or an error for a floor outside the building (nothing is mutated).
    pub fn on_button_press(&mut self, ev: ButtonEvent, info: &ElevatorInfo) -> anyhow::Result<PressOutcome> {
        let floor = ev.floor as usize;
        if floor >= config::N_FLOORS {
            bail!("button press at floor {} outside the building", ev.floor);
        }
        let local_id = self.local_id.clone();

        if ev.button == ButtonType::Cab {
            let record = &mut self.local_cabs_mut()[floor];
            return Ok(match record.state {
                RequestState::Completed => {
                    record.restart(RequestState::Assigned, &local_id);
                    PressOutcome::CabUpdated
                }
                RequestState::Unassigned => {
                    record.state = RequestState::Assigned;
                    record.reset_aware(&local_id);
                    PressOutcome::CabUpdated
                }
                RequestState::Assigned => PressOutcome::Unchanged,
            });
        }

        if !self.connected {
            return Ok(PressOutcome::Dropped);
        }

        let record = &mut self.hall[floor][ev.button.index()];
        let mut outcome = match record.state {
            RequestState::Completed => {
                record.restart(RequestState::Unassigned, &local_id);
                PressOutcome::HallUpdated
            }
            RequestState::Unassigned => {
                record.add_aware(&local_id);
                PressOutcome::HallUpdated
            }
            RequestState::Assigned => PressOutcome::Unchanged,
        };

        let serves_here = info.current_floor == Some(ev.floor)
            && matches!(info.behaviour, ElevatorBehaviour::Idle | ElevatorBehaviour::DoorOpen);
        if serves_here && record.state == RequestState::Unassigned {
            record.state = RequestState::Assigned;
            record.reset_aware(&local_id);
            outcome = PressOutcome::HallServedLocally;
        }
        Ok(outcome)
    }

    /// Applies a completion event from the FSM.
    ///
    /// A hall record the demotion sweep has put back to Unassigned still completes while the local
    /// node heads its aware list, since the local node committed it last.
    ///
    /// ## Returns
    /// `true` if a record was completed.
    pub fn on_request_completed(&mut self, ev: ButtonEvent) -> anyhow::Result<bool> {
        let floor = ev.floor as usize;
        if floor >= config::N_FLOORS {
            bail!("completion at floor {} outside the building", ev.floor);
        }
        let local_id = self.local_id.clone();
        let record = match ev.button {
            ButtonType::Cab => &mut self.local_cabs_mut()[floor],
            hall => &mut self.hall[floor][hall.index()],
        };
        let demoted_own = ev.button.is_hall()
            && record.state == RequestState::Unassigned
            && record.aware_list.first() == Some(&local_id);
        if record.state != RequestState::Assigned && !demoted_own {
            return Ok(false);
        }
        record.restart(RequestState::Completed, &local_id);
        Ok(true)
    }

    /// Releases the hall calls a departed peer owned.
    ///
    /// Every cell the peer last claimed that is still Assigned locally, and not already committed
    /// by the local node, restarts as Unassigned with only the local node aware.
    /// The peer is marked unavailable. Its cab table is kept.
    ///
    /// ## Returns
    /// The released cells.
    pub fn release_departed(&mut self, peer: &str) -> Vec<(u8, ButtonType)> {
        if let Some(info) = self.elevators.get_mut(peer) {
            info.available = false;
        }
        let Some(claims) = self.peer_claims.remove(peer) else {
            return Vec::new();
        };

        let mut released = Vec::new();
        for floor in 0..config::N_FLOORS {
            for button in [ButtonType::HallUp, ButtonType::HallDown] {
                if claims[floor][button.index()].is_none() {
                    continue;
                }
                let local_id = self.local_id.clone();
                let record = &mut self.hall[floor][button.index()];
                if record.state != RequestState::Assigned || record.aware_list.first() == Some(&local_id) {
                    continue;
                }
                record.restart(RequestState::Unassigned, &local_id);
                released.push((floor as u8, button));
            }
        }
        if !released.is_empty() {
            print::warn(format!("Released {} hall call(s) owned by departed peer {}: {:?}", released.len(), peer, released));
        }
        released
    }

    /// Lamps the ledger wants lit. Unassigned records keep whatever `lit` shows.
    pub fn desired_lamps(&self, lit: &OrderMatrix) -> OrderMatrix {
        fn lamp(record: &RequestRecord, prev: bool) -> bool {
            match record.state {
                RequestState::Assigned => true,
                RequestState::Completed => false,
                RequestState::Unassigned => prev,
            }
        }

        let cabs = self.local_cabs();
        let mut desired = *lit;
        for floor in 0..config::N_FLOORS {
            for button in [ButtonType::HallUp, ButtonType::HallDown] {
                desired[floor][button.index()] = lamp(self.hall_record(floor, button), lit[floor][button.index()]);
            }
            let cab = ButtonType::Cab.index();
            desired[floor][cab] = lamp(&cabs[floor], lit[floor][cab]);
        }
        desired
    }

    /// Builds the broadcast snapshot of this node.
    pub fn build_message(&self, debug_log: Option<String>) -> NetworkMessage {
        let info = self.local_info();
        NetworkMessage {
            sender_id: self.local_id.clone(),
            available: info.available,
            behaviour: info.behaviour,
            dirn: info.dirn,
            current_floor: info.current_floor,
            hall_requests: self.hall.clone(),
            cab_requests: self.cabs.clone(),
            debug_log,
        }
    }
}
