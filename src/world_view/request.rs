//! Request records and the tables holding them.
//!
//! A [`RequestRecord`] is one negotiation slot: the hall button at a floor, or one cab button of
//! one elevator. The `(count, state)` pair orders successive versions of the slot and `aware_list`
//! names the nodes known to have seen that version.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config;

/// Life-cycle state of a request.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestState {
    /// Pressed, ownership still being negotiated.
    #[default]
    Unassigned,
    /// Owned by one elevator.
    Assigned,
    /// Served.
    Completed,
}

/// One replicated request slot.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestRecord {
    /// Life-cycle state.
    pub state: RequestState,
    /// Bumped every time the slot starts a new life-cycle.
    pub count: u32,
    /// Nodes known to have observed this `(count, state)`, in the order they were added.
    pub aware_list: Vec<String>,
}

impl RequestRecord {
    /// `true` if `id` is in the aware list.
    pub fn is_aware(&self, id: &str) -> bool {
        self.aware_list.iter().any(|a| a == id)
    }

    /// Adds `id` to the aware list unless it is already there.
    pub fn add_aware(&mut self, id: &str) {
        if !self.is_aware(id) {
            self.aware_list.push(id.to_string());
        }
    }

    /// Makes `id` the only aware node.
    pub fn reset_aware(&mut self, id: &str) {
        self.aware_list.clear();
        self.aware_list.push(id.to_string());
    }

    /// `true` if every node in `self.aware_list` is also in `other.aware_list`.
    pub fn aware_subset_of(&self, other: &RequestRecord) -> bool {
        self.aware_list.iter().all(|id| other.is_aware(id))
    }

    /// `true` if both records describe the same version of the slot.
    pub fn same_version(&self, other: &RequestRecord) -> bool {
        self.count == other.count && self.state == other.state
    }

    /// Starts a new life-cycle in `state` with `id` as the only aware node.
    pub fn restart(&mut self, state: RequestState, id: &str) {
        self.state = state;
        self.count += 1;
        self.reset_aware(id);
    }
}

/// Hall requests, indexed `[floor][button]` with button 0 = up, 1 = down.
pub type HallRequestTable = [[RequestRecord; config::N_HALL_BUTTONS]; config::N_FLOORS];

/// Cab requests of one elevator, indexed by floor.
pub type CabRequests = [RequestRecord; config::N_FLOORS];

/// Cab requests of every known elevator, keyed by elevator ID.
pub type CabRequestTable = BTreeMap<String, CabRequests>;
