//! # World view of a single node
//!
//! Data model shared by the FSM, the request ledger and the network layer.
//!
//! ## Overview
//! - [`ElevatorState`]: Physical state and order matrix, owned by the FSM loop.
//! - [`ElevatorInfo`]: Status snapshot the FSM publishes and peers broadcast.
//! - [`SharedElevatorInfo`]: Lock-guarded handle to the local [`ElevatorInfo`], created once in `main`
//!   and handed to both the FSM and the request-control loop.
//! - [`NetworkMessage`]: Periodic state broadcast.
//! - [`request`]: Request records and the hall/cab tables.
//! - [`ledger`]: The node's replicated request state.
//! - [`serial`]: Wire codec for [`NetworkMessage`].

pub mod ledger;
pub mod request;
pub mod serial;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config;
use request::{CabRequestTable, HallRequestTable};

/// Floors × (hall up, hall down, cab) boolean matrix.
pub type OrderMatrix = [[bool; config::N_BUTTONS]; config::N_FLOORS];

#[allow(missing_docs)]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Direction of travel
pub enum Dirn {
    Down = -1,
    #[default]
    Stop = 0,
    Up = 1,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
/// What the elevator is doing right now
pub enum ElevatorBehaviour {
    #[default]
    Idle,
    Moving,
    DoorOpen,
}

/// Physical state of the local elevator.
///
/// Only the FSM loop holds one of these. Everyone else sees the [`ElevatorInfo`] snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ElevatorState {
    /// Last floor seen by the floor sensor, `None` until the first arrival.
    pub current_floor: Option<u8>,
    /// Direction of travel, or the direction announced while the door is open.
    pub dirn: Dirn,
    /// Current FSM state.
    pub behaviour: ElevatorBehaviour,
    /// Orders this elevator should serve.
    pub orders: OrderMatrix,
    /// Stop button latched on.
    pub stop_active: bool,
    /// How long the door stays open at a stop.
    pub door_open_duration: Duration,
}

impl Default for ElevatorState {
    fn default() -> Self {
        ElevatorState {
            current_floor: None,
            dirn: Dirn::Stop,
            behaviour: ElevatorBehaviour::Idle,
            orders: [[false; config::N_BUTTONS]; config::N_FLOORS],
            stop_active: false,
            door_open_duration: config::DOOR_OPEN_DURATION,
        }
    }
}

/// Status report of one elevator.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ElevatorInfo {
    /// Whether the elevator can take new hall calls.
    pub available: bool,
    /// Current FSM state.
    pub behaviour: ElevatorBehaviour,
    /// Direction, clamped to [`Dirn::Stop`] at the end floors.
    pub dirn: Dirn,
    /// Last known floor.
    pub current_floor: Option<u8>,
    /// Stop button latched on. Local only, never sent to peers.
    pub stop_active: bool,
}

impl ElevatorInfo {
    /// Builds the published snapshot from the FSM state.
    ///
    /// An elevator at the bottom heading down, or at the top heading up, reports [`Dirn::Stop`].
    pub fn from_state(state: &ElevatorState, available: bool) -> Self {
        let dirn = match (state.current_floor, state.dirn) {
            (Some(0), Dirn::Down) => Dirn::Stop,
            (Some(f), Dirn::Up) if f as usize == config::N_FLOORS - 1 => Dirn::Stop,
            (_, d) => d,
        };
        ElevatorInfo {
            available,
            behaviour: state.behaviour,
            dirn,
            current_floor: state.current_floor,
            stop_active: state.stop_active,
        }
    }
}

/// Handle to the local [`ElevatorInfo`].
///
/// Cloning the handle shares the same snapshot.
#[derive(Clone, Debug, Default)]
pub struct SharedElevatorInfo {
    inner: Arc<RwLock<ElevatorInfo>>,
}

impl SharedElevatorInfo {
    /// Creates a new snapshot with an unavailable, idle elevator at an unknown floor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the snapshot.
    pub fn publish(&self, info: ElevatorInfo) {
        let mut guard = self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = info;
    }

    /// Copies the current snapshot.
    pub fn snapshot(&self) -> ElevatorInfo {
        *self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Periodic state broadcast of one node.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NetworkMessage {
    /// ID of the node that sent the message.
    pub sender_id: String,
    /// Sender's availability.
    pub available: bool,
    /// Sender's FSM state.
    pub behaviour: ElevatorBehaviour,
    /// Sender's direction.
    pub dirn: Dirn,
    /// Sender's last known floor.
    pub current_floor: Option<u8>,
    /// Sender's hall table.
    pub hall_requests: HallRequestTable,
    /// Sender's cab tables for every elevator it knows.
    pub cab_requests: CabRequestTable,
    /// Free-text note, printed by receivers.
    pub debug_log: Option<String>,
}

impl NetworkMessage {
    /// Status part of the message.
    pub fn elevator_info(&self) -> ElevatorInfo {
        ElevatorInfo {
            available: self.available,
            behaviour: self.behaviour,
            dirn: self.dirn,
            current_floor: self.current_floor,
            stop_active: false,
        }
    }
}
