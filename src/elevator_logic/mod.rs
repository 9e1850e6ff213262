//! # Local elevator control
//!
//! [`run_local_elevator`] is the FSM event loop. It owns the [`fsm::ElevatorFsm`] and blocks on
//! whichever of {new order matrix, floor arrival, obstruction change, stop button, door timer,
//! movement timer} happens first. Buttons cleared by the FSM are forwarded as completion events.

pub mod fsm;
pub mod lights;
pub mod request;
pub mod timer;

use tokio::sync::mpsc;

use crate::elevio::{ButtonEvent, IoHandle};
use crate::print;
use crate::world_view::{OrderMatrix, SharedElevatorInfo};

/// Channels read and written by the FSM loop.
pub struct FsmChannels {
    /// Unified order matrices pushed by the request-control loop.
    pub orders: mpsc::Receiver<OrderMatrix>,
    /// Floor arrivals.
    pub floor: mpsc::Receiver<u8>,
    /// Obstruction switch changes.
    pub obstruction: mpsc::Receiver<bool>,
    /// Stop button changes.
    pub stop: mpsc::Receiver<bool>,
    /// Completion events towards the request-control loop.
    pub completed: mpsc::Sender<ButtonEvent>,
}

/// Runs the local elevator.
///
/// ## Parameters
/// `io`: Hardware outputs
/// `shared`: Snapshot published to the request-control loop
/// `chs`: Event channels
///
/// ## Behavior
/// - Drives the motor down until the first floor event arrives, then settles idle at that floor.
/// - Dispatches events to the FSM one at a time and forwards every cleared button on `chs.completed`.
///
/// ## Note
/// This function is permanently blocking, and should be called asynchronously
pub async fn run_local_elevator(io: IoHandle, shared: SharedElevatorInfo, mut chs: FsmChannels) {
    let mut fsm = fsm::ElevatorFsm::new(io, shared);

    fsm.begin_init();
    match chs.floor.recv().await {
        Some(floor) => fsm.finish_init(floor),
        None => {
            print::err("Floor sensor channel closed before the first floor was found".to_string());
            return;
        }
    }

    loop {
        let door_deadline = fsm.door_timer.deadline();
        let movement_deadline = fsm.movement_timer.deadline();

        let cleared = tokio::select! {
            Some(orders) = chs.orders.recv() => fsm.on_new_orders(orders),
            Some(floor) = chs.floor.recv() => fsm.on_floor_arrival(floor),
            Some(active) = chs.obstruction.recv() => {
                fsm.on_obstruction(active);
                Vec::new()
            }
            Some(pressed) = chs.stop.recv() => {
                fsm.on_stop_button(pressed);
                Vec::new()
            }
            _ = timer::expired(door_deadline) => fsm.on_door_timeout(),
            _ = timer::expired(movement_deadline) => {
                fsm.on_movement_timeout();
                Vec::new()
            }
            else => break,
        };

        for ev in cleared {
            if chs.completed.send(ev).await.is_err() {
                print::warn("Completion channel closed, dropping completion event".to_string());
            }
        }
    }
}
