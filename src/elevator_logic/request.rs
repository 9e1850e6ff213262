//! Elevator request evaluation and direction decision logic.
//!
//! This module provides helper functions for determining the next action of an elevator,
//! based on its current direction, pending orders, and behavioural state.
//!
//! It is used as part of the elevator finite state machine (FSM) and is purely functional:
//! every function reads a snapshot of [`ElevatorState`] and returns a decision. Only the
//! `clear_*` functions mutate, and they report exactly which buttons they cleared.
//!
//! # Overview
//! - Checking for orders above, below or at the current floor.
//! - Determining whether to stop at the current floor ([`should_stop`]).
//! - Choosing direction and behaviour ([`choose_direction`]).
//! - Clearing served orders at a stop ([`clear_at_current_floor`], [`clear_in_direction`]).
//!
//! # Primary Structs
//! - [`DirnBehaviourPair`]: Return value combining direction and behaviour (e.g., Moving Up).
//!
//! # Example
//! ```rust,no_run
//! use elevator_mesh::elevator_logic::request::{choose_direction, should_stop};
//! use elevator_mesh::world_view::ElevatorState;
//!
//! let elevator = ElevatorState::default();
//! let direction_and_behaviour = choose_direction(&elevator);
//! if should_stop(&elevator) {
//!     // Open doors, reset timers
//! }
//! ```

use crate::config;
use crate::elevio::ButtonType;
use crate::world_view::{Dirn, ElevatorBehaviour, ElevatorState};

/// Represents a combination of a direction and an elevator behaviour state.
///
/// Typically used as the return type for direction decision functions,
/// such as in the elevator finite state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirnBehaviourPair {
    /// direction of the elevator
    pub dirn: Dirn,

    /// the behavior of the elevator
    pub behaviour: ElevatorBehaviour,
}

impl DirnBehaviourPair {
    fn new(dirn: Dirn, behaviour: ElevatorBehaviour) -> Self {
        DirnBehaviourPair { dirn, behaviour }
    }
}

fn floor_of(elevator: &ElevatorState) -> Option<usize> {
    elevator.current_floor.map(|f| f as usize).filter(|f| *f < config::N_FLOORS)
}

fn any_order(elevator: &ElevatorState, floors: std::ops::Range<usize>) -> bool {
    floors.into_iter().any(|f| elevator.orders[f].iter().any(|o| *o))
}

/// Checks if there are any orders above the elevator's current floor.
///
/// # Parameters
/// - `elevator`: Reference to the elevator's internal state.
pub fn above(elevator: &ElevatorState) -> bool {
    match floor_of(elevator) {
        Some(floor) => any_order(elevator, (floor + 1)..config::N_FLOORS),
        None => false,
    }
}

/// Checks if there are any orders below the elevator's current floor.
///
/// # Parameters
/// - `elevator`: Reference to the elevator's internal state.
pub fn below(elevator: &ElevatorState) -> bool {
    match floor_of(elevator) {
        Some(floor) => any_order(elevator, 0..floor),
        None => false,
    }
}

/// Checks for any order at the elevator's current floor.
///
/// # Parameters
/// - `elevator`: Reference to the elevator's internal state.
pub fn here(elevator: &ElevatorState) -> bool {
    match floor_of(elevator) {
        Some(floor) => any_order(elevator, floor..floor + 1),
        None => false,
    }
}

/// Direction implied by the first active button at the current floor.
///
/// Hall up gives [`Dirn::Up`], hall down gives [`Dirn::Down`], a cab-only stop gives [`Dirn::Stop`].
fn get_here_dirn(elevator: &ElevatorState) -> Dirn {
    let Some(floor) = floor_of(elevator) else {
        return Dirn::Stop;
    };
    if elevator.orders[floor][ButtonType::HallUp.index()] {
        Dirn::Up
    } else if elevator.orders[floor][ButtonType::HallDown.index()] {
        Dirn::Down
    } else {
        Dirn::Stop
    }
}

/// Main decision logic to determine the elevator's next direction and behaviour.
///
/// Continue in the current direction if there is work there, else serve the current floor,
/// else reverse.
///
/// # Parameters
/// - `elevator`: Reference to the elevator's internal state.
///
/// # Returns
/// A `DirnBehaviourPair` representing the chosen direction and behaviour state.
pub fn choose_direction(elevator: &ElevatorState) -> DirnBehaviourPair {
    use ElevatorBehaviour::{DoorOpen, Idle, Moving};

    match elevator.dirn {
        Dirn::Up => {
            if above(elevator) {
                DirnBehaviourPair::new(Dirn::Up, Moving)
            } else if here(elevator) {
                DirnBehaviourPair::new(Dirn::Down, DoorOpen)
            } else if below(elevator) {
                DirnBehaviourPair::new(Dirn::Down, Moving)
            } else {
                DirnBehaviourPair::new(Dirn::Stop, Idle)
            }
        }
        Dirn::Down => {
            if below(elevator) {
                DirnBehaviourPair::new(Dirn::Down, Moving)
            } else if here(elevator) {
                DirnBehaviourPair::new(Dirn::Up, DoorOpen)
            } else if above(elevator) {
                DirnBehaviourPair::new(Dirn::Up, Moving)
            } else {
                DirnBehaviourPair::new(Dirn::Stop, Idle)
            }
        }
        Dirn::Stop => {
            if here(elevator) {
                DirnBehaviourPair::new(get_here_dirn(elevator), DoorOpen)
            } else if above(elevator) {
                DirnBehaviourPair::new(Dirn::Up, Moving)
            } else if below(elevator) {
                DirnBehaviourPair::new(Dirn::Down, Moving)
            } else {
                DirnBehaviourPair::new(Dirn::Stop, Idle)
            }
        }
    }
}

/// Determines whether the elevator should stop at the current floor.
///
/// Moving up it stops for hall up, cab, or when nothing is left above. Moving down is symmetric.
/// With no direction it stops only if something is ordered here.
///
/// # Parameters
/// - `elevator`: Reference to the elevator's internal state.
///
/// # Returns
/// `true` if the elevator should stop, otherwise `false`.
pub fn should_stop(elevator: &ElevatorState) -> bool {
    let Some(floor) = floor_of(elevator) else {
        return false;
    };
    let orders = &elevator.orders[floor];
    let cab = orders[ButtonType::Cab.index()];

    match elevator.dirn {
        Dirn::Up => orders[ButtonType::HallUp.index()] || cab || !above(elevator),
        Dirn::Down => orders[ButtonType::HallDown.index()] || cab || !below(elevator),
        Dirn::Stop => here(elevator),
    }
}

fn take(elevator: &mut ElevatorState, floor: usize, button: ButtonType, cleared: &mut Vec<ButtonType>) {
    if elevator.orders[floor][button.index()] {
        elevator.orders[floor][button.index()] = false;
        cleared.push(button);
    }
}

/// Clears the orders served by stopping at the current floor.
///
/// The cab order is always served. The hall order in the direction of travel is served, and the
/// opposite hall order only when nothing lies further ahead and no same-direction call was waiting.
///
/// # Returns
/// The buttons that were cleared, in clearing order.
pub fn clear_at_current_floor(elevator: &mut ElevatorState) -> Vec<ButtonType> {
    let mut cleared = Vec::new();
    let Some(floor) = floor_of(elevator) else {
        return cleared;
    };

    take(elevator, floor, ButtonType::Cab, &mut cleared);
    match elevator.dirn {
        Dirn::Up => {
            if !above(elevator) && !elevator.orders[floor][ButtonType::HallUp.index()] {
                take(elevator, floor, ButtonType::HallDown, &mut cleared);
            }
            take(elevator, floor, ButtonType::HallUp, &mut cleared);
        }
        Dirn::Down => {
            if !below(elevator) && !elevator.orders[floor][ButtonType::HallDown.index()] {
                take(elevator, floor, ButtonType::HallUp, &mut cleared);
            }
            take(elevator, floor, ButtonType::HallDown, &mut cleared);
        }
        Dirn::Stop => {
            take(elevator, floor, ButtonType::HallUp, &mut cleared);
            take(elevator, floor, ButtonType::HallDown, &mut cleared);
        }
    }
    cleared
}

/// Clears the cab order and the hall order matching the current direction.
///
/// Used when the door times out, so that calls arriving while the door was open are served
/// without swallowing an opposite-direction call that still has to be announced.
pub fn clear_in_direction(elevator: &mut ElevatorState) -> Vec<ButtonType> {
    let mut cleared = Vec::new();
    let Some(floor) = floor_of(elevator) else {
        return cleared;
    };

    take(elevator, floor, ButtonType::Cab, &mut cleared);
    match elevator.dirn {
        Dirn::Up => take(elevator, floor, ButtonType::HallUp, &mut cleared),
        Dirn::Down => take(elevator, floor, ButtonType::HallDown, &mut cleared),
        Dirn::Stop => {
            take(elevator, floor, ButtonType::HallUp, &mut cleared);
            take(elevator, floor, ButtonType::HallDown, &mut cleared);
        }
    }
    cleared
}
