//! ## Elevator I/O module for the local elevator
//!
//! The wire driver lives in [`elev`] and the polling threads in [`poll`].
//! This module holds the types shared between the hardware side and the rest of the node.
//!
//! ## Overview
//! - [`ButtonType`]: Hall up, hall down or cab button.
//! - [`ButtonEvent`]: A button press at a floor.
//! - [`ElevatorIo`]: The output seam (motor, lamps, floor indicator). Implemented by
//!   [`elev::Elevator`] for the real server and by a recorder in tests.
//! - [`IoHandle`]: Shared handle to an [`ElevatorIo`], cloned into every task that drives outputs.

pub mod elev;
pub mod poll;

#[cfg(test)]
pub mod testing;

use std::sync::Arc;

use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::config;
use crate::world_view::Dirn;

/// Represents the type of call button.
///
/// The discriminant is the column index used in order matrices and the button code
/// used by the elevator server.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ButtonType {
    /// Hall call going up.
    HallUp = 0,
    /// Hall call going down.
    HallDown = 1,
    /// Call from inside the cab.
    Cab = 2,
}

impl ButtonType {
    /// All buttons in column order.
    pub const ALL: [ButtonType; config::N_BUTTONS] = [ButtonType::HallUp, ButtonType::HallDown, ButtonType::Cab];

    /// Column index in an order matrix.
    pub fn index(self) -> usize {
        self as usize
    }

    /// `true` for the two hall buttons.
    pub fn is_hall(self) -> bool {
        !matches!(self, ButtonType::Cab)
    }
}

impl TryFrom<u8> for ButtonType {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> anyhow::Result<Self> {
        match value {
            0 => Ok(ButtonType::HallUp),
            1 => Ok(ButtonType::HallDown),
            2 => Ok(ButtonType::Cab),
            _ => bail!("button type {} does not exist", value),
        }
    }
}

/// Represents a button press.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ButtonEvent {
    /// The floor where the button was pressed.
    pub floor: u8,
    /// Which button was pressed.
    pub button: ButtonType,
}

impl ButtonEvent {
    /// Builds an event from raw driver values, rejecting out-of-range indices.
    pub fn from_raw(floor: u8, button: u8) -> anyhow::Result<Self> {
        if floor as usize >= config::N_FLOORS {
            bail!("floor {} is outside 0..{}", floor, config::N_FLOORS);
        }
        Ok(ButtonEvent { floor, button: ButtonType::try_from(button)? })
    }
}

/// Output side of an elevator.
///
/// Every call is fire-and-forget: implementations log their own I/O errors.
pub trait ElevatorIo: Send + Sync {
    /// Sets the motor direction.
    fn motor_direction(&self, dirn: Dirn);
    /// Turns a call button lamp on or off.
    fn call_button_light(&self, floor: u8, button: ButtonType, on: bool);
    /// Shows `floor` on the floor indicator.
    fn floor_indicator(&self, floor: u8);
    /// Turns the door open lamp on or off.
    fn door_light(&self, on: bool);
    /// Turns the stop button lamp on or off.
    fn stop_button_light(&self, on: bool);
}

/// Shared handle to the elevator outputs.
pub type IoHandle = Arc<dyn ElevatorIo>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_events_outside_the_building_are_rejected() {
        assert!(ButtonEvent::from_raw(config::N_FLOORS as u8, 0).is_err());
        assert!(ButtonEvent::from_raw(0, 3).is_err());

        let ev = ButtonEvent::from_raw(2, 1).unwrap();
        assert_eq!(ev, ButtonEvent { floor: 2, button: ButtonType::HallDown });
    }

    #[test]
    fn button_index_matches_column_order() {
        for (i, b) in ButtonType::ALL.iter().enumerate() {
            assert_eq!(b.index(), i);
        }
        assert!(ButtonType::HallUp.is_hall());
        assert!(!ButtonType::Cab.is_hall());
    }
}
