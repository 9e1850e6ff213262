use crate::config;
use crate::elevio::{ButtonType, IoHandle};
use crate::world_view::OrderMatrix;

/// Keeps the button lamps in step with a desired lamp matrix.
///
/// ## Behavior
/// Only lamps whose desired value differs from what was last written are sent to the hardware,
/// unless `force` is set, in which case every lamp is rewritten.
#[derive(Debug, Default)]
pub struct LampSync {
    lit: OrderMatrix,
}

impl LampSync {
    /// Lamp matrix as last written.
    pub fn lit(&self) -> &OrderMatrix {
        &self.lit
    }

    /// Writes `desired` to the button lamps.
    pub fn sync(&mut self, e: &IoHandle, desired: &OrderMatrix, force: bool) {
        for floor in 0..config::N_FLOORS {
            for button in ButtonType::ALL {
                let on = desired[floor][button.index()];
                if force || self.lit[floor][button.index()] != on {
                    e.call_button_light(floor as u8, button, on);
                }
            }
        }
        self.lit = *desired;
    }

    /// Records that every lamp has been switched off elsewhere.
    pub fn forget(&mut self) {
        self.lit = OrderMatrix::default();
    }
}

/// Turns every button lamp off
pub fn clear_all_button_lights(e: &IoHandle) {
    for floor in 0..config::N_FLOORS {
        for button in ButtonType::ALL {
            e.call_button_light(floor as u8, button, false);
        }
    }
}

/// The function sets the door open light on
pub fn set_door_open_light(e: &IoHandle) {
    e.door_light(true);
}

/// The function sets the door open light off
pub fn clear_door_open_light(e: &IoHandle) {
    e.door_light(false);
}

/// The function sets the stop button light on or off
pub fn set_stop_button_light(e: &IoHandle, on: bool) {
    e.stop_button_light(on);
}
