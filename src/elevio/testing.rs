//! Recording [`ElevatorIo`] for tests.

use std::sync::Mutex;

use super::{ButtonType, ElevatorIo};
use crate::world_view::Dirn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    Motor(Dirn),
    ButtonLamp { floor: u8, button: ButtonType, on: bool },
    FloorIndicator(u8),
    DoorLamp(bool),
    StopLamp(bool),
}

#[derive(Default)]
pub struct RecordingIo {
    outputs: Mutex<Vec<Output>>,
}

impl RecordingIo {
    pub fn outputs(&self) -> Vec<Output> {
        self.outputs.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.outputs.lock().unwrap().clear();
    }

    pub fn last_motor(&self) -> Option<Dirn> {
        self.outputs().iter().rev().find_map(|o| match o {
            Output::Motor(d) => Some(*d),
            _ => None,
        })
    }

    pub fn door_lamp(&self) -> Option<bool> {
        self.outputs().iter().rev().find_map(|o| match o {
            Output::DoorLamp(on) => Some(*on),
            _ => None,
        })
    }

    pub fn button_lamp(&self, floor: u8, button: ButtonType) -> Option<bool> {
        self.outputs().iter().rev().find_map(|o| match o {
            Output::ButtonLamp { floor: f, button: b, on } if *f == floor && *b == button => Some(*on),
            _ => None,
        })
    }

    fn push(&self, output: Output) {
        self.outputs.lock().unwrap().push(output);
    }
}

impl ElevatorIo for RecordingIo {
    fn motor_direction(&self, dirn: Dirn) {
        self.push(Output::Motor(dirn));
    }

    fn call_button_light(&self, floor: u8, button: ButtonType, on: bool) {
        self.push(Output::ButtonLamp { floor, button, on });
    }

    fn floor_indicator(&self, floor: u8) {
        self.push(Output::FloorIndicator(floor));
    }

    fn door_light(&self, on: bool) {
        self.push(Output::DoorLamp(on));
    }

    fn stop_button_light(&self, on: bool) {
        self.push(Output::StopLamp(on));
    }
}
