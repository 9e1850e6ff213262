//! # Elevator finite state machine
//!
//! [`ElevatorFsm`] owns the [`ElevatorState`] of the local elevator and reacts to one event at a
//! time. Every handler drives the hardware outputs it is responsible for, republishes the
//! [`ElevatorInfo`] snapshot and returns the buttons it cleared, which the caller forwards to the
//! request ledger as completion events.
//!
//! ## States
//! - `Idle`: waiting for orders.
//! - `Moving`: motor running, movement timer armed.
//! - `DoorOpen`: door lamp on, door timer armed (or held by an obstruction).
//!
//! ## Availability
//! The elevator is reported unavailable while stalled (movement timeout without a floor arrival),
//! while the door is held open by an obstruction, and while the stop button is latched.

use crate::config;
use crate::elevio::{ButtonEvent, ButtonType, IoHandle};
use crate::print;
use crate::world_view::{Dirn, ElevatorBehaviour, ElevatorInfo, ElevatorState, OrderMatrix, SharedElevatorInfo};

use super::request;
use super::timer::{self, Timer};
use super::lights;

/// The local elevator's state machine.
pub struct ElevatorFsm {
    /// Physical state and orders.
    pub state: ElevatorState,
    /// Armed while the door is open.
    pub door_timer: Timer,
    /// Armed while moving between floors.
    pub movement_timer: Timer,
    io: IoHandle,
    shared: SharedElevatorInfo,
    obstruction: bool,
    stalled: bool,
}

impl ElevatorFsm {
    /// Creates an idle FSM at an unknown floor.
    pub fn new(io: IoHandle, shared: SharedElevatorInfo) -> Self {
        let state = ElevatorState::default();
        ElevatorFsm {
            door_timer: timer::new(state.door_open_duration),
            movement_timer: timer::new(config::MOVEMENT_TIMEOUT),
            state,
            io,
            shared,
            obstruction: false,
            stalled: false,
        }
    }

    /// Whether the elevator can take hall calls right now.
    pub fn available(&self) -> bool {
        let held_open = self.obstruction && self.state.behaviour == ElevatorBehaviour::DoorOpen;
        !(self.stalled || held_open || self.state.stop_active)
    }

    fn publish(&self) {
        self.shared.publish(ElevatorInfo::from_state(&self.state, self.available()));
    }

    fn completions(&self, cleared: Vec<ButtonType>) -> Vec<ButtonEvent> {
        match self.state.current_floor {
            Some(floor) => cleared.into_iter().map(|button| ButtonEvent { floor, button }).collect(),
            None => Vec::new(),
        }
    }

    fn open_door(&mut self) {
        lights::set_door_open_light(&self.io);
        self.door_timer.timer_start();
        self.state.behaviour = ElevatorBehaviour::DoorOpen;
    }

    fn start_moving(&mut self, dirn: Dirn) {
        self.state.dirn = dirn;
        self.state.behaviour = ElevatorBehaviour::Moving;
        self.io.motor_direction(dirn);
        self.movement_timer.timer_start();
    }

    /// Starts the downward search for a floor. Call before the first floor event is awaited.
    pub fn begin_init(&mut self) {
        print::info("Searching for a floor".to_string());
        self.io.motor_direction(Dirn::Down);
        self.publish();
    }

    /// Completes initialisation at `floor`: motor stopped, idle, available.
    pub fn finish_init(&mut self, floor: u8) {
        self.io.motor_direction(Dirn::Stop);
        lights::clear_door_open_light(&self.io);
        self.state.current_floor = Some(floor);
        self.state.dirn = Dirn::Stop;
        self.state.behaviour = ElevatorBehaviour::Idle;
        self.io.floor_indicator(floor);
        self.publish();
        print::ok(format!("Elevator initialised at floor {}", floor));
    }

    /// New order matrix from the request ledger.
    ///
    /// The matrix always replaces the current orders. Only an idle elevator acts on it directly:
    /// moving and door-open elevators pick the new orders up at the next floor or door timeout.
    /// Ignored while the stop button is latched.
    pub fn on_new_orders(&mut self, orders: OrderMatrix) -> Vec<ButtonEvent> {
        if self.state.stop_active {
            return Vec::new();
        }
        self.state.orders = orders;
        if self.state.behaviour != ElevatorBehaviour::Idle || self.state.current_floor.is_none() {
            return Vec::new();
        }

        let pair = request::choose_direction(&self.state);
        let mut cleared = Vec::new();
        match pair.behaviour {
            ElevatorBehaviour::DoorOpen => {
                self.state.dirn = pair.dirn;
                self.open_door();
                cleared = request::clear_at_current_floor(&mut self.state);
            }
            ElevatorBehaviour::Moving => self.start_moving(pair.dirn),
            ElevatorBehaviour::Idle => {}
        }
        self.publish();
        self.completions(cleared)
    }

    /// Floor sensor reports `floor`.
    pub fn on_floor_arrival(&mut self, floor: u8) -> Vec<ButtonEvent> {
        if floor as usize >= config::N_FLOORS {
            print::err(format!("Floor sensor reported floor {} outside the building", floor));
            return Vec::new();
        }
        self.state.current_floor = Some(floor);
        self.io.floor_indicator(floor);
        self.stalled = false;

        let mut cleared = Vec::new();
        if self.state.behaviour == ElevatorBehaviour::Moving {
            self.movement_timer.timer_start();
            if request::should_stop(&self.state) {
                self.io.motor_direction(Dirn::Stop);
                self.movement_timer.timer_stop();
                cleared = request::clear_at_current_floor(&mut self.state);
                self.open_door();
            }
        }
        self.publish();
        self.completions(cleared)
    }

    /// Door timer fired.
    pub fn on_door_timeout(&mut self) -> Vec<ButtonEvent> {
        self.door_timer.timer_stop();
        if self.state.behaviour != ElevatorBehaviour::DoorOpen {
            return Vec::new();
        }
        if self.obstruction {
            self.door_timer.timer_start();
            self.publish();
            return Vec::new();
        }

        let mut cleared = request::clear_in_direction(&mut self.state);
        let pair = request::choose_direction(&self.state);
        match pair.behaviour {
            ElevatorBehaviour::DoorOpen => {
                // Opposite-direction call at this floor: announce the new direction and keep the door open.
                self.state.dirn = pair.dirn;
                cleared.extend(request::clear_at_current_floor(&mut self.state));
                self.door_timer.timer_start();
            }
            ElevatorBehaviour::Moving => {
                lights::clear_door_open_light(&self.io);
                self.start_moving(pair.dirn);
            }
            ElevatorBehaviour::Idle => {
                lights::clear_door_open_light(&self.io);
                self.state.dirn = Dirn::Stop;
                self.state.behaviour = ElevatorBehaviour::Idle;
            }
        }
        self.publish();
        self.completions(cleared)
    }

    /// Obstruction switch changed.
    pub fn on_obstruction(&mut self, active: bool) {
        self.obstruction = active;
        if self.state.behaviour == ElevatorBehaviour::DoorOpen {
            if active {
                self.door_timer.timer_stop();
            } else {
                self.door_timer.timer_start();
            }
        }
        if active {
            print::warn("Obstruction detected".to_string());
        }
        self.publish();
    }

    /// Movement timer fired without a floor arrival.
    pub fn on_movement_timeout(&mut self) {
        self.movement_timer.timer_stop();
        if self.state.behaviour == ElevatorBehaviour::Moving {
            self.stalled = true;
            print::err(format!(
                "No floor arrival within {:?}, reporting unavailable",
                config::MOVEMENT_TIMEOUT
            ));
            self.publish();
        }
    }

    /// Stop button changed. A press toggles the latched stop.
    pub fn on_stop_button(&mut self, pressed: bool) {
        if !pressed {
            return;
        }
        self.state.stop_active = !self.state.stop_active;
        lights::set_stop_button_light(&self.io, self.state.stop_active);

        if self.state.stop_active {
            print::warn("Stop activated".to_string());
            self.io.motor_direction(Dirn::Stop);
            self.state.orders = [[false; config::N_BUTTONS]; config::N_FLOORS];
            lights::clear_all_button_lights(&self.io);
            lights::clear_door_open_light(&self.io);
            self.door_timer.timer_stop();
            self.movement_timer.timer_stop();
            self.state.dirn = Dirn::Stop;
            self.state.behaviour = ElevatorBehaviour::Idle;
        } else {
            print::info("Stop released".to_string());
        }
        self.publish();
    }
}
