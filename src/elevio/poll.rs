//! Hardware polling threads.
//!
//! Each poller runs on its own OS thread and reports changes on a crossbeam channel.
//! [`spawn_pollers`] starts them together with a bridge thread that forwards every
//! event into the tokio channels read by the FSM and the request-control loop.

use crossbeam_channel as cbc;
use std::thread;
use std::time;
use tokio::sync::mpsc;

use super::elev::Elevator;
use super::ButtonEvent;
use crate::config;
use crate::print;

/// Receivers for all hardware input events.
pub struct HardwareRxs {
    /// Button presses, consumed by the request-control loop.
    pub buttons: mpsc::Receiver<ButtonEvent>,
    /// Floor arrivals, consumed by the FSM.
    pub floor: mpsc::Receiver<u8>,
    /// Obstruction switch changes, consumed by the FSM.
    pub obstruction: mpsc::Receiver<bool>,
    /// Stop button changes, consumed by the FSM.
    pub stop: mpsc::Receiver<bool>,
}

#[doc(hidden)]
pub fn call_buttons(elev: Elevator, ch: cbc::Sender<ButtonEvent>, period: time::Duration) {
    let mut prev = vec![[false; config::N_BUTTONS]; elev.num_floors.into()];
    loop {
        for f in 0..elev.num_floors {
            for c in 0..config::N_BUTTONS as u8 {
                let v = elev.call_button(f, c);
                if v && prev[f as usize][c as usize] != v {
                    match ButtonEvent::from_raw(f, c) {
                        Ok(ev) => {
                            if ch.send(ev).is_err() {
                                return;
                            }
                        }
                        Err(e) => print::err(format!("Dropping button event: {}", e)),
                    }
                }
                prev[f as usize][c as usize] = v;
            }
        }
        thread::sleep(period)
    }
}

#[doc(hidden)]
pub fn floor_sensor(elev: Elevator, ch: cbc::Sender<u8>, period: time::Duration) {
    let mut prev = u8::MAX;
    loop {
        if let Some(f) = elev.floor_sensor() {
            if f != prev {
                if ch.send(f).is_err() {
                    return;
                }
                prev = f;
            }
        }
        thread::sleep(period)
    }
}

#[doc(hidden)]
pub fn stop_button(elev: Elevator, ch: cbc::Sender<bool>, period: time::Duration) {
    let mut prev = false;
    loop {
        let v = elev.stop_button();
        if prev != v {
            if ch.send(v).is_err() {
                return;
            }
            prev = v;
        }
        thread::sleep(period)
    }
}

#[doc(hidden)]
pub fn obstruction(elev: Elevator, ch: cbc::Sender<bool>, period: time::Duration) {
    let mut prev = false;
    loop {
        let v = elev.obstruction();
        if prev != v {
            if ch.send(v).is_err() {
                return;
            }
            prev = v;
        }
        thread::sleep(period)
    }
}

/// Starts the four pollers and the bridge thread.
///
/// ## Parameters
/// `elevator`: Connected driver, cloned into every poller
///
/// ## Returns
/// The tokio receivers the rest of the node listens on.
///
/// ## Note
/// The threads live for the rest of the process. The bridge stops when all tokio receivers are dropped.
pub fn spawn_pollers(elevator: &Elevator) -> HardwareRxs {
    let (call_button_tx, call_button_rx) = cbc::unbounded::<ButtonEvent>();
    let (floor_sensor_tx, floor_sensor_rx) = cbc::unbounded::<u8>();
    let (stop_button_tx, stop_button_rx) = cbc::unbounded::<bool>();
    let (obstruction_tx, obstruction_rx) = cbc::unbounded::<bool>();

    {
        let elevator = elevator.clone();
        thread::spawn(move || call_buttons(elevator, call_button_tx, config::ELEV_POLL));
    }
    {
        let elevator = elevator.clone();
        thread::spawn(move || floor_sensor(elevator, floor_sensor_tx, config::ELEV_POLL));
    }
    {
        let elevator = elevator.clone();
        thread::spawn(move || stop_button(elevator, stop_button_tx, config::ELEV_POLL));
    }
    {
        let elevator = elevator.clone();
        thread::spawn(move || obstruction(elevator, obstruction_tx, config::ELEV_POLL));
    }

    let (buttons_tx, buttons) = mpsc::channel(32);
    let (floor_tx, floor) = mpsc::channel(32);
    let (obstruction_tx, obstruction) = mpsc::channel(32);
    let (stop_tx, stop) = mpsc::channel(32);

    thread::spawn(move || loop {
        let delivered = cbc::select! {
            recv(call_button_rx) -> ev => match ev {
                Ok(ev) => buttons_tx.blocking_send(ev).is_ok(),
                Err(_) => false,
            },
            recv(floor_sensor_rx) -> f => match f {
                Ok(f) => floor_tx.blocking_send(f).is_ok(),
                Err(_) => false,
            },
            recv(obstruction_rx) -> v => match v {
                Ok(v) => obstruction_tx.blocking_send(v).is_ok(),
                Err(_) => false,
            },
            recv(stop_button_rx) -> v => match v {
                Ok(v) => stop_tx.blocking_send(v).is_ok(),
                Err(_) => false,
            },
        };
        if !delivered {
            print::warn("Hardware bridge stopped".to_string());
            break;
        }
    });

    HardwareRxs { buttons, floor, obstruction, stop }
}
