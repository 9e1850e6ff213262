//! TCP driver for the elevator server and simulator.
//!
//! Every command is a 4-byte message. Queries are answered with 4 bytes.

use std::fmt;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;

use super::{ButtonType, ElevatorIo};
use crate::print;
use crate::world_view::Dirn;

const DIRN_DOWN: u8 = u8::MAX;
const DIRN_STOP: u8 = 0;
const DIRN_UP: u8 = 1;

/// Connection to one elevator.
#[derive(Clone, Debug)]
pub struct Elevator {
    socket: Arc<Mutex<TcpStream>>,
    /// Floors reported by the pollers.
    pub num_floors: u8,
}

impl Elevator {
    /// Connects to the elevator server at `addr`.
    pub fn init(addr: &str, num_floors: u8) -> anyhow::Result<Elevator> {
        let stream = TcpStream::connect(addr)
            .with_context(|| format!("could not connect to elevator server at {}", addr))?;
        stream.set_nodelay(true).context("set_nodelay failed")?;
        Ok(Self { socket: Arc::new(Mutex::new(stream)), num_floors })
    }

    fn socket(&self) -> MutexGuard<'_, TcpStream> {
        self.socket.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn send(&self, buf: [u8; 4]) {
        if let Err(e) = self.socket().write_all(&buf) {
            print::err(format!("elev.rs, send({:?}): {}", buf, e));
        }
    }

    fn query(&self, mut buf: [u8; 4]) -> Option<[u8; 4]> {
        let mut sock = self.socket();
        let res = sock.write_all(&buf).and_then(|_| sock.read_exact(&mut buf));
        match res {
            Ok(()) => Some(buf),
            Err(e) => {
                print::err(format!("elev.rs, query({}): {}", buf[0], e));
                None
            }
        }
    }

    /// Raw call button state.
    pub fn call_button(&self, floor: u8, call: u8) -> bool {
        self.query([6, call, floor, 0]).map_or(false, |buf| buf[1] != 0)
    }

    /// Current floor, or `None` between floors.
    pub fn floor_sensor(&self) -> Option<u8> {
        match self.query([7, 0, 0, 0]) {
            Some(buf) if buf[1] != 0 => Some(buf[2]),
            _ => None,
        }
    }

    /// Raw stop button state.
    pub fn stop_button(&self) -> bool {
        self.query([8, 0, 0, 0]).map_or(false, |buf| buf[1] != 0)
    }

    /// Raw obstruction switch state.
    pub fn obstruction(&self) -> bool {
        self.query([9, 0, 0, 0]).map_or(false, |buf| buf[1] != 0)
    }
}

impl ElevatorIo for Elevator {
    fn motor_direction(&self, dirn: Dirn) {
        let code = match dirn {
            Dirn::Up => DIRN_UP,
            Dirn::Down => DIRN_DOWN,
            Dirn::Stop => DIRN_STOP,
        };
        self.send([1, code, 0, 0]);
    }

    fn call_button_light(&self, floor: u8, button: ButtonType, on: bool) {
        self.send([2, button as u8, floor, on as u8]);
    }

    fn floor_indicator(&self, floor: u8) {
        self.send([3, floor, 0, 0]);
    }

    fn door_light(&self, on: bool) {
        self.send([4, on as u8, 0, 0]);
    }

    fn stop_button_light(&self, on: bool) {
        self.send([5, on as u8, 0, 0]);
    }
}

impl fmt::Display for Elevator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.socket().peer_addr() {
            Ok(addr) => write!(f, "Elevator@{}({})", addr, self.num_floors),
            Err(_) => write!(f, "Elevator@<disconnected>({})", self.num_floors),
        }
    }
}
