//! # config.rs – Centralized Parameter Store
//!
//! This module holds all static program parameters used throughout the node.
//! Keeping configuration in one place makes tuning, experimentation, and testing easier.
//!
//! Runtime-tunable values (the elevator ID, driver address, solver path) live in
//! [`crate::init::NodeConfig`] and are parsed from the command line.

use std::sync::Mutex;
use std::time::Duration;
use once_cell::sync::Lazy;

//
// ──────────────────────────────────────────────────────────────
//   1. NETWORK SETTINGS
// ──────────────────────────────────────────────────────────────
//

/// UDP port used by the peer heartbeat transport
pub const PEER_PORT: u16 = 30060;

/// UDP port used for [`crate::world_view::NetworkMessage`] broadcasts
pub const MSG_PORT: u16 = 30061;

/// UDP broadcast listen address (bind address)
pub static BC_LISTEN_ADDR: &str = "0.0.0.0";

/// Broadcast address used for system-wide gossip
pub static BC_ADDR: &str = "255.255.255.255";

/// Default address of the elevator server / simulator
pub static DEFAULT_ELEV_ADDR: &str = "localhost:15657";

/// Size of UDP receive buffer in bytes
pub const UDP_BUFFER: usize = u16::MAX as usize;

//
// ──────────────────────────────────────────────────────────────
//   2. SYSTEM & ELEVATOR PARAMETERS
// ──────────────────────────────────────────────────────────────
//

/// Number of floors served by every elevator
pub const N_FLOORS: usize = 4;

/// Buttons per floor: hall up, hall down, cab
pub const N_BUTTONS: usize = 3;

/// Hall buttons per floor: hall up, hall down
pub const N_HALL_BUTTONS: usize = 2;

/// Duration between elevator hardware polls
pub const ELEV_POLL: Duration = Duration::from_millis(25);

//
// ──────────────────────────────────────────────────────────────
//   3. TIMING & TIMEOUTS & INTERVALS
// ──────────────────────────────────────────────────────────────
//

/// How long the door stays open at a stop
pub const DOOR_OPEN_DURATION: Duration = Duration::from_secs(3);

/// Longest time allowed between floor arrivals while moving
pub const MOVEMENT_TIMEOUT: Duration = Duration::from_secs(4);

/// Period of the state broadcast
pub const BROADCAST_INTERVAL: Duration = Duration::from_millis(200);

/// Period of the conflict sweep + solver run
pub const ASSIGN_INTERVAL: Duration = Duration::from_millis(1000);

/// Period of the peer heartbeat
pub const PEER_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(15);

/// A peer without heartbeat for this long is reported as lost
pub const PEER_TIMEOUT: Duration = Duration::from_millis(500);

/// Extra time a lost peer gets before its hall calls are released
pub const DEPARTURE_GRACE: Duration = Duration::from_secs(3);

/// How often lost peers are checked against [`DEPARTURE_GRACE`]
pub const LIVENESS_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound on a single solver invocation
pub const SOLVER_TIMEOUT: Duration = Duration::from_secs(2);

/// Minimum time between two ledger status prints
pub const LEDGER_PRINT_INTERVAL: Duration = Duration::from_millis(2000);

//
// ──────────────────────────────────────────────────────────────
//   4. ISOLATION FALLBACK
// ──────────────────────────────────────────────────────────────
//

/// Consecutive assignment ticks with an unchanged roster size before it becomes the baseline
pub const BASELINE_STABLE_TICKS: u32 = 30;

/// Consecutive assignment ticks below baseline before the node takes over all hall calls it knows
pub const BASELINE_DROP_TICKS: u32 = 15;

//
// ──────────────────────────────────────────────────────────────
//   5. EXTERNAL FILES
// ──────────────────────────────────────────────────────────────
//

/// Default path of the hall request assigner executable
pub static HALL_REQUEST_ASSIGNER: &str = "./hall_request_assigner";

/// File name prefix of the per-elevator cab call backup (`cab_calls_<id>.json`)
pub static CAB_BACKUP_PREFIX: &str = "cab_calls_";

//
// ──────────────────────────────────────────────────────────────
//   6. LOGGING CONFIGURATION
// ──────────────────────────────────────────────────────────────
//

/// Enable/disable the periodic ledger table
pub static PRINT_LEDGER_ON: Lazy<Mutex<bool>> = Lazy::new(|| Mutex::new(false));

/// Enable/disable printing of errors
pub static PRINT_ERR_ON: Lazy<Mutex<bool>> = Lazy::new(|| Mutex::new(true));

/// Enable/disable printing of warnings
pub static PRINT_WARN_ON: Lazy<Mutex<bool>> = Lazy::new(|| Mutex::new(true));

/// Enable/disable printing of success messages
pub static PRINT_OK_ON: Lazy<Mutex<bool>> = Lazy::new(|| Mutex::new(true));

/// Enable/disable printing of general info
pub static PRINT_INFO_ON: Lazy<Mutex<bool>> = Lazy::new(|| Mutex::new(true));

/// Enable/disable miscellaneous debug prints
pub static PRINT_ELSE_ON: Lazy<Mutex<bool>> = Lazy::new(|| Mutex::new(true));
