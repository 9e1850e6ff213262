#![warn(missing_docs)]
//! # Elevator mesh
//!
//! Every node runs one elevator and owns no special role. Hall calls are kept consistent across the
//! fleet by gossiping a versioned request ledger, and each call is served by whichever elevator the
//! hall request assigner picks for it.
//!
//! ## Overview
//! - **config**: Ports, timing and print flags.
//! - **init**: Command-line parsing.
//! - **print**: Colored terminal output and ledger tables.
//! - **elevio**: Elevator server driver and input pollers.
//! - **elevator_logic**: The per-elevator FSM.
//! - **world_view**: Request records, the local ledger and the wire message.
//! - **network**: UDP broadcast, peer heartbeats, gossip merge and the request-control loop.
//! - **manager**: Hall request assignment and ownership conflict resolution.
//! - **backup**: Cab call persistence across restarts.

pub mod config;

pub mod init;

pub mod print;

pub mod manager;

pub mod network;

pub mod world_view;

pub mod elevio;

pub mod elevator_logic;

pub mod backup;
