//! Peer heartbeat transport.
//!
//! Each node broadcasts its ID on [`config::PEER_PORT`] every [`config::PEER_HEARTBEAT_INTERVAL`].
//! The receiver remembers when it last heard each ID and reports a [`PeerUpdate`] whenever an ID
//! shows up or stays silent for longer than [`config::PEER_TIMEOUT`]. The local node hears its own
//! heartbeat, so losing the network makes it report itself lost.

use std::collections::HashMap;
use std::str;

use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

use super::udp_broadcast::{broadcast_socket, socket_addr};
use super::PeerUpdate;
use crate::config;
use crate::print;

/// Last-seen bookkeeping behind the heartbeat receiver.
#[derive(Debug)]
pub struct PeerLiveness {
    last_seen: HashMap<String, Instant>,
    timeout: Duration,
}

impl PeerLiveness {
    /// Creates an empty table that loses peers after `timeout` of silence.
    pub fn new(timeout: Duration) -> Self {
        PeerLiveness { last_seen: HashMap::new(), timeout }
    }

    /// Registers a heartbeat (if any) and expires silent peers.
    ///
    /// ## Returns
    /// A [`PeerUpdate`] if a peer appeared or was lost, `None` otherwise.
    pub fn poll(&mut self, heard: Option<&str>, now: Instant) -> Option<PeerUpdate> {
        let mut update = PeerUpdate::default();
        let mut modified = false;

        if let Some(id) = heard {
            if !self.last_seen.contains_key(id) {
                update.new = Some(id.to_string());
                modified = true;
            }
            self.last_seen.insert(id.to_string(), now);
        }

        for (id, when) in &self.last_seen {
            if now.saturating_duration_since(*when) > self.timeout {
                update.lost.push(id.clone());
                modified = true;
            }
        }
        for id in &update.lost {
            self.last_seen.remove(id);
        }

        if !modified {
            return None;
        }
        update.peers = self.last_seen.keys().cloned().collect();
        update.peers.sort();
        update.lost.sort();
        Some(update)
    }
}

/// Broadcasts `id` every [`config::PEER_HEARTBEAT_INTERVAL`].
///
/// ## Returns
/// `Err` only if the socket cannot be created. Send errors are logged once per outage.
///
/// ## Note
/// This function is permanently blocking, and should be called asynchronously
pub async fn heartbeat_tx(id: String) -> anyhow::Result<()> {
    let dest = socket_addr(config::BC_ADDR, config::PEER_PORT)?;
    let socket = broadcast_socket(socket_addr(config::BC_LISTEN_ADDR, 0)?)?;
    let mut ticker = tokio::time::interval(config::PEER_HEARTBEAT_INTERVAL);
    let mut failing = false;

    loop {
        ticker.tick().await;
        match socket.send_to(id.as_bytes(), dest).await {
            Ok(_) => failing = false,
            Err(e) => {
                if !failing {
                    print::err(format!("Heartbeat send failed: {} (peers.rs, heartbeat_tx())", e));
                }
                failing = true;
            }
        }
    }
}

/// Listens for heartbeats and forwards membership changes on `update_tx`.
///
/// ## Returns
/// `Ok(())` once `update_tx` closes, `Err` if the socket cannot be created.
///
/// ## Note
/// This function is permanently blocking, and should be called asynchronously
pub async fn peer_rx(update_tx: mpsc::Sender<PeerUpdate>) -> anyhow::Result<()> {
    let socket = broadcast_socket(socket_addr(config::BC_LISTEN_ADDR, config::PEER_PORT)?)?;
    let mut liveness = PeerLiveness::new(config::PEER_TIMEOUT);
    let mut buf = [0u8; 1024];

    loop {
        let heard = match tokio::time::timeout(config::PEER_TIMEOUT, socket.recv(&mut buf)).await {
            Ok(Ok(n)) => str::from_utf8(&buf[..n]).ok().map(str::to_string),
            Ok(Err(e)) => {
                print::warn(format!("Heartbeat receive failed: {} (peers.rs, peer_rx())", e));
                None
            }
            Err(_) => None,
        };

        if let Some(update) = liveness.poll(heard.as_deref(), Instant::now()) {
            if update_tx.send(update).await.is_err() {
                return Ok(());
            }
        }
    }
}
