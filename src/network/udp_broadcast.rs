//! ## Handles the UDP state broadcast
//!
//! Every node broadcasts its [`NetworkMessage`] on [`config::MSG_PORT`] and listens on the same port.
//! The request-control loop decides what and when to send; this module only moves bytes.

use crate::config;
use crate::print;
use crate::world_view::serial;
use crate::world_view::NetworkMessage;

use anyhow::Context;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

/// Creates a non-blocking UDP socket with broadcast and address reuse enabled, bound to `bind_addr`.
///
/// Several nodes on one machine can bind the same listen port.
pub fn broadcast_socket(bind_addr: SocketAddr) -> anyhow::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

    socket.set_nonblocking(true)?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket
        .bind(&bind_addr.into())
        .with_context(|| format!("could not bind UDP socket to {}", bind_addr))?;
    Ok(UdpSocket::from_std(socket.into())?)
}

/// Parses `<host>:<port>` into a socket address.
pub fn socket_addr(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("invalid socket address {}:{}", host, port))
}

// ### Starter og kjører udp-broadcaster
/// Starts and runs the UDP broadcaster
///
/// ## Parameters
/// `msg_rx`: Messages the request-control loop wants sent
///
/// ## Behavior
/// - Sets up a reusable broadcast socket
/// - Serializes every received message and broadcasts it on [`config::MSG_PORT`]
/// - Send errors are logged once per outage and never stop the loop
///
/// ## Returns
/// `Ok(())` when `msg_rx` closes, `Err` if the socket cannot be created.
///
/// ## Note
/// This function is permanently blocking, and should be called asynchronously
pub async fn start_udp_broadcaster(mut msg_rx: mpsc::Receiver<NetworkMessage>) -> anyhow::Result<()> {
    let broadcast_addr = socket_addr(config::BC_ADDR, config::MSG_PORT)?;
    let socket = broadcast_socket(socket_addr(config::BC_LISTEN_ADDR, 0)?)?;
    let mut failing = false;

    while let Some(msg) = msg_rx.recv().await {
        let Some(bytes) = serial::serialize_message(&msg) else {
            continue;
        };
        match socket.send_to(&bytes, broadcast_addr).await {
            Ok(_) => {
                if failing {
                    print::ok("UDP broadcast is sending again".to_string());
                }
                failing = false;
            }
            Err(e) => {
                if !failing {
                    print::err(format!("UDP broadcast failed: {} (udp_broadcast.rs, start_udp_broadcaster())", e));
                }
                failing = true;
            }
        }
    }
    Ok(())
}

// ### Starter og kjører udp-listener
/// Starts and runs the UDP listener
///
/// ## Parameters
/// `msg_tx`: Decoded messages towards the request-control loop
///
/// ## Behaviour
/// - Sets up a reusable listener on [`config::MSG_PORT`]
/// - Decodes every datagram, dropping the ones that are not a [`NetworkMessage`]
/// - Own messages are forwarded too, the gossip merge skips them
///
/// ## Returns
/// `Ok(())` when `msg_tx` closes, `Err` if the socket cannot be created.
///
/// ## Note
/// This function is permanently blocking, and should be called asynchronously
pub async fn start_udp_listener(msg_tx: mpsc::Sender<NetworkMessage>) -> anyhow::Result<()> {
    let socket = broadcast_socket(socket_addr(config::BC_LISTEN_ADDR, config::MSG_PORT)?)?;
    let mut buf = vec![0u8; config::UDP_BUFFER];

    loop {
        let len = match socket.recv_from(&mut buf).await {
            Ok((len, _)) => len,
            Err(e) => {
                print::warn(format!("UDP receive failed: {} (udp_broadcast.rs, start_udp_listener())", e));
                continue;
            }
        };
        if let Some(msg) = serial::deserialize_message(&buf[..len]) {
            if msg_tx.send(msg).await.is_err() {
                return Ok(());
            }
        }
    }
}
