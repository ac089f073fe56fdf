//! Trigger dispatch (spec §4.7, grounded on `gpsserver/server.c`'s
//! `send_packets`).

use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use log::warn;
use socket2::{Domain, Socket, Type};
use tokio::net::UdpSocket;

use crate::codec::TgrFrame;
use crate::config::ServerConfig;
use crate::server::state::SinkState;

fn now_unix_seconds() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

fn ephemeral_udp_socket(broadcast: bool) -> std::io::Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, None)?;
    if broadcast {
        socket.set_broadcast(true)?;
    }
    socket.set_nonblocking(true)?;
    Ok(socket)
}

/// Sends one TGR datagram to `sink` on every delivery mode enabled in
/// `config`. Per the re-architecture's open-question decision (SPEC_FULL
/// §"SUPPLEMENTED..."/original open question 1), unicast reuses the
/// sink's own socket; multicast and broadcast use a fresh ephemeral
/// socket each, matching the source exactly.
pub async fn send_trigger(config: &ServerConfig, name: &str, sink: &SinkState) {
    let tgr = TgrFrame {
        tsp: now_unix_seconds(),
    };
    let payload = tgr.encode();

    if config.unicast_enable {
        let port = if config.clientport_enable {
            sink.ctl.uport
        } else {
            config.unicast_port
        };
        let dest = SocketAddr::new(sink.peer_addr.ip(), port);
        if let Err(err) = sink.unicast_socket.send_to(&payload, dest).await {
            warn!("sendto (unicast) failed for '{name}' at {dest}: {err}");
        }
    }

    if config.multicast_enable {
        let port = if config.clientport_enable {
            sink.ctl.mport
        } else {
            config.multicast_port
        };
        send_via_ephemeral(name, "mcast", sink.peer_addr.ip(), port, &payload, false).await;
    }

    if config.broadcast_enable {
        let port = if config.clientport_enable {
            sink.ctl.bport
        } else {
            config.broadcast_port
        };
        send_via_ephemeral(name, "bcast", sink.peer_addr.ip(), port, &payload, true).await;
    }
}

async fn send_via_ephemeral(
    name: &str,
    kind: &str,
    ip: std::net::IpAddr,
    port: u16,
    payload: &[u8],
    broadcast: bool,
) {
    let socket = match ephemeral_udp_socket(broadcast) {
        Ok(s) => s,
        Err(err) => {
            warn!("socket (for {kind} trigger to '{name}') failed: {err}");
            return;
        }
    };
    let socket: std::net::UdpSocket = socket.into();
    let socket = match UdpSocket::from_std(socket) {
        Ok(s) => s,
        Err(err) => {
            warn!("from_std (for {kind} trigger to '{name}') failed: {err}");
            return;
        }
    };
    let dest = SocketAddr::new(ip, port);
    if let Err(err) = socket.send_to(payload, dest).await {
        warn!("sendto ({kind}) failed for '{name}' at {dest}: {err}");
    }
}
