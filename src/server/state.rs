//! Server-side session table (spec §3 "Server `client_state`").
//!
//! The original indexes `client_state` by raw file descriptor in a
//! `FD_SETSIZE` array (`gpsserver/server.c`'s `cstate[FD_SETSIZE]`). Per
//! SPEC_FULL's re-architecture guidance (§9), this keeps a map from a
//! stable session identifier — the client's declared `name` — to a value-
//! owned session record; there is no raw fd table and no manual free.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::net::UdpSocket;
use tokio::sync::oneshot;

use crate::codec::CtlFrame;

/// Event-type codes written to the events table (spec §4.8, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Ack = 4,
    Online = 7,
    Offline = 8,
    Timeout = 9,
}

/// A live UDP trigger sink: one per ONLINE client, born on CTL(ONLINE),
/// destroyed on CTL(OFFLINE) or prune timeout.
pub struct SinkState {
    pub ctl: CtlFrame,
    pub peer_addr: SocketAddr,
    pub unicast_socket: Arc<UdpSocket>,
    pub created_at: Instant,
    pub last_trigger_at: Instant,
    pub last_ack_at: Instant,
    /// Dropping this sender is the shutdown signal for the sink's ACK
    /// reader task; it fires the moment this `SinkState` is removed from
    /// the table (OFFLINE or prune), so the reader task exits and its
    /// `Arc<UdpSocket>` clone is released instead of blocking on
    /// `recv_from` forever.
    pub shutdown_tx: oneshot::Sender<()>,
}

/// Map of client name to its active sink. Enforces "at most one ONLINE
/// sink per client name" (spec §8 invariant 3).
#[derive(Default)]
pub struct SessionTable {
    sinks: HashMap<String, SinkState>,
}

impl SessionTable {
    pub fn new() -> Self {
        SessionTable::default()
    }

    pub fn is_online(&self, name: &str) -> bool {
        self.sinks.contains_key(name)
    }

    /// Inserts a new sink. Returns `false` without modifying the table if
    /// `name` is already online — the caller should reject the duplicate
    /// CTL(ONLINE) per spec §4.6.
    pub fn insert(&mut self, name: String, sink: SinkState) -> bool {
        if self.sinks.contains_key(&name) {
            return false;
        }
        self.sinks.insert(name, sink);
        true
    }

    pub fn remove(&mut self, name: &str) -> Option<SinkState> {
        self.sinks.remove(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut SinkState> {
        self.sinks.get_mut(name)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut SinkState)> {
        self.sinks.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn fake_ctl(name: &str) -> CtlFrame {
        CtlFrame {
            ctl: crate::codec::CtlCode::Online,
            uport: 7001,
            mport: 7002,
            bport: 7003,
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn rejects_duplicate_online_for_the_same_name() {
        let mut table = SessionTable::new();
        let sock = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 7001);

        let (shutdown_tx1, _shutdown_rx1) = oneshot::channel();
        let sink1 = SinkState {
            ctl: fake_ctl("c1"),
            peer_addr: addr,
            unicast_socket: sock.clone(),
            created_at: Instant::now(),
            last_trigger_at: Instant::now(),
            last_ack_at: Instant::now(),
            shutdown_tx: shutdown_tx1,
        };
        assert!(table.insert("c1".to_string(), sink1));

        let (shutdown_tx2, _shutdown_rx2) = oneshot::channel();
        let sink2 = SinkState {
            ctl: fake_ctl("c1"),
            peer_addr: addr,
            unicast_socket: sock,
            created_at: Instant::now(),
            last_trigger_at: Instant::now(),
            last_ack_at: Instant::now(),
            shutdown_tx: shutdown_tx2,
        };
        assert!(!table.insert("c1".to_string(), sink2));
        assert_eq!(table.len(), 1);
    }
}
