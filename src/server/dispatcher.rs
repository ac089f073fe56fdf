//! Server event loop (spec §4.6), grounded on `gpsserver/server.c`'s
//! `accept_client`/`read_ctlmsg`/`read_ackmsg`/`send_packets`/prune logic.
//!
//! The original multiplexes one listen socket, N TCP control sockets and
//! N UDP sinks on a single `select()`. Per the re-architecture's sanctioned
//! alternative (SPEC_FULL's REDESIGN FLAGS), this uses a reader task per
//! socket feeding a bounded channel into one central dispatcher task that
//! owns the `SessionTable` — there is still exactly one place that mutates
//! session state, just reached via messages instead of `select()` readiness.

use std::net::SocketAddr;
use std::time::Instant;

use log::{debug, error, info, warn};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;

use crate::codec::{AckFrame, CtlCode, CtlFrame, CTL_LEN};
use crate::config::ServerConfig;
use crate::errors::Error;
use crate::server::datastore::Datastore;
use crate::server::state::{EventType, SessionTable, SinkState};
use crate::server::trigger::send_trigger;

const DISPATCH_CHANNEL_CAPACITY: usize = 256;
const TICK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);

enum DispatchMsg {
    Ctl {
        peer_addr: SocketAddr,
        frame: CtlFrame,
    },
    Ack {
        name: String,
        frame: AckFrame,
        peer_addr: SocketAddr,
    },
}

/// Runs the server until a shutdown signal is received.
pub async fn run(config: ServerConfig) -> Result<(), Error> {
    config.log_summary();

    let datastore = Datastore::connect(&config).await?;
    let listener = TcpListener::bind(("0.0.0.0", config.control_port)).await?;
    info!("listening for CTL connections on port {}", config.control_port);

    let (tx, mut rx) = mpsc::channel(DISPATCH_CHANNEL_CAPACITY);

    let accept_tx = tx.clone();
    tokio::spawn(async move {
        accept_loop(listener, accept_tx).await;
    });

    let mut term_signal = signal(SignalKind::terminate()).map_err(Error::Io)?;
    let mut int_signal = signal(SignalKind::interrupt()).map_err(Error::Io)?;

    let mut table = SessionTable::new();
    let mut tick = interval(TICK_INTERVAL);

    loop {
        tokio::select! {
            _ = term_signal.recv() => {
                info!("received SIGTERM, shutting down");
                break;
            }
            _ = int_signal.recv() => {
                info!("received SIGINT, shutting down");
                break;
            }
            msg = rx.recv() => {
                match msg {
                    Some(DispatchMsg::Ctl { peer_addr, frame }) => {
                        handle_ctl(&mut table, &datastore, &config, peer_addr, frame, tx.clone()).await;
                    }
                    Some(DispatchMsg::Ack { name, frame, peer_addr }) => {
                        handle_ack(&mut table, &datastore, &name, frame, peer_addr).await;
                    }
                    None => {
                        // all senders dropped; only possible if the accept
                        // loop task panicked.
                        warn!("dispatch channel closed unexpectedly");
                        break;
                    }
                }
            }
            _ = tick.tick() => {
                run_tick(&mut table, &datastore, &config).await;
            }
        }
    }

    Ok(())
}

async fn accept_loop(listener: TcpListener, tx: mpsc::Sender<DispatchMsg>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                let tx = tx.clone();
                tokio::spawn(async move {
                    read_ctl_connection(stream, peer_addr, tx).await;
                });
            }
            Err(err) => {
                error!("accept failed: {err}");
            }
        }
    }
}

/// One TCP control connection is strictly one CTL frame: read it
/// (tolerating partial reads), decode, forward, then drop the connection.
async fn read_ctl_connection(mut stream: TcpStream, peer_addr: SocketAddr, tx: mpsc::Sender<DispatchMsg>) {
    use tokio::io::AsyncReadExt;

    let mut buf = [0u8; CTL_LEN];
    if let Err(err) = stream.read_exact(&mut buf).await {
        warn!("recv failed on CTL connection from {peer_addr}: {err}");
        return;
    }

    let frame = match CtlFrame::decode(&buf) {
        Ok(frame) => frame,
        Err(err) => {
            warn!("invalid CTL msg from {peer_addr}: {err}");
            return;
        }
    };

    let _ = tx.send(DispatchMsg::Ctl { peer_addr, frame }).await;
}

async fn handle_ctl(
    table: &mut SessionTable,
    datastore: &Datastore,
    config: &ServerConfig,
    peer_addr: SocketAddr,
    frame: CtlFrame,
    tx: mpsc::Sender<DispatchMsg>,
) {
    let client_ip = peer_addr.ip().to_string();
    debug!(
        "recvd CTL msg code={:?} client='{}' addr={client_ip}",
        frame.ctl, frame.name
    );

    match frame.ctl {
        CtlCode::Online => {
            if table.is_online(&frame.name) {
                warn!("client '{}' is already online", frame.name);
                return;
            }
            match UdpSocket::bind(("0.0.0.0", 0)).await {
                Ok(sock) => {
                    let sock = std::sync::Arc::new(sock);
                    let name = frame.name.clone();
                    let (shutdown_tx, shutdown_rx) = oneshot::channel();
                    let sink = SinkState {
                        ctl: frame,
                        peer_addr,
                        unicast_socket: sock.clone(),
                        created_at: Instant::now(),
                        last_trigger_at: Instant::now(),
                        last_ack_at: Instant::now(),
                        shutdown_tx,
                    };
                    table.insert(name.clone(), sink);
                    datastore
                        .insert_control_event(&name, &client_ip, EventType::Online, config.packet_interval.as_millis())
                        .await;
                    tokio::spawn(read_ack_socket(sock, name, tx, shutdown_rx));
                }
                Err(err) => {
                    error!("socket (unicast sink for '{}') failed: {err}", frame.name);
                }
            }
        }
        CtlCode::Offline => {
            if let Some(sink) = table.remove(&frame.name) {
                info!(
                    "client '{}' went offline, session duration: {}",
                    frame.name,
                    crate::utils::format_duration(&session_duration(&sink))
                );
                datastore
                    .insert_control_event(&frame.name, &client_ip, EventType::Offline, 0)
                    .await;
            } else {
                debug!("OFFLINE for unknown or already-offline client '{}'", frame.name);
            }
        }
    }
}

/// Reads ACK datagrams off a sink's own unicast socket and forwards them to
/// the central dispatcher. Exits on a socket error, or as soon as
/// `shutdown_rx` resolves — which happens the instant the owning
/// `SinkState` is removed from the table (OFFLINE or prune) and its
/// `shutdown_tx` is dropped, so this task never blocks on `recv_from`
/// past the sink's lifetime (spec §4.6 "close its socket, free state").
async fn read_ack_socket(
    sock: std::sync::Arc<UdpSocket>,
    name: String,
    tx: mpsc::Sender<DispatchMsg>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut buf = [0u8; crate::codec::ACK_LEN];
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                debug!("ACK socket for '{name}' shutting down");
                return;
            }
            res = sock.recv_from(&mut buf) => {
                match res {
                    Ok((n, peer_addr)) => {
                        if n != crate::codec::ACK_LEN {
                            continue;
                        }
                        match AckFrame::decode(&buf) {
                            Ok(frame) => {
                                if tx
                                    .send(DispatchMsg::Ack {
                                        name: name.clone(),
                                        frame,
                                        peer_addr,
                                    })
                                    .await
                                    .is_err()
                                {
                                    return;
                                }
                            }
                            Err(err) => {
                                warn!("invalid ACK msg from {peer_addr}: {err}");
                            }
                        }
                    }
                    Err(err) => {
                        debug!("ACK socket for '{name}' closed: {err}");
                        return;
                    }
                }
            }
        }
    }
}

async fn handle_ack(table: &mut SessionTable, datastore: &Datastore, name: &str, frame: AckFrame, peer_addr: SocketAddr) {
    let Some(sink) = table.get_mut(name) else {
        return;
    };
    sink.last_ack_at = Instant::now();
    let client_ip = peer_addr.ip().to_string();
    datastore.insert_ack_event(&frame, &client_ip).await;
}

async fn run_tick(table: &mut SessionTable, datastore: &Datastore, config: &ServerConfig) {
    let packet_interval = config.packet_interval.as_std();
    let prune_interval = config.prune_interval.as_std();
    let now = Instant::now();

    let mut timed_out = Vec::new();
    for (name, sink) in table.iter_mut() {
        if now.duration_since(sink.last_trigger_at) >= packet_interval {
            send_trigger(config, name, sink).await;
            sink.last_trigger_at = now;
        }
        if now.duration_since(sink.last_ack_at) >= prune_interval {
            timed_out.push(name.clone());
        }
    }

    for name in timed_out {
        if let Some(sink) = table.remove(&name) {
            let client_ip = sink.peer_addr.ip().to_string();
            warn!(
                "client '{name}' timed out, pruning sink, session duration: {}",
                crate::utils::format_duration(&session_duration(&sink))
            );
            datastore
                .insert_control_event(&name, &client_ip, EventType::Timeout, 0)
                .await;
        }
    }
}

/// Wall-clock lifetime of a sink, for the disconnect log line (mirrors
/// `pg_doorman::app::server`'s per-client session-duration logging).
fn session_duration(sink: &SinkState) -> chrono::Duration {
    chrono::Duration::from_std(sink.created_at.elapsed()).unwrap_or_default()
}
