//! Client top-level state machine (spec §4.5), grounded on `client.c`'s
//! `main`/`read_sockets`/`send_ctlmsg`/`signal_handler`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use log::{debug, error, info, warn};
use socket2::{Domain, Socket, Type};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{watch, RwLock};

use crate::client::dbconfig::{self, DbConfig};
use crate::client::drainer;
use crate::client::gps::GpsReader;
use crate::client::spool::{DbData, Spool, PACKET_TYPE_BCAST, PACKET_TYPE_MANUAL, PACKET_TYPE_MCAST, PACKET_TYPE_UCAST};
use crate::codec::{AckFrame, CtlCode, CtlFrame, TGR_LEN};
use crate::config::ClientConfig;
use crate::errors::{ClientError, Error};

/// How often the main loop re-checks the upstream `db_config` row for
/// changes (spec's SUPPLEMENTED FROM ORIGINAL SOURCE item 2).
const CONFIG_REFETCH_INTERVAL: StdDuration = StdDuration::from_secs(5);

enum SocketKind {
    Unicast,
    Multicast,
    Broadcast,
}

pub async fn run(config: ClientConfig) -> Result<(), Error> {
    config.log_summary();

    let spool = Arc::new(Spool::open(&config.buffer_file)?);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    spawn_signal_listener(shutdown_tx);

    let drainer_handle = tokio::spawn(drainer::run(config.clone(), spool.clone(), shutdown_rx.clone()));

    let gps = GpsReader::connect(&config.gpsd_addr, config.gpsd_port).await?;

    let initial = dbconfig::fetch_with_retry(&config).await?;
    initial.log_summary();
    let server_ip = dbconfig::resolve_server_addr(&initial.server_host).await?;

    let dbcfg = Arc::new(RwLock::new(initial));
    let server_ip = Arc::new(RwLock::new(server_ip));

    tokio::spawn(self_sample_loop(
        gps.clone(),
        spool.clone(),
        config.clone(),
        dbcfg.clone(),
        shutdown_rx.clone(),
    ));

    let mut last_config_fetch = Instant::now();

    'register: loop {
        if *shutdown_rx.borrow() {
            break;
        }

        if last_config_fetch.elapsed() >= CONFIG_REFETCH_INTERVAL {
            info!("attempting to reread config from database");
            match dbconfig::fetch_once(&config).await {
                Ok(Some(fresh)) => {
                    fresh.log_summary();
                    if let Ok(ip) = dbconfig::resolve_server_addr(&fresh.server_host).await {
                        *server_ip.write().await = ip;
                    }
                    *dbcfg.write().await = fresh;
                    last_config_fetch = Instant::now();
                }
                _ => {
                    let retry = dbcfg.read().await.server_retryival;
                    tokio::time::sleep(retry).await;
                    continue 'register;
                }
            }
        }

        let snapshot = dbcfg.read().await.clone();
        let ip = *server_ip.read().await;

        if let Err(err) = send_ctl(ip, snapshot.server_ctlport, &ctl_frame(&config, &snapshot, CtlCode::Online)).await {
            warn!("could not register with server: {err}");
            tokio::time::sleep(snapshot.server_retryival).await;
            continue 'register;
        }
        info!("sent CTL msg status=CLIENT_ONLINE");

        let sockets = match prepare_sockets(&config, &snapshot).await {
            Ok(s) => s,
            Err(err) => {
                error!("unable to prepare sockets: {err}");
                return Err(Error::Client(ClientError::Register(err)));
            }
        };

        let registered_at = Instant::now();
        let lost = receive_loop(
            &config,
            &snapshot,
            &gps,
            &spool,
            sockets,
            &mut shutdown_rx,
        )
        .await;
        let session_duration = chrono::Duration::from_std(registered_at.elapsed()).unwrap_or_default();

        if *shutdown_rx.borrow() {
            let _ = send_ctl(ip, snapshot.server_ctlport, &ctl_frame(&config, &snapshot, CtlCode::Offline)).await;
            info!(
                "sent CTL msg status=CLIENT_OFFLINE, session duration: {}",
                crate::utils::format_duration(&session_duration)
            );
            break;
        }

        if lost {
            info!(
                "TGR msg recv was timeout, returning to register, session duration: {}",
                crate::utils::format_duration(&session_duration)
            );
        }
    }

    info!("processing buffer records");
    let _ = drainer_handle.await;
    Ok(())
}

fn ctl_frame(config: &ClientConfig, dbcfg: &DbConfig, ctl: CtlCode) -> CtlFrame {
    CtlFrame {
        ctl,
        uport: dbcfg.ucast_port,
        mport: dbcfg.mcast_port,
        bport: dbcfg.bcast_port,
        name: config.client_name.clone(),
    }
}

async fn send_ctl(server_ip: IpAddr, server_ctlport: u16, frame: &CtlFrame) -> std::io::Result<()> {
    let mut stream = TcpStream::connect((server_ip, server_ctlport)).await?;
    stream.write_all(&frame.encode()).await?;
    Ok(())
}

fn parse_bind_addr(addr: &str) -> Ipv4Addr {
    if addr == "0.0.0.0" {
        return Ipv4Addr::UNSPECIFIED;
    }
    addr.parse().unwrap_or_else(|_| {
        warn!("invalid address {addr}");
        Ipv4Addr::UNSPECIFIED
    })
}

struct ClientSockets {
    ucast: UdpSocket,
    mcast: UdpSocket,
    bcast: UdpSocket,
}

async fn prepare_sockets(config: &ClientConfig, dbcfg: &DbConfig) -> std::io::Result<ClientSockets> {
    let bind_ip = parse_bind_addr(&config.client_addr);

    let ucast = bind_udp(bind_ip, dbcfg.ucast_port, None, false)?;
    let mcast = bind_udp(bind_ip, dbcfg.mcast_port, Some(&dbcfg.mcast_group), false)?;
    let bcast = bind_udp(bind_ip, dbcfg.bcast_port, None, true)?;

    Ok(ClientSockets {
        ucast: UdpSocket::from_std(ucast.into())?,
        mcast: UdpSocket::from_std(mcast.into())?,
        bcast: UdpSocket::from_std(bcast.into())?,
    })
}

fn bind_udp(bind_ip: Ipv4Addr, port: u16, mcast_group: Option<&str>, broadcast: bool) -> std::io::Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, None)?;
    socket.set_reuse_address(true)?;
    if broadcast {
        socket.set_broadcast(true)?;
    }
    if let Some(group) = mcast_group {
        if let Ok(group_addr) = group.parse::<Ipv4Addr>() {
            socket.join_multicast_v4(&group_addr, &Ipv4Addr::UNSPECIFIED)?;
        } else {
            warn!("invalid mcast group addr {group}");
        }
    }
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::new(IpAddr::V4(bind_ip), port).into())?;
    Ok(socket)
}

/// Returns `true` if the loop exited due to a receive-timeout (back to
/// Register), `false` if it exited due to shutdown.
async fn receive_loop(
    config: &ClientConfig,
    dbcfg: &DbConfig,
    gps: &GpsReader,
    spool: &Spool,
    sockets: ClientSockets,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> bool {
    let mut tick = tokio::time::interval(StdDuration::from_secs(1));
    let mut last_trigger_recv = Instant::now();
    let mut ucast_buf = [0u8; TGR_LEN];
    let mut mcast_buf = [0u8; TGR_LEN];
    let mut bcast_buf = [0u8; TGR_LEN];

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    return false;
                }
            }
            _ = tick.tick() => {
                if last_trigger_recv.elapsed() >= dbcfg.server_retryival {
                    debug!("TGR msg recv was timeout");
                    return true;
                }
            }
            res = sockets.ucast.recv_from(&mut ucast_buf) => {
                if handle_datagram(config, dbcfg, gps, spool, &sockets.ucast, SocketKind::Unicast, res, &mut ucast_buf).await {
                    last_trigger_recv = Instant::now();
                }
            }
            res = sockets.mcast.recv_from(&mut mcast_buf) => {
                handle_datagram(config, dbcfg, gps, spool, &sockets.ucast, SocketKind::Multicast, res, &mut mcast_buf).await;
            }
            res = sockets.bcast.recv_from(&mut bcast_buf) => {
                handle_datagram(config, dbcfg, gps, spool, &sockets.ucast, SocketKind::Broadcast, res, &mut bcast_buf).await;
            }
        }
    }
}

/// Handles one inbound datagram on any of the three sockets. Returns
/// `true` iff it was a valid unicast TGR that produced an ACK reply
/// (used by the caller to refresh the liveness timer).
async fn handle_datagram(
    config: &ClientConfig,
    dbcfg: &DbConfig,
    gps: &GpsReader,
    spool: &Spool,
    ucast_socket: &UdpSocket,
    kind: SocketKind,
    res: std::io::Result<(usize, SocketAddr)>,
    buf: &mut [u8; TGR_LEN],
) -> bool {
    let kind_name = match kind {
        SocketKind::Unicast => "ucast",
        SocketKind::Multicast => "mcast",
        SocketKind::Broadcast => "bcast",
    };

    let (n, peer_addr) = match res {
        Ok(v) => v,
        Err(err) => {
            warn!("recvfrom: {err}");
            return false;
        }
    };
    if n != TGR_LEN {
        warn!("invalid TGR msg length type={kind_name}");
        return false;
    }

    if dbcfg.packet_validation {
        if crate::codec::TgrFrame::decode(&buf[..]).is_err() {
            warn!("invalid TGR msg type={kind_name} addr={peer_addr}");
            return false;
        }
    }
    debug!("recvd TGR msg type={kind_name} addr={peer_addr}");

    let Some(fix) = gps.read_fix().await else {
        warn!("no data from gpsd type={kind_name} addr={peer_addr}");
        return false;
    };

    let packet_type = match kind {
        SocketKind::Unicast => PACKET_TYPE_UCAST,
        SocketKind::Multicast => PACKET_TYPE_MCAST,
        SocketKind::Broadcast => PACKET_TYPE_BCAST,
    };
    let row = DbData {
        client_name: config.client_name.clone(),
        client_ip: config.client_addr.clone(),
        sender_ip: peer_addr.ip().to_string(),
        gps_tsp: fix.time,
        gps_lat: fix.latitude,
        gps_lon: fix.longitude,
        packet_type,
    };
    if let Err(err) = spool.insert(&row).await {
        error!("could not insert buffer row: {err}");
    }

    if matches!(kind, SocketKind::Unicast) {
        let ack = AckFrame {
            name: config.client_name.clone(),
            latitude: format!("{:.6}", fix.latitude),
            longitude: format!("{:.6}", fix.longitude),
            tsp: fix.time as u32,
        };
        if let Err(err) = ucast_socket.send_to(&ack.encode(), peer_addr).await {
            warn!("sendto: {err}");
            return false;
        }
        debug!("sent ACK msg lat={} lon={} tsp={}", fix.latitude, fix.longitude, fix.time as u32);
        return true;
    }
    false
}

async fn self_sample_loop(
    gps: GpsReader,
    spool: Arc<Spool>,
    config: ClientConfig,
    dbcfg: Arc<RwLock<DbConfig>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let interval = dbcfg.read().await.location_writeival;
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    return;
                }
            }
        }

        if let Some(fix) = gps.read_fix().await {
            let row = DbData {
                client_name: config.client_name.clone(),
                client_ip: String::new(),
                sender_ip: String::new(),
                gps_tsp: fix.time,
                gps_lat: fix.latitude,
                gps_lon: fix.longitude,
                packet_type: PACKET_TYPE_MANUAL,
            };
            debug!("location write tsp={} lat={} lon={}", fix.time, fix.latitude, fix.longitude);
            if let Err(err) = spool.insert(&row).await {
                error!("could not insert self-sample row: {err}");
            }
        }
    }
}

fn spawn_signal_listener(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let mut term = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(err) => {
                error!("could not install SIGTERM handler: {err}");
                return;
            }
        };
        let mut int = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(err) => {
                error!("could not install SIGINT handler: {err}");
                return;
            }
        };
        tokio::select! {
            _ = term.recv() => info!("got TERM signal, sending OFFLINE status"),
            _ = int.recv() => info!("got INT signal, sending OFFLINE status"),
        }
        let _ = shutdown_tx.send(true);
    });
}
