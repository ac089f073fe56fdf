//! Integration test for the TGR -> ACK round trip over real loopback UDP
//! sockets (spec §8 scenario S1, minus the upstream datastore insert — that
//! leg needs a live Postgres instance and is covered by the unit tests on
//! `Datastore`'s query shape instead).

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use fleet_gps::codec::{AckFrame, TgrFrame, ACK_LEN, TGR_LEN};
use tokio::net::UdpSocket;
use tokio::time::timeout;

#[tokio::test]
async fn client_acks_a_trigger_sent_by_the_server() {
    let server_sock = Arc::new(UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap());
    let client_sock = Arc::new(UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap());

    let client_addr = client_sock.local_addr().unwrap();
    let server_addr = server_sock.local_addr().unwrap();

    let tgr = TgrFrame { tsp: 1_700_000_000 };
    server_sock.send_to(&tgr.encode(), client_addr).await.unwrap();

    let mut buf = [0u8; TGR_LEN];
    let (n, from) = timeout(Duration::from_secs(1), client_sock.recv_from(&mut buf))
        .await
        .expect("client should receive the TGR within 1s")
        .unwrap();
    assert_eq!(n, TGR_LEN);
    assert_eq!(from, server_addr);
    let decoded = TgrFrame::decode(&buf).expect("TGR must validate");
    assert_eq!(decoded.tsp, tgr.tsp);

    let ack = AckFrame {
        name: "C1".to_string(),
        latitude: "1.500000".to_string(),
        longitude: "2.500000".to_string(),
        tsp: 100,
    };
    client_sock.send_to(&ack.encode(), from).await.unwrap();

    let mut ack_buf = [0u8; ACK_LEN];
    let (n, from) = timeout(Duration::from_secs(1), server_sock.recv_from(&mut ack_buf))
        .await
        .expect("server should receive the ACK within 1s")
        .unwrap();
    assert_eq!(n, ACK_LEN);
    assert_eq!(from.ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
    let decoded_ack = AckFrame::decode(&ack_buf).expect("ACK must validate");
    assert_eq!(decoded_ack.name, "C1");
    assert_eq!(decoded_ack.latitude, "1.500000");
    assert_eq!(decoded_ack.longitude, "2.500000");
    assert_eq!(decoded_ack.tsp, 100);
}

#[tokio::test]
async fn a_corrupted_tgr_is_rejected_by_the_codec_but_still_arrives() {
    let server_sock = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let client_sock = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let client_addr = client_sock.local_addr().unwrap();

    let tgr = TgrFrame { tsp: 42 };
    let mut encoded = tgr.encode();
    encoded[10] ^= 0xff; // flip a byte inside the CRC-covered reserved region

    server_sock.send_to(&encoded, client_addr).await.unwrap();

    let mut buf = [0u8; TGR_LEN];
    let (n, _) = timeout(Duration::from_secs(1), client_sock.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, TGR_LEN);
    // the datagram arrives, but packet_validation would reject it: this is
    // what spec §4.5's "if packet_validation is enabled... drop silently"
    // branch guards against.
    assert!(TgrFrame::decode(&buf).is_err());
}
