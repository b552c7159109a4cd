use log::{debug, error, info, logger, trace, Level};
use rudp_core::{PatternSource, PayloadSink, ReceiverEngine, SenderEngine};
use rudp_log::RudpLogger;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::time::Instant;

mod config;
mod error;
mod socket;

use error::AppError;
use socket::LossyUdpSocket;

/// Verifies every delivered segment against the deterministic generator
/// and tracks progress for the periodic report.
struct VerifyingSink {
    expected_total: u32,
    delivered: u64,
    mismatches: u64,
}

impl VerifyingSink {
    fn new(expected_total: u32) -> Self {
        VerifyingSink {
            expected_total,
            delivered: 0,
            mismatches: 0,
        }
    }
}

impl PayloadSink for VerifyingSink {
    fn deliver(&mut self, seq: u32, payload: bytes::Bytes) {
        let expected_byte = (seq % 256) as u8;
        if !payload.iter().all(|&b| b == expected_byte) {
            self.mismatches += 1;
            error!(target: "rudp_demo", "seq={seq} delivered with unexpected payload bytes");
        }
        trace!(target: "rudp_demo", "seq={seq} payload={}...", hex::encode(&payload[..payload.len().min(4)]));
        self.delivered += 1;
        if self.delivered % 1000 == 0 {
            info!(target: "rudp_demo", "delivered={} / {}", self.delivered, self.expected_total);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    RudpLogger::init(Level::Info)?;

    let config = match config::handle() {
        Ok(config) => config,
        Err(e) => {
            error!(target: "rudp_demo", "failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let bind_addr = SocketAddr::from_str(&config.network.bind_address)
        .expect("validated at config load time");
    let peer_addr = SocketAddr::from_str(&config.network.peer_address)
        .expect("validated at config load time");

    info!(target: "rudp_demo", "starting demo: sender {peer_addr} -> receiver {bind_addr}");

    let receiver_socket = Arc::new(LossyUdpSocket::new(
        UdpSocket::bind(bind_addr).await?,
        config.demo.packet_loss_rate,
    ));
    let sender_socket = Arc::new(LossyUdpSocket::new(
        UdpSocket::bind(peer_addr).await?,
        config.demo.packet_loss_rate,
    ));

    let transport_config = config.transport.to_transport_config();
    let total_packets = config.demo.total_packets;
    let recv_buf_len = rudp_core::wire::HEADER_SIZE + transport_config.payload_size + 64;

    let receiver_socket_for_task = receiver_socket.clone();
    let receiver_transport_config = transport_config.clone();
    let receiver_handle = tokio::spawn(async move {
        let mut receiver = ReceiverEngine::new(receiver_transport_config);
        let mut sink = VerifyingSink::new(total_packets);
        let mut buf = vec![0u8; recv_buf_len];
        loop {
            let (len, addr) = match receiver_socket_for_task.recv_from(&mut buf).await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(target: "rudp_demo", "receiver socket error: {e}");
                    break;
                }
            };
            if let Err(e) = receiver
                .handle_datagram(&*receiver_socket_for_task, &buf[..len], addr, &mut sink)
                .await
            {
                error!(target: "rudp_demo", "receiver engine error: {e}");
                break;
            }
            if sink.delivered >= total_packets as u64 {
                info!(target: "rudp_demo", "receiver finished: {} delivered, {} integrity mismatches", sink.delivered, sink.mismatches);
                break;
            }
        }
    });

    let start_time = Instant::now();
    let source = PatternSource::new(total_packets, transport_config.payload_size);
    let mut sender = SenderEngine::new(transport_config.clone(), bind_addr);
    let stats = sender.run(&*sender_socket, &source).await?;
    let elapsed = start_time.elapsed();

    receiver_handle.await.ok();

    let bits_sent = stats.segments_sent * transport_config.payload_size as u64 * 8;
    let mbps = if elapsed.as_secs_f64() > 0.0 {
        bits_sent as f64 / elapsed.as_secs_f64() / 1_000_000.0
    } else {
        0.0
    };
    let retransmission_rate = if stats.segments_sent > 0 {
        stats.retransmissions as f64 / stats.segments_sent as f64 * 100.0
    } else {
        0.0
    };

    info!(target: "rudp_demo", "--- transfer summary ---");
    info!(target: "rudp_demo", "elapsed: {:.3}s, throughput: {:.2} Mbps", elapsed.as_secs_f64(), mbps);
    info!(target: "rudp_demo", "segments sent: {}, retransmissions: {} ({:.2}%)", stats.segments_sent, stats.retransmissions, retransmission_rate);
    info!(target: "rudp_demo", "duplicate acks: {}", stats.duplicate_acks);
    info!(target: "rudp_demo", "cwnd: max={:.2} avg={:.2}", stats.max_cwnd, stats.avg_cwnd());
    info!(target: "rudp_demo", "final congestion phase: {:?}", stats.final_phase);
    debug!(target: "rudp_demo", "config used: {config:?}");

    logger().flush();
    Ok(())
}
