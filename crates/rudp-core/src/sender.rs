use crate::config::TransportConfig;
use crate::congestion::{CongestionController, CongestionPhase};
use crate::crypto::CryptoSession;
use crate::error::TransportError;
use crate::socket::DatagramSocket;
use crate::wire::{Packet, PacketType};
use bytes::Bytes;
use log::{debug, info, trace, warn};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::time::timeout;

/// Supplies the plaintext segments the sender engine transmits, in order
/// starting from seq 0.
pub trait PayloadSource {
    /// Total number of segments this source will ever produce.
    fn total_segments(&self) -> u32;
    /// The plaintext bytes for segment `seq`. Called at most once per seq.
    fn segment(&self, seq: u32) -> Bytes;
}

/// A deterministic `PayloadSource` matching the reference generator: each
/// segment is `segment_size` repetitions of `seq % 256`.
pub struct PatternSource {
    total: u32,
    segment_size: usize,
}

impl PatternSource {
    pub fn new(total: u32, segment_size: usize) -> Self {
        PatternSource { total, segment_size }
    }
}

impl PayloadSource for PatternSource {
    fn total_segments(&self) -> u32 {
        self.total
    }

    fn segment(&self, seq: u32) -> Bytes {
        Bytes::from(vec![(seq % 256) as u8; self.segment_size])
    }
}

/// Running counters surfaced once the transfer completes, used for the
/// end-of-run report.
#[derive(Debug, Default, Clone)]
pub struct TransferStats {
    pub segments_sent: u64,
    pub retransmissions: u64,
    pub duplicate_acks: u64,
    pub max_cwnd: f64,
    cwnd_sample_sum: f64,
    cwnd_sample_count: u64,
    pub final_phase: Option<CongestionPhase>,
}

impl TransferStats {
    pub fn avg_cwnd(&self) -> f64 {
        if self.cwnd_sample_count == 0 {
            0.0
        } else {
            self.cwnd_sample_sum / self.cwnd_sample_count as f64
        }
    }
}

struct InflightEntry {
    bytes: Bytes,
    sent_at: Instant,
}

/// The sender-side half of the transport: handshake initiator, window
/// filler, and RTO-driven retransmitter.
pub struct SenderEngine {
    config: TransportConfig,
    send_base: u32,
    next_seq: u32,
    inflight: BTreeMap<u32, InflightEntry>,
    congestion: CongestionController,
    peer_rwnd: u16,
    crypto: CryptoSession,
    peer_addr: SocketAddr,
    stats: TransferStats,
}

impl SenderEngine {
    pub fn new(config: TransportConfig, peer_addr: SocketAddr) -> Self {
        let congestion = CongestionController::new(
            config.init_cwnd,
            config.init_ssthresh,
            config.dup_ack_threshold,
        );
        SenderEngine {
            config,
            send_base: 0,
            next_seq: 0,
            inflight: BTreeMap::new(),
            congestion,
            peer_rwnd: u16::MAX,
            crypto: CryptoSession::new(),
            peer_addr,
            stats: TransferStats::default(),
        }
    }

    /// Performs the nonce exchange, blocking (behind a bounded timeout)
    /// until the peer responds or the handshake times out.
    pub async fn handshake<S: DatagramSocket>(&mut self, socket: &S) -> Result<(), TransportError> {
        let client_nonce = CryptoSession::generate_nonce();
        let req = Packet::nonce_req(Bytes::copy_from_slice(&client_nonce));
        socket.send_to(&req.encode(), self.peer_addr).await?;

        let mut buf = [0u8; 64];
        let recv = timeout(self.config.handshake_timeout, socket.recv_from(&mut buf))
            .await
            .map_err(|_| TransportError::HandshakeTimeout)?;
        let (len, _addr) = recv?;
        let resp = Packet::decode(&buf[..len])?;
        if resp.ptype != PacketType::NonceResp {
            return Err(TransportError::HandshakeTimeout);
        }

        self.crypto.derive_session_key(&client_nonce, &resp.payload);
        info!(target: "rudp_core::sender", "crypto handshake completed with {}", self.peer_addr);
        Ok(())
    }

    fn effective_window(&self) -> u32 {
        self.congestion.window().min(self.peer_rwnd as u32)
    }

    async fn fill_window<S: DatagramSocket, Src: PayloadSource>(
        &mut self,
        socket: &S,
        source: &Src,
    ) -> Result<(), TransportError> {
        let total = source.total_segments();
        while self.next_seq < total
            && (self.next_seq - self.send_base) < self.effective_window()
        {
            let plaintext = source.segment(self.next_seq);
            let wire_payload = self.crypto.encrypt(&plaintext, self.next_seq)?;
            let packet = Packet::data(self.next_seq, Bytes::from(wire_payload));
            let encoded = packet.encode();
            socket.send_to(&encoded, self.peer_addr).await?;
            trace!(target: "rudp_core::sender", "sent seq={}", self.next_seq);
            self.inflight.insert(
                self.next_seq,
                InflightEntry {
                    bytes: encoded,
                    sent_at: Instant::now(),
                },
            );
            self.stats.segments_sent += 1;
            self.next_seq += 1;
        }
        Ok(())
    }

    async fn poll_ack<S: DatagramSocket>(&mut self, socket: &S) -> Result<(), TransportError> {
        let mut buf = [0u8; 64];
        let recv = timeout(self.config.recv_poll, socket.recv_from(&mut buf)).await;
        let (len, _addr) = match recv {
            Ok(result) => result?,
            Err(_) => return Ok(()),
        };

        let packet = match Packet::decode(&buf[..len]) {
            Ok(p) => p,
            Err(e) => {
                warn!(target: "rudp_core::sender", "dropping malformed ACK: {e}");
                return Ok(());
            }
        };
        if packet.ptype != PacketType::Ack {
            return Ok(());
        }

        self.peer_rwnd = packet.rwnd;

        if packet.ack > self.send_base {
            self.inflight.retain(|&seq, _| seq >= packet.ack);
            self.send_base = packet.ack;
            self.congestion.ack_received(packet.ack);
        } else if packet.ack == self.send_base {
            self.stats.duplicate_acks += 1;
            self.congestion.ack_received(packet.ack);
            debug!(target: "rudp_core::sender", "duplicate ack for {}", packet.ack);
        }
        // ack < send_base: stale, ignore.

        self.stats.max_cwnd = self.stats.max_cwnd.max(self.congestion.cwnd);
        self.stats.cwnd_sample_sum += self.congestion.cwnd;
        self.stats.cwnd_sample_count += 1;
        Ok(())
    }

    async fn retransmit_on_timeout<S: DatagramSocket>(
        &mut self,
        socket: &S,
    ) -> Result<(), TransportError> {
        let Some(entry) = self.inflight.get_mut(&self.send_base) else {
            return Ok(());
        };
        if entry.sent_at.elapsed() < self.config.rto {
            return Ok(());
        }

        socket.send_to(&entry.bytes, self.peer_addr).await?;
        entry.sent_at = Instant::now();
        self.stats.retransmissions += 1;
        self.congestion.timeout_occurred();
        warn!(target: "rudp_core::sender", "RTO fired, retransmitting seq={}", self.send_base);
        Ok(())
    }

    /// Drives the full transfer to completion and returns the final
    /// statistics.
    pub async fn run<S: DatagramSocket, Src: PayloadSource>(
        &mut self,
        socket: &S,
        source: &Src,
    ) -> Result<TransferStats, TransportError> {
        self.handshake(socket).await?;
        let total = source.total_segments();

        while self.send_base < total {
            self.fill_window(socket, source).await?;
            self.poll_ack(socket).await?;
            self.retransmit_on_timeout(socket).await?;
        }

        self.stats.final_phase = Some(self.congestion.phase);
        info!(
            target: "rudp_core::sender",
            "transfer complete: {} segments, {} retransmissions, {} duplicate acks",
            total, self.stats.retransmissions, self.stats.duplicate_acks
        );
        Ok(self.stats.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receiver::{PayloadSink, ReceiverEngine};
    use crate::socket::{DatagramFault, LoopbackSocket};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct CollectingSink {
        delivered: Vec<(u32, Bytes)>,
    }

    impl PayloadSink for CollectingSink {
        fn deliver(&mut self, seq: u32, payload: Bytes) {
            self.delivered.push((seq, payload));
        }
    }

    /// Config with a short RTO and poll interval so RTO-driven tests don't
    /// spend real wall-clock time waiting on the default 200ms timer.
    fn fast_retransmit_config() -> TransportConfig {
        TransportConfig {
            rto: std::time::Duration::from_millis(40),
            recv_poll: std::time::Duration::from_millis(15),
            ..TransportConfig::default()
        }
    }

    /// Extracts the seq field of an encoded `Packet::data` datagram, or
    /// `None` if it isn't a data packet.
    fn data_seq(buf: &[u8]) -> Option<u32> {
        if buf.len() < 5 || buf[0] != 0 {
            return None;
        }
        Some(u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]))
    }

    #[tokio::test]
    async fn end_to_end_transfer_delivers_every_segment_in_order() {
        let send_addr: SocketAddr = "127.0.0.1:21001".parse().unwrap();
        let recv_addr: SocketAddr = "127.0.0.1:21002".parse().unwrap();
        let (send_socket, recv_socket) = LoopbackSocket::pair(send_addr, recv_addr);

        let total = 12u32;
        let source = PatternSource::new(total, 32);
        let mut sender = SenderEngine::new(TransportConfig::default(), recv_addr);

        let mut receiver = ReceiverEngine::new(TransportConfig::default());
        let mut sink = CollectingSink { delivered: vec![] };

        let receiver_task = async {
            loop {
                let mut buf = vec![0u8; 4096];
                let (len, addr) = recv_socket.recv_from(&mut buf).await.unwrap();
                receiver
                    .handle_datagram(&*recv_socket, &buf[..len], addr, &mut sink)
                    .await
                    .unwrap();
                if sink.delivered.len() as u32 == total {
                    break;
                }
            }
        };

        let sender_task = sender.run(&*send_socket, &source);

        let (_, stats) = tokio::join!(receiver_task, sender_task);
        let stats = stats.unwrap();

        assert_eq!(sink.delivered.len(), total as usize);
        for (i, (seq, payload)) in sink.delivered.iter().enumerate() {
            assert_eq!(*seq, i as u32);
            assert_eq!(payload.as_ref(), source.segment(i as u32).as_ref());
        }
        assert!(stats.segments_sent >= total as u64);
    }

    #[tokio::test]
    async fn dropped_segment_is_recovered_by_retransmit_and_cascade() {
        let send_addr: SocketAddr = "127.0.0.1:21005".parse().unwrap();
        let recv_addr: SocketAddr = "127.0.0.1:21006".parse().unwrap();
        let (send_socket, recv_socket) = LoopbackSocket::pair(send_addr, recv_addr);

        let config = fast_retransmit_config();
        let total = 10u32;
        let source = PatternSource::new(total, 16);
        let mut sender = SenderEngine::new(config.clone(), recv_addr);
        let mut receiver = ReceiverEngine::new(config);
        let mut sink = CollectingSink { delivered: vec![] };

        let dropped_once = Arc::new(AtomicBool::new(false));
        let hook_flag = dropped_once.clone();
        send_socket.set_fault(move |buf| {
            if data_seq(buf) == Some(3) && !hook_flag.swap(true, Ordering::SeqCst) {
                DatagramFault::Drop
            } else {
                DatagramFault::Pass
            }
        });

        let receiver_task = async {
            loop {
                let mut buf = vec![0u8; 4096];
                let (len, addr) = recv_socket.recv_from(&mut buf).await.unwrap();
                receiver
                    .handle_datagram(&*recv_socket, &buf[..len], addr, &mut sink)
                    .await
                    .unwrap();
                if sink.delivered.len() as u32 == total {
                    break;
                }
            }
        };
        let sender_task = sender.run(&*send_socket, &source);

        let (_, stats) = tokio::join!(receiver_task, sender_task);
        let stats = stats.unwrap();

        assert!(dropped_once.load(Ordering::SeqCst), "fault hook never fired");
        assert_eq!(sink.delivered.len(), total as usize);
        for (i, (seq, payload)) in sink.delivered.iter().enumerate() {
            assert_eq!(*seq, i as u32);
            assert_eq!(payload.as_ref(), source.segment(i as u32).as_ref());
        }
        assert!(stats.retransmissions >= 1);
    }

    #[tokio::test]
    async fn corrupted_segment_is_silently_dropped_then_recovered_by_retransmit() {
        let send_addr: SocketAddr = "127.0.0.1:21007".parse().unwrap();
        let recv_addr: SocketAddr = "127.0.0.1:21008".parse().unwrap();
        let (send_socket, recv_socket) = LoopbackSocket::pair(send_addr, recv_addr);

        let config = fast_retransmit_config();
        let total = 8u32;
        let source = PatternSource::new(total, 16);
        let mut sender = SenderEngine::new(config.clone(), recv_addr);
        let mut receiver = ReceiverEngine::new(config);
        let mut sink = CollectingSink { delivered: vec![] };

        let corrupted_once = Arc::new(AtomicBool::new(false));
        let hook_flag = corrupted_once.clone();
        send_socket.set_fault(move |buf| {
            if data_seq(buf) == Some(2) && !hook_flag.swap(true, Ordering::SeqCst) {
                DatagramFault::Corrupt
            } else {
                DatagramFault::Pass
            }
        });

        let receiver_task = async {
            loop {
                let mut buf = vec![0u8; 4096];
                let (len, addr) = recv_socket.recv_from(&mut buf).await.unwrap();
                receiver
                    .handle_datagram(&*recv_socket, &buf[..len], addr, &mut sink)
                    .await
                    .unwrap();
                if sink.delivered.len() as u32 == total {
                    break;
                }
            }
        };
        let sender_task = sender.run(&*send_socket, &source);

        let (_, stats) = tokio::join!(receiver_task, sender_task);
        let stats = stats.unwrap();

        assert!(corrupted_once.load(Ordering::SeqCst), "fault hook never fired");
        assert_eq!(sink.delivered.len(), total as usize);
        for (i, (seq, payload)) in sink.delivered.iter().enumerate() {
            assert_eq!(*seq, i as u32);
            assert_eq!(payload.as_ref(), source.segment(i as u32).as_ref());
        }
        assert!(stats.retransmissions >= 1);
    }

    #[tokio::test]
    async fn handshake_times_out_when_peer_is_silent() {
        let send_addr: SocketAddr = "127.0.0.1:21003".parse().unwrap();
        let recv_addr: SocketAddr = "127.0.0.1:21004".parse().unwrap();
        let (send_socket, _recv_socket) = LoopbackSocket::pair(send_addr, recv_addr);

        let mut config = TransportConfig::default();
        config.handshake_timeout = std::time::Duration::from_millis(30);
        let mut sender = SenderEngine::new(config, recv_addr);

        let result = sender.handshake(&*send_socket).await;
        assert!(matches!(result, Err(TransportError::HandshakeTimeout)));
    }
}
