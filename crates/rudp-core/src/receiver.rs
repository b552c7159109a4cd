use crate::config::TransportConfig;
use crate::crypto::CryptoSession;
use crate::error::TransportError;
use crate::socket::DatagramSocket;
use crate::wire::{Packet, PacketType};
use bytes::Bytes;
use log::{debug, info, trace, warn};
use std::collections::BTreeMap;
use std::net::SocketAddr;

/// Receives delivered segments, in order, exactly once each.
pub trait PayloadSink {
    fn deliver(&mut self, seq: u32, payload: Bytes);
}

/// A `PayloadSink` that just counts and remembers the last delivered seq,
/// useful for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub delivered: Vec<(u32, Bytes)>,
}

impl PayloadSink for RecordingSink {
    fn deliver(&mut self, seq: u32, payload: Bytes) {
        self.delivered.push((seq, payload));
    }
}

/// The receiver-side half of the transport: handshake responder, cumulative
/// ACK generator, and bounded reorder buffer.
pub struct ReceiverEngine {
    config: TransportConfig,
    expected_seq: u32,
    buffer: BTreeMap<u32, Bytes>,
    crypto: CryptoSession,
    client_addr: Option<SocketAddr>,
}

impl ReceiverEngine {
    pub fn new(config: TransportConfig) -> Self {
        ReceiverEngine {
            config,
            expected_seq: 0,
            buffer: BTreeMap::new(),
            crypto: CryptoSession::new(),
            client_addr: None,
        }
    }

    fn advertised_rwnd(&self) -> u16 {
        (self.config.recv_buffer_pkts.saturating_sub(self.buffer.len())) as u16
    }

    /// Runs the receive loop forever (until the socket errors), delivering
    /// segments to `sink` as they arrive in order.
    pub async fn run<S: DatagramSocket, Sink: PayloadSink>(
        &mut self,
        socket: &S,
        sink: &mut Sink,
    ) -> Result<(), TransportError> {
        let mut buf = vec![0u8; crate::wire::HEADER_SIZE + self.config.payload_size + 64];
        loop {
            let (len, addr) = socket.recv_from(&mut buf).await?;
            self.handle_datagram(socket, &buf[..len], addr, sink).await?;
        }
    }

    /// Processes a single received datagram. Exposed separately from
    /// `run` so tests can drive the engine deterministically.
    pub async fn handle_datagram<S: DatagramSocket, Sink: PayloadSink>(
        &mut self,
        socket: &S,
        data: &[u8],
        addr: SocketAddr,
        sink: &mut Sink,
    ) -> Result<(), TransportError> {
        if let Some(pinned) = self.client_addr {
            if pinned != addr {
                trace!(target: "rudp_core::receiver", "ignoring datagram from unpinned address {addr}");
                return Ok(());
            }
        }

        let packet = match Packet::decode(data) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(target: "rudp_core::receiver", "dropping malformed datagram from {addr}: {e}");
                return Ok(());
            }
        };

        match packet.ptype {
            PacketType::NonceReq => {
                self.client_addr.get_or_insert(addr);
                self.handle_nonce_req(socket, &packet.payload, addr).await?;
            }
            PacketType::Data => {
                self.handle_data(socket, &packet, addr, sink).await?;
            }
            PacketType::Ack | PacketType::NonceResp => {
                trace!(target: "rudp_core::receiver", "ignoring sender-bound packet type from {addr}");
            }
        }
        Ok(())
    }

    async fn handle_nonce_req<S: DatagramSocket>(
        &mut self,
        socket: &S,
        payload: &[u8],
        addr: SocketAddr,
    ) -> Result<(), TransportError> {
        if payload.len() < crate::crypto::NONCE_LEN {
            return Ok(());
        }
        let client_nonce = &payload[..crate::crypto::NONCE_LEN];
        let server_nonce = CryptoSession::generate_nonce();
        self.crypto.derive_session_key(client_nonce, &server_nonce);

        let resp = Packet::nonce_resp(Bytes::copy_from_slice(&server_nonce));
        socket.send_to(&resp.encode(), addr).await?;
        info!(target: "rudp_core::receiver", "crypto handshake completed with {addr}");
        Ok(())
    }

    async fn handle_data<S: DatagramSocket, Sink: PayloadSink>(
        &mut self,
        socket: &S,
        packet: &Packet,
        addr: SocketAddr,
        sink: &mut Sink,
    ) -> Result<(), TransportError> {
        if !self.crypto.is_established() {
            return Ok(());
        }

        let plaintext = match self.crypto.decrypt(&packet.payload, packet.seq) {
            Ok(bytes) => Bytes::from(bytes),
            Err(_) => {
                trace!(target: "rudp_core::receiver", "dropping seq={} with failed integrity check", packet.seq);
                return Ok(());
            }
        };

        let seq = packet.seq;
        if seq == self.expected_seq {
            sink.deliver(seq, plaintext);
            self.expected_seq += 1;
            while let Some(buffered) = self.buffer.remove(&self.expected_seq) {
                sink.deliver(self.expected_seq, buffered);
                self.expected_seq += 1;
            }
        } else if seq > self.expected_seq {
            self.buffer.entry(seq).or_insert(plaintext);
        }
        // seq < expected_seq: already delivered, still ACK below.

        let rwnd = self.advertised_rwnd();
        debug!(target: "rudp_core::receiver", "expected_seq={} buffered={} rwnd={}", self.expected_seq, self.buffer.len(), rwnd);

        let ack = Packet::ack(self.expected_seq, rwnd);
        socket.send_to(&ack.encode(), addr).await?;
        Ok(())
    }
}
