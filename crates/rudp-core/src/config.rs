use std::time::Duration;

/// Every tunable constant the reliability, congestion and handshake logic
/// depends on, grouped into one value rather than read from globals so
/// tests can spin up several independent sessions side by side.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    /// Plaintext segment size in bytes.
    pub payload_size: usize,
    /// Retransmission timeout.
    pub rto: Duration,
    /// Upper bound on the sender's non-blocking receive poll.
    pub recv_poll: Duration,
    /// Upper bound on the handshake's wait for `NONCE_RESP`.
    pub handshake_timeout: Duration,
    /// Receiver reorder-buffer capacity; also the rwnd ceiling.
    pub recv_buffer_pkts: usize,
    /// Initial congestion window, in segments.
    pub init_cwnd: f64,
    /// Initial slow-start threshold, in segments.
    pub init_ssthresh: f64,
    /// Duplicate acknowledgements required to trigger fast retransmit.
    pub dup_ack_threshold: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            payload_size: 1000,
            rto: Duration::from_millis(200),
            recv_poll: Duration::from_millis(50),
            handshake_timeout: Duration::from_millis(2000),
            recv_buffer_pkts: 5,
            init_cwnd: 1.0,
            init_ssthresh: 64.0,
            dup_ack_threshold: 3,
        }
    }
}
