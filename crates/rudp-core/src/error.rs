use thiserror::Error;

/// Errors from framing and parsing segments on the wire.
#[derive(Error, Debug)]
pub enum WireError {
    #[error("datagram shorter than the fixed header ({len} < {header_size})")]
    TooShort { len: usize, header_size: usize },
    #[error("declared payload length {declared} exceeds datagram bounds ({available} available)")]
    TruncatedPayload { declared: usize, available: usize },
    #[error("unknown packet type tag {0:#04x}")]
    UnknownType(u8),
    #[error(transparent)]
    Binary(#[from] rudp_wire::BinaryError),
}

/// Errors from the crypto session layer. Integrity failures are not fatal
/// to the transport, they just mean the datagram is treated as lost.
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("session key has not been derived yet")]
    SessionNotEstablished,
    #[error("integrity tag mismatch")]
    TagMismatch,
    #[error("payload shorter than the integrity tag")]
    PayloadTooShortForTag,
}

/// Top-level errors surfaced by the sender/receiver engines.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("handshake timed out waiting for NONCE_RESP")]
    HandshakeTimeout,
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
