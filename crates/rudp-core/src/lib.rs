pub mod config;
pub mod congestion;
pub mod crypto;
pub mod error;
pub mod receiver;
pub mod sender;
pub mod socket;
pub mod wire;

pub use config::TransportConfig;
pub use congestion::{CongestionController, CongestionPhase};
pub use crypto::CryptoSession;
pub use error::{CryptoError, TransportError, WireError};
pub use receiver::{PayloadSink, ReceiverEngine, RecordingSink};
pub use sender::{PatternSource, PayloadSource, SenderEngine, TransferStats};
pub use socket::{DatagramFault, DatagramSocket, LoopbackSocket};
pub use wire::{Packet, PacketType};
