use crate::error::WireError;
use bytes::Bytes;
use rudp_wire::{BinaryReader, BinaryWriter};

/// Fixed header size: type(1) + seq(4) + ack(4) + rwnd(2) + length(2).
pub const HEADER_SIZE: usize = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Data,
    Ack,
    NonceReq,
    NonceResp,
}

impl PacketType {
    fn to_tag(self) -> u8 {
        match self {
            PacketType::Data => 0,
            PacketType::Ack => 1,
            PacketType::NonceReq => 2,
            PacketType::NonceResp => 3,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, WireError> {
        match tag {
            0 => Ok(PacketType::Data),
            1 => Ok(PacketType::Ack),
            2 => Ok(PacketType::NonceReq),
            3 => Ok(PacketType::NonceResp),
            other => Err(WireError::UnknownType(other)),
        }
    }
}

/// A parsed datagram: header fields plus the payload slice that followed it.
#[derive(Debug, Clone)]
pub struct Packet {
    pub ptype: PacketType,
    pub seq: u32,
    pub ack: u32,
    pub rwnd: u16,
    pub payload: Bytes,
}

impl Packet {
    pub fn data(seq: u32, payload: Bytes) -> Self {
        Packet {
            ptype: PacketType::Data,
            seq,
            ack: 0,
            rwnd: 0,
            payload,
        }
    }

    pub fn ack(expected_seq: u32, rwnd: u16) -> Self {
        Packet {
            ptype: PacketType::Ack,
            seq: 0,
            ack: expected_seq,
            rwnd,
            payload: Bytes::new(),
        }
    }

    pub fn nonce_req(nonce: Bytes) -> Self {
        Packet {
            ptype: PacketType::NonceReq,
            seq: 0,
            ack: 0,
            rwnd: 0,
            payload: nonce,
        }
    }

    pub fn nonce_resp(nonce: Bytes) -> Self {
        Packet {
            ptype: PacketType::NonceResp,
            seq: 0,
            ack: 0,
            rwnd: 0,
            payload: nonce,
        }
    }

    /// Encodes the header and payload into one contiguous buffer.
    pub fn encode(&self) -> Bytes {
        let mut writer = BinaryWriter::with_capacity(HEADER_SIZE + self.payload.len());
        writer
            .write_u8(self.ptype.to_tag())
            .expect("write to in-memory buffer never fails");
        writer.write_u32(self.seq).expect("infallible write");
        writer.write_u32(self.ack).expect("infallible write");
        writer.write_u16(self.rwnd).expect("infallible write");
        writer
            .write_u16(self.payload.len() as u16)
            .expect("infallible write");
        writer
            .write_bytes(&self.payload)
            .expect("infallible write");
        writer.freeze()
    }

    /// Parses a received datagram. Fails if it is shorter than the fixed
    /// header or if the declared payload length runs past the datagram.
    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        if data.len() < HEADER_SIZE {
            return Err(WireError::TooShort {
                len: data.len(),
                header_size: HEADER_SIZE,
            });
        }

        let mut reader = BinaryReader::from_slice(data);
        let ptype = PacketType::from_tag(reader.read_u8()?)?;
        let seq = reader.read_u32()?;
        let ack = reader.read_u32()?;
        let rwnd = reader.read_u16()?;
        let length = reader.read_u16()? as usize;

        if reader.remaining() < length {
            return Err(WireError::TruncatedPayload {
                declared: length,
                available: reader.remaining(),
            });
        }
        let payload = reader.read_bytes(length)?;

        Ok(Packet {
            ptype,
            seq,
            ack,
            rwnd,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_packet_round_trips() {
        let payload = Bytes::from_static(&[7u8; 1008]);
        let packet = Packet::data(42, payload.clone());
        let encoded = packet.encode();
        let decoded = Packet::decode(&encoded).unwrap();
        assert_eq!(decoded.ptype, PacketType::Data);
        assert_eq!(decoded.seq, 42);
        assert_eq!(decoded.payload, payload);
    }

    #[test]
    fn ack_packet_round_trips() {
        let packet = Packet::ack(100, 3);
        let encoded = packet.encode();
        assert_eq!(encoded.len(), HEADER_SIZE);
        let decoded = Packet::decode(&encoded).unwrap();
        assert_eq!(decoded.ptype, PacketType::Ack);
        assert_eq!(decoded.ack, 100);
        assert_eq!(decoded.rwnd, 3);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn short_datagram_is_rejected() {
        let too_short = [0u8; 5];
        assert!(matches!(
            Packet::decode(&too_short),
            Err(WireError::TooShort { .. })
        ));
    }

    #[test]
    fn declared_length_beyond_datagram_is_rejected() {
        let packet = Packet::ack(0, 0);
        let mut encoded = packet.encode().to_vec();
        // Claim a payload that was never appended.
        encoded[11] = 0;
        encoded[12] = 10;
        assert!(matches!(
            Packet::decode(&encoded),
            Err(WireError::TruncatedPayload { .. })
        ));
    }

    #[test]
    fn unknown_type_tag_is_rejected() {
        let packet = Packet::ack(0, 0);
        let mut encoded = packet.encode().to_vec();
        encoded[0] = 0xff;
        assert!(matches!(
            Packet::decode(&encoded),
            Err(WireError::UnknownType(0xff))
        ));
    }
}
