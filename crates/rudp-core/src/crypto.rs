use crate::error::CryptoError;
use rand::RngCore;
use sha2::{Digest, Sha256};

pub const NONCE_LEN: usize = 16;
const KEY_LEN: usize = 32;
const TAG_LEN: usize = 8;
const KEYSTREAM_BLOCK_LEN: usize = 32;

/// Nonce-exchange session key derivation and XOR-keystream payload
/// encryption with a truncated keyed digest for integrity.
///
/// This is explicitly a teaching-grade construction: the 8-byte tag only
/// defends against accidental corruption and casual tampering, not a
/// motivated forger.
#[derive(Debug, Clone)]
pub struct CryptoSession {
    session_key: Option<[u8; KEY_LEN]>,
}

impl Default for CryptoSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CryptoSession {
    pub fn new() -> Self {
        CryptoSession { session_key: None }
    }

    pub fn is_established(&self) -> bool {
        self.session_key.is_some()
    }

    pub fn generate_nonce() -> [u8; NONCE_LEN] {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);
        nonce
    }

    /// Derives and stores the session key as `SHA-256(client_nonce ||
    /// server_nonce)`. Both peers must concatenate in this order to agree
    /// on the same key.
    pub fn derive_session_key(&mut self, client_nonce: &[u8], server_nonce: &[u8]) {
        let mut hasher = Sha256::new();
        hasher.update(client_nonce);
        hasher.update(server_nonce);
        let digest = hasher.finalize();
        self.session_key = Some(digest.into());
    }

    fn keystream(&self, len: usize, seq: u32) -> Result<Vec<u8>, CryptoError> {
        let key = self.session_key.ok_or(CryptoError::SessionNotEstablished)?;
        let block_count = len.div_ceil(KEYSTREAM_BLOCK_LEN);
        let mut out = Vec::with_capacity(block_count * KEYSTREAM_BLOCK_LEN);
        for block_index in 0..block_count {
            let mut hasher = Sha256::new();
            hasher.update(key);
            hasher.update((seq as u64).to_be_bytes());
            hasher.update((block_index as u32).to_be_bytes());
            out.extend_from_slice(&hasher.finalize());
        }
        out.truncate(len);
        Ok(out)
    }

    fn tag(ciphertext: &[u8], seq: u32) -> [u8; TAG_LEN] {
        let mut hasher = Sha256::new();
        hasher.update(ciphertext);
        hasher.update((seq as u64).to_be_bytes());
        let digest = hasher.finalize();
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&digest[..TAG_LEN]);
        tag
    }

    /// Encrypts `plaintext` for segment `seq`, returning `ciphertext || tag`.
    pub fn encrypt(&self, plaintext: &[u8], seq: u32) -> Result<Vec<u8>, CryptoError> {
        let keystream = self.keystream(plaintext.len(), seq)?;
        let mut ciphertext: Vec<u8> = plaintext
            .iter()
            .zip(keystream.iter())
            .map(|(p, k)| p ^ k)
            .collect();
        let tag = Self::tag(&ciphertext, seq);
        ciphertext.extend_from_slice(&tag);
        Ok(ciphertext)
    }

    /// Verifies the trailing tag and decrypts. Returns `TagMismatch` if
    /// the datagram was corrupted or tampered with; callers should treat
    /// that the same as a dropped datagram.
    pub fn decrypt(&self, wire_payload: &[u8], seq: u32) -> Result<Vec<u8>, CryptoError> {
        if wire_payload.len() < TAG_LEN {
            return Err(CryptoError::PayloadTooShortForTag);
        }
        let (ciphertext, received_tag) = wire_payload.split_at(wire_payload.len() - TAG_LEN);
        let expected_tag = Self::tag(ciphertext, seq);
        if expected_tag.as_slice() != received_tag {
            return Err(CryptoError::TagMismatch);
        }
        let keystream = self.keystream(ciphertext.len(), seq)?;
        Ok(ciphertext
            .iter()
            .zip(keystream.iter())
            .map(|(c, k)| c ^ k)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn established_pair() -> (CryptoSession, CryptoSession) {
        let client_nonce = CryptoSession::generate_nonce();
        let server_nonce = CryptoSession::generate_nonce();
        let mut client = CryptoSession::new();
        let mut server = CryptoSession::new();
        client.derive_session_key(&client_nonce, &server_nonce);
        server.derive_session_key(&client_nonce, &server_nonce);
        (client, server)
    }

    #[test]
    fn both_peers_derive_the_same_key() {
        let (client, server) = established_pair();
        assert_eq!(client.session_key, server.session_key);
    }

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let (client, server) = established_pair();
        let plaintext = vec![0xABu8; 1000];
        let wire = client.encrypt(&plaintext, 7).unwrap();
        assert_eq!(wire.len(), plaintext.len() + TAG_LEN);
        let recovered = server.decrypt(&wire, 7).unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn encryption_is_deterministic_for_same_inputs() {
        let (client, _server) = established_pair();
        let plaintext = vec![0x11u8; 250];
        let a = client.encrypt(&plaintext, 3).unwrap();
        let b = client.encrypt(&plaintext, 3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn tampered_ciphertext_fails_tag_check() {
        let (client, server) = established_pair();
        let plaintext = vec![0x42u8; 64];
        let mut wire = client.encrypt(&plaintext, 1).unwrap();
        wire[0] ^= 0xff;
        assert!(matches!(
            server.decrypt(&wire, 1),
            Err(CryptoError::TagMismatch)
        ));
    }

    #[test]
    fn wrong_seq_fails_tag_check() {
        let (client, server) = established_pair();
        let plaintext = vec![0x07u8; 32];
        let wire = client.encrypt(&plaintext, 5).unwrap();
        assert!(matches!(
            server.decrypt(&wire, 6),
            Err(CryptoError::TagMismatch)
        ));
    }

    #[test]
    fn decrypt_before_handshake_fails() {
        let session = CryptoSession::new();
        let wire = vec![0u8; 16];
        assert!(matches!(
            session.decrypt(&wire, 0),
            Err(CryptoError::SessionNotEstablished)
        ));
    }
}
