//! Nonce construction for XChaCha20-Poly1305.
//!
//! ```text
//! [ direction (1) | zeros (15) | sequence (8, LE) ]
//! ```
//!
//! The direction byte keeps the two directions' nonce spaces disjoint.

use crate::core::{AEAD_NONCE_SIZE, NONCE_DIR_ACCEPTOR, NONCE_DIR_INITIATOR};

/// Direction of a wrapped message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Initiator → Acceptor (0x00)
    InitiatorToAcceptor,
    /// Acceptor → Initiator (0x01)
    AcceptorToInitiator,
}

impl Direction {
    /// Get the byte representation.
    pub fn as_byte(self) -> u8 {
        match self {
            Direction::InitiatorToAcceptor => NONCE_DIR_INITIATOR,
            Direction::AcceptorToInitiator => NONCE_DIR_ACCEPTOR,
        }
    }
}

/// Construct a 24-byte nonce.
pub fn construct_nonce(direction: Direction, sequence: u64) -> [u8; AEAD_NONCE_SIZE] {
    let mut nonce = [0u8; AEAD_NONCE_SIZE];
    nonce[0] = direction.as_byte();
    nonce[16..24].copy_from_slice(&sequence.to_le_bytes());
    nonce
}
