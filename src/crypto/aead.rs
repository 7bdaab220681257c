//! XChaCha20-Poly1305 AEAD for wrap tokens.
//!
//! The 9-byte wrap header (kind + sequence) is always authenticated as
//! associated data.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::core::{SecurityError, AEAD_NONCE_SIZE, AEAD_TAG_SIZE, WRAP_HEADER_SIZE};

/// Size of a session key (32 bytes for XChaCha20)
pub const SESSION_KEY_SIZE: usize = 32;

/// A per-direction session key. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey {
    key: [u8; SESSION_KEY_SIZE],
}

impl SessionKey {
    /// Create a session key from bytes.
    pub fn from_bytes(key: [u8; SESSION_KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Get the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.key
    }
}

/// Build the wrap header `[kind][sequence BE]`.
pub fn wrap_header(kind: u8, sequence: u64) -> [u8; WRAP_HEADER_SIZE] {
    let mut header = [0u8; WRAP_HEADER_SIZE];
    header[0] = kind;
    header[1..].copy_from_slice(&sequence.to_be_bytes());
    header
}

/// Encrypt `plaintext`, returning ciphertext with the 16-byte tag appended.
pub fn encrypt(
    key: &SessionKey,
    nonce: &[u8; AEAD_NONCE_SIZE],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, SecurityError> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .encrypt(XNonce::from_slice(nonce), Payload { msg: plaintext, aad })
        .map_err(|_| SecurityError::WrapFailed)
}

/// Decrypt and authenticate `ciphertext` (tag included).
pub fn decrypt(
    key: &SessionKey,
    nonce: &[u8; AEAD_NONCE_SIZE],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, SecurityError> {
    if ciphertext.len() < AEAD_TAG_SIZE {
        return Err(SecurityError::MalformedToken);
    }
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .decrypt(XNonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| SecurityError::UnwrapFailed)
}

/// Compute an integrity tag over `aad` with an empty plaintext.
pub fn sign(key: &SessionKey, nonce: &[u8; AEAD_NONCE_SIZE], aad: &[u8]) -> Result<Vec<u8>, SecurityError> {
    encrypt(key, nonce, aad, &[])
}

/// Verify a tag produced by [`sign`].
pub fn verify(key: &SessionKey, nonce: &[u8; AEAD_NONCE_SIZE], aad: &[u8], tag: &[u8]) -> Result<(), SecurityError> {
    if tag.len() != AEAD_TAG_SIZE {
        return Err(SecurityError::MalformedToken);
    }
    decrypt(key, nonce, aad, tag).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONCE: [u8; AEAD_NONCE_SIZE] = [0x24; AEAD_NONCE_SIZE];

    #[test]
    fn test_encrypt_decrypt() {
        let key = SessionKey::from_bytes([0x42; SESSION_KEY_SIZE]);
        let aad = wrap_header(0x01, 7);

        let ciphertext = encrypt(&key, &NONCE, &aad, b"<13>Oct 17 relay: hello").unwrap();
        assert_eq!(ciphertext.len(), 23 + AEAD_TAG_SIZE);

        let plaintext = decrypt(&key, &NONCE, &aad, &ciphertext).unwrap();
        assert_eq!(plaintext, b"<13>Oct 17 relay: hello");
    }

    #[test]
    fn test_header_is_authenticated() {
        let key = SessionKey::from_bytes([0x42; SESSION_KEY_SIZE]);
        let ciphertext = encrypt(&key, &NONCE, &wrap_header(0x01, 1), b"data").unwrap();

        let result = decrypt(&key, &NONCE, &wrap_header(0x01, 2), &ciphertext);
        assert!(matches!(result, Err(SecurityError::UnwrapFailed)));
    }

    #[test]
    fn test_sign_verify() {
        let key = SessionKey::from_bytes([0x11; SESSION_KEY_SIZE]);
        let tag = sign(&key, &NONCE, b"header+message").unwrap();
        assert_eq!(tag.len(), AEAD_TAG_SIZE);

        verify(&key, &NONCE, b"header+message", &tag).unwrap();
        assert!(verify(&key, &NONCE, b"header+massage", &tag).is_err());
        assert!(matches!(verify(&key, &NONCE, b"x", &tag[..4]), Err(SecurityError::MalformedToken)));
    }

    #[test]
    fn test_wrap_header_layout() {
        assert_eq!(hex::encode(wrap_header(0x02, 0x0102)), "020000000000000102");
    }
}
