//! X25519 identity keys and the principal keyring.

use std::collections::HashMap;
use std::fmt;

use blake2::{Blake2s256, Digest};
use rand::{rngs::OsRng, RngCore};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::core::{PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE};
use crate::security::ServiceName;

/// A static X25519 keypair for long-term identity.
///
/// The private key is zeroized on drop.
#[derive(Clone)]
pub struct StaticKeypair {
    private: [u8; PRIVATE_KEY_SIZE],
    public: [u8; PUBLIC_KEY_SIZE],
}

impl StaticKeypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut private = [0u8; PRIVATE_KEY_SIZE];
        OsRng.fill_bytes(&mut private);
        let keypair = Self::from_private(private);
        private.zeroize();
        keypair
    }

    /// Rebuild a keypair from stored private key material.
    pub fn from_private(private: [u8; PRIVATE_KEY_SIZE]) -> Self {
        let public = PublicKey::from(&StaticSecret::from(private)).to_bytes();
        Self { private, public }
    }

    /// Get the public key.
    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.public
    }

    /// Get the private key.
    ///
    /// # Security
    /// Handle with care - this exposes sensitive key material.
    pub fn private_key(&self) -> &[u8; PRIVATE_KEY_SIZE] {
        &self.private
    }

    /// Short fingerprint of the public key.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.public)
    }
}

impl Drop for StaticKeypair {
    fn drop(&mut self) {
        self.private.zeroize();
    }
}

impl fmt::Debug for StaticKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticKeypair")
            .field("fingerprint", &self.fingerprint())
            .finish_non_exhaustive()
    }
}

/// BLAKE2s fingerprint of a public key, first 8 bytes as hex.
pub fn fingerprint(public: &[u8; PUBLIC_KEY_SIZE]) -> String {
    let digest = Blake2s256::digest(public);
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

/// Known acceptor keys, indexed by service principal.
#[derive(Debug, Clone, Default)]
pub struct Keyring {
    keys: HashMap<ServiceName, [u8; PUBLIC_KEY_SIZE]>,
}

impl Keyring {
    /// Create an empty keyring.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the public key serving `principal`, replacing any previous one.
    pub fn insert(&mut self, principal: ServiceName, public: [u8; PUBLIC_KEY_SIZE]) {
        self.keys.insert(principal, public);
    }

    /// Builder-style [`Keyring::insert`].
    pub fn with(mut self, principal: ServiceName, public: [u8; PUBLIC_KEY_SIZE]) -> Self {
        self.insert(principal, public);
        self
    }

    /// Look up the key for `principal`.
    pub fn get(&self, principal: &ServiceName) -> Option<&[u8; PUBLIC_KEY_SIZE]> {
        self.keys.get(principal)
    }

    /// Number of registered principals.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if the keyring is empty.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
