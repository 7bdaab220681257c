//! Built-in Noise_IK security mechanism.
//!
//! - `keys.rs`: X25519 identities, fingerprints, principal keyring
//! - `noise.rs`: handshake via `snow`, HKDF session keys, wrap tokens
//! - `aead.rs`: XChaCha20-Poly1305 seal/sign
//! - `nonce.rs`: 24-byte nonce construction (direction|sequence)

mod aead;
mod keys;
mod noise;
mod nonce;

pub use aead::{SessionKey, SESSION_KEY_SIZE};
pub use keys::{fingerprint, Keyring, StaticKeypair};
pub use noise::{
    NoiseAcceptor, NoiseInitiator, NoiseMechanism, NoiseResponder, NoiseSealer, NoiseUnsealer, SessionKeys,
    NOISE_FLAGS,
};
pub use nonce::Direction;
