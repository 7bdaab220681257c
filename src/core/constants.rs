//! Protocol constants for secured forwarding.
//!
//! Wire-visible values MUST NOT be changed without breaking peers.

use std::time::Duration;

// =============================================================================
// DESTINATION DEFAULTS
// =============================================================================

/// IANA syslog port, used when a destination names no port.
pub const DEFAULT_PORT: u16 = 514;

/// Maximum message length; longer messages are silently truncated.
pub const MAX_LINE: usize = 2048;

/// Default connect timeout applied by the TCP transport.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// RETRY / SUSPEND
// =============================================================================

/// Cap on the failed-resolution counter.
pub const RETRY_MAX: u32 = 30;

/// Suggested interval between host-driven resumption attempts.
pub const RESUME_INTERVAL: Duration = Duration::from_secs(60);

// =============================================================================
// WIRE CODEC
// =============================================================================

/// Payloads of this many bytes or fewer are never compressed.
pub const MIN_COMPRESS_SIZE: usize = 60;

/// Leading byte marking a compressed payload.
pub const COMPRESSION_MARKER: u8 = b'z';

/// Highest accepted compression level.
pub const MAX_COMPRESSION_LEVEL: u8 = 9;

/// Upper bound for decompressed payloads on the receiving side.
pub const MAX_DECOMPRESSED_SIZE: usize = 64 * 1024;

// =============================================================================
// SECURITY TOKENS
// =============================================================================

/// Size of the big-endian length prefix in front of every token.
pub const TOKEN_LENGTH_PREFIX: usize = 4;

/// Inbound tokens above this size are rejected before allocation.
pub const MAX_TOKEN_SIZE: usize = 1024 * 1024;

/// Maximum number of token exchanges in one negotiation.
pub const MAX_HANDSHAKE_ROUNDS: usize = 16;

/// Service prefix used when no override is configured.
pub const DEFAULT_SERVICE_NAME: &str = "host";

// =============================================================================
// NOISE MECHANISM
// =============================================================================

/// Noise pattern of the built-in mechanism.
pub const NOISE_PATTERN: &str = "Noise_IK_25519_ChaChaPoly_BLAKE2s";

/// X25519 public key size.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// X25519 private key size.
pub const PRIVATE_KEY_SIZE: usize = 32;

/// BLAKE2s hash output size.
pub const HASH_SIZE: usize = 32;

/// Poly1305 authentication tag size.
pub const AEAD_TAG_SIZE: usize = 16;

/// XChaCha20 nonce size.
pub const AEAD_NONCE_SIZE: usize = 24;

/// Wrap token header: kind byte + 64-bit sequence number.
pub const WRAP_HEADER_SIZE: usize = 9;

/// Wrap token kind: payload encrypted.
pub const WRAP_KIND_SEALED: u8 = 0x01;

/// Wrap token kind: payload in clear with an integrity tag.
pub const WRAP_KIND_SIGNED: u8 = 0x02;

/// Nonce direction: initiator -> acceptor.
pub const NONCE_DIR_INITIATOR: u8 = 0x00;

/// Nonce direction: acceptor -> initiator.
pub const NONCE_DIR_ACCEPTOR: u8 = 0x01;
