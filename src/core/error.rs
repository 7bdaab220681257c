//! Error types for secured forwarding.

use std::io;

use thiserror::Error;

/// Errors raised while applying configuration.
///
/// These never reach the send path: a destination is only built from a
/// configuration that passed validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Security mode other than `integrity` or `encryption`.
    #[error("unknown security mode: {0}")]
    UnknownSecurityMode(String),

    /// Port string is not purely numeric or out of range.
    #[error("invalid port: {0:?}")]
    InvalidPort(String),

    /// Compression level outside 0-9.
    #[error("invalid compression level: {0}")]
    InvalidCompressionLevel(u8),

    /// Truncation limit of zero.
    #[error("invalid maximum message size: {0}")]
    InvalidMessageSize(usize),

    /// Destination without a host.
    #[error("destination host is empty")]
    EmptyHost,

    /// Service name override given but empty.
    #[error("service name is empty")]
    EmptyServiceName,

    /// Directive name not handled by this module.
    #[error("unknown directive: {0}")]
    UnknownDirective(String),
}

/// Errors from the wire codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Compression backend failed.
    #[error("compression failed: {0}")]
    CompressionFailed(String),

    /// Decompression backend failed.
    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    /// Decompressed size exceeds the safety limit.
    #[error("decompressed size exceeded limit: {size} > {limit}")]
    SizeExceeded {
        /// Actual decompressed size.
        size: usize,
        /// Maximum allowed size.
        limit: usize,
    },

    /// Octet-counting frame without a valid decimal length and space.
    #[error("invalid octet-count prefix")]
    InvalidLengthPrefix,

    /// Frame shorter than its declared or required length.
    #[error("incomplete frame: expected {expected} bytes, got {actual}")]
    Incomplete {
        /// Bytes required.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },
}

/// Errors from security context negotiation and per-message protection.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// The target principal could not be parsed.
    #[error("invalid principal name: {0}")]
    InvalidName(String),

    /// No credentials known for the target principal.
    #[error("no credentials for principal {0}")]
    UnknownPrincipal(String),

    /// The peer authenticated with a key we do not accept.
    #[error("peer is not authorized")]
    Unauthorized,

    /// The mechanism rejected a handshake step.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// The peer kept asking for continuation.
    #[error("handshake exceeded {0} rounds")]
    TooManyRounds(usize),

    /// Negotiation finished without a capability the mode requires.
    #[error("negotiated context lacks required flags: {0}")]
    MissingCapability(String),

    /// Sealing a message failed.
    #[error("wrap failed")]
    WrapFailed,

    /// Verifying or decrypting a message failed.
    #[error("unwrap failed")]
    UnwrapFailed,

    /// A wrap token arrived out of sequence.
    #[error("sequence mismatch: expected {expected}, got {actual}")]
    SequenceMismatch {
        /// Next sequence number we accept.
        expected: u64,
        /// Sequence number carried by the token.
        actual: u64,
    },

    /// A wrap token is too short or has an unknown kind.
    #[error("malformed token")]
    MalformedToken,

    /// Inbound token larger than the configured limit.
    #[error("token too large: {size} > {limit}")]
    TokenTooLarge {
        /// Announced token size.
        size: usize,
        /// Maximum accepted size.
        limit: usize,
    },

    /// Socket failure while exchanging tokens.
    #[error("token i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Outcome of a failed forwarding attempt.
///
/// Every variant is local to one send attempt; none terminates the host.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// Destination is suspended or unresolved; try again after resumption.
    #[error("destination suspended")]
    Suspended,

    /// DNS resolution failed; the destination stays unresolved.
    #[error("cannot resolve {host}: {source}")]
    Resolution {
        /// Host that failed to resolve.
        host: String,
        /// Underlying resolver error.
        #[source]
        source: io::Error,
    },

    /// Security negotiation failed; the connection was discarded.
    #[error("security handshake failed: {0}")]
    Handshake(#[source] SecurityError),

    /// Sealing the message failed; the connection was discarded.
    #[error("message wrap failed: {0}")]
    Wrap(#[source] SecurityError),

    /// Socket connect or write failed; the connection was discarded.
    #[error("transport error: {0}")]
    Transport(#[source] io::Error),

    /// The forwarder task is gone.
    #[error("forwarder shut down")]
    Shutdown,
}

impl ForwardError {
    /// Check if the caller should simply try again after the next resumption.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ForwardError::Suspended | ForwardError::Resolution { .. })
    }

    /// Check if this attempt tore down the connection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ForwardError::Handshake(_) | ForwardError::Wrap(_) | ForwardError::Transport(_)
        )
    }

    /// Check if the outcome is a plain "suspended, try later" signal.
    pub fn is_suspension(&self) -> bool {
        matches!(self, ForwardError::Suspended)
    }
}
