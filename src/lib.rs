//! # gssfwd
//!
//! Secured syslog forwarding over TCP.
//!
//! Each configured destination gets a mutually authenticated security
//! context, negotiated lazily on the first send. Messages are truncated,
//! optionally compressed, framed, and then wrapped (encrypted, or
//! integrity-protected only) before they hit the socket. A destination that
//! fails is suspended until the host asks it to resume.
//!
//! ## Feature Flags
//!
//! - `compression` (default): zstd payload compression behind the `z` marker
//! - `noise` (default): built-in Noise_IK security mechanism
//!
//! ## Modules
//!
//! - [`core`]: constants and error types
//! - [`codec`]: truncation, compression and framing
//! - [`config`]: destination and security settings
//! - [`security`]: mechanism seam, negotiation and wrapping
//! - [`transport`]: token exchange, resolution and connect
//! - [`forward`]: destination state machine and the forwarder task
//! - [`crypto`]: Noise_IK mechanism (requires `noise` feature)
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! # #[cfg(feature = "noise")]
//! # async fn run(relay_key: [u8; 32]) -> Result<(), Box<dyn std::error::Error>> {
//! use gssfwd::prelude::*;
//!
//! let security = SecurityConfig::new(SecurityMode::Encryption);
//! let config = ForwardConfig::builder("relay.example.net")
//!     .framing(Framing::OctetCounting)
//!     .build()?;
//!
//! let keyring = Keyring::new().with(security.principal_for(&config.host), relay_key);
//! let mechanism = NoiseMechanism::new(StaticKeypair::generate(), keyring);
//!
//! let handle = Forwarder::spawn(Destination::tcp(config, security, mechanism));
//! let _ticker = spawn_resume_ticker(handle.clone(), RESUME_INTERVAL);
//!
//! handle.send("<13>Oct 11 22:14:15 mymachine su: 'su root' failed").await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod codec;
pub mod config;
pub mod core;
pub mod forward;
pub mod security;
pub mod transport;

// Built-in mechanism (feature-gated)
#[cfg(feature = "noise")]
#[cfg_attr(docsrs, doc(cfg(feature = "noise")))]
pub mod crypto;

#[cfg(test)]
pub(crate) mod testing;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::codec::{CompressionStats, Framing, WireCodec};
    pub use crate::config::{ForwardConfig, ForwardConfigBuilder, SecurityConfig, SecurityMode};
    pub use crate::core::{
        CodecError, ConfigError, ForwardError, SecurityError, DEFAULT_PORT, MAX_LINE, RESUME_INTERVAL,
        RETRY_MAX,
    };
    pub use crate::forward::{
        spawn_resume_ticker, ConnectionPhase, Destination, DestinationStatus, Forwarder, ForwarderHandle,
        SendOutcome, SendStatus,
    };
    pub use crate::security::{ContextFlags, Mechanism, NegotiationState, ServiceName};
    pub use crate::transport::{AddressFamily, TcpTransport, Transport};

    #[cfg(feature = "noise")]
    pub use crate::crypto::{Keyring, NoiseMechanism, NoiseResponder, StaticKeypair};
}

// Re-export commonly used items at crate root
pub use crate::core::{ConfigError, ForwardError, SecurityError};
pub use crate::forward::{Destination, Forwarder, ForwarderHandle};
