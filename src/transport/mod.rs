//! Transport layer.
//!
//! - **Token exchange**: [`send_token`] / [`recv_token`], the 4-byte
//!   length-prefixed sub-protocol used for both handshake and wrapped messages
//! - **Network seam**: [`Transport`] with the tokio-backed [`TcpTransport`]
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          Forwarding engine              │
//! ├─────────────────────────────────────────┤
//! │          Security layer                 │
//! ├─────────────────────────────────────────┤
//! │          Transport layer                │  ← This module
//! │    token framing, resolve, connect      │
//! ├─────────────────────────────────────────┤
//! │              TCP                        │
//! └─────────────────────────────────────────┘
//! ```

mod net;
mod token;

pub use net::*;
pub use token::*;
