//! Forwarding engine.
//!
//! - [`Destination`]: connection state machine, lazy connect and
//!   negotiation, wrap and send, suspension on failure
//! - [`SendSlot`]: status and the single pending message, shared with the
//!   write-readiness path
//! - [`Forwarder`] / [`ForwarderHandle`]: the send path as a tokio task
//!
//! ```text
//!   host ──send──► ForwarderHandle ──cmd──► Forwarder task ──► Destination
//!   host ──writable──► SendSlot (Connecting → Ready) ──flush cmd──┘
//! ```

mod destination;
mod forwarder;
mod slot;
mod state;

pub use destination::{Destination, DestinationStatus, SendOutcome};
pub use forwarder::{spawn_resume_ticker, Forwarder, ForwarderHandle};
pub use slot::{SendSlot, SendStatus};
pub use state::{Connection, ConnectionPhase};
