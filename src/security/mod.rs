//! Security context layer.
//!
//! GSS-style seam between the forwarding engine and a concrete mechanism:
//!
//! - [`Mechanism`] creates an [`InitiatorContext`] per connection
//! - [`negotiate`] drives the token exchange to an [`EstablishedContext`]
//! - [`EstablishedContext::wrap`] protects each outbound message
//!
//! The receiving side uses [`accept`] with an [`AcceptorContext`].

mod context;
mod flags;
mod mechanism;
mod name;

pub use context::*;
pub use flags::*;
pub use mechanism::*;
pub use name::*;
