//! Pluggable security mechanism seam.
//!
//! A mechanism produces per-connection contexts that step through a token
//! exchange. The drivers in [`super::negotiate`] and [`super::accept`] own the
//! socket; contexts only ever see token bytes.

use super::{ContextFlags, ServiceName};
use crate::core::SecurityError;

/// Outcome of one negotiation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Send the token (if non-empty) and wait for the peer's reply.
    Continue(Vec<u8>),
    /// Send the token (if non-empty); the context is established.
    Complete(Vec<u8>),
}

impl Step {
    /// Outbound token of this step.
    pub fn token(&self) -> &[u8] {
        match self {
            Step::Continue(token) | Step::Complete(token) => token,
        }
    }

    /// Check if negotiation is finished.
    pub fn is_complete(&self) -> bool {
        matches!(self, Step::Complete(_))
    }
}

/// Initiating side of a security mechanism.
pub trait Mechanism: Send + Sync + 'static {
    /// Context produced for one connection.
    type Initiator: InitiatorContext;

    /// Mechanism name for logs.
    fn name(&self) -> &'static str;

    /// Start a context targeting `target`, requesting `requested` flags.
    fn initiate(&self, target: &ServiceName, requested: ContextFlags) -> Result<Self::Initiator, SecurityError>;
}

/// Initiator-side context while negotiation is in progress.
pub trait InitiatorContext: Send + 'static {
    /// Established form of this context.
    type Sealer: SealingContext;

    /// Feed the peer's last token (`None` on the first call).
    fn step(&mut self, input: Option<&[u8]>) -> Result<Step, SecurityError>;

    /// Finish negotiation. Fails if the last step was not `Complete`.
    fn into_established(self) -> Result<Self::Sealer, SecurityError>;
}

/// Established initiator context able to protect outbound messages.
pub trait SealingContext: Send + 'static {
    /// Flags actually granted by the peer.
    fn flags(&self) -> ContextFlags;

    /// Protect one message. `confidential` selects encryption over
    /// integrity-only protection.
    fn wrap(&mut self, confidential: bool, message: &[u8]) -> Result<Vec<u8>, SecurityError>;
}

/// Acceptor-side context while negotiation is in progress.
pub trait AcceptorContext: Send {
    /// Established form of this context.
    type Unsealer: UnsealingContext;

    /// Process one inbound token.
    fn step(&mut self, input: &[u8]) -> Result<Step, SecurityError>;

    /// Finish negotiation. Fails if the last step was not `Complete`.
    fn into_established(self) -> Result<Self::Unsealer, SecurityError>;
}

/// A message recovered from a wrap token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unwrapped {
    /// Message bytes.
    pub message: Vec<u8>,
    /// Whether the token was encrypted.
    pub confidential: bool,
}

/// Established acceptor context able to verify inbound messages.
pub trait UnsealingContext: Send {
    /// Flags granted to the initiator.
    fn flags(&self) -> ContextFlags;

    /// Verify and, if sealed, decrypt one wrap token.
    fn unwrap_token(&mut self, token: &[u8]) -> Result<Unwrapped, SecurityError>;
}
