//! Negotiation drivers and established contexts.
//!
//! [`negotiate`] runs the initiator loop: step the context, transmit its token
//! when non-empty, and while it asks to continue, read the peer's reply and
//! feed it back. [`accept`] is the mirror image for receivers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use super::{
    AcceptorContext, ContextFlags, InitiatorContext, Mechanism, SealingContext, ServiceName, Step,
    UnsealingContext, Unwrapped,
};
use crate::config::SecurityMode;
use crate::core::{SecurityError, MAX_HANDSHAKE_ROUNDS};
use crate::transport::{recv_token, send_token};

/// Progress of a destination's security negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NegotiationState {
    /// No context exists.
    #[default]
    NotStarted,
    /// Tokens are being exchanged.
    InProgress,
    /// Context ready for wrapping.
    Established,
    /// The last attempt failed; the context was discarded.
    Failed,
}

/// Process-unique context identifier for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// Flags the initiator requests for `mode`.
///
/// Mutual authentication is always required.
pub fn required_flags(mode: SecurityMode) -> ContextFlags {
    match mode {
        SecurityMode::Integrity => ContextFlags::MUTUAL | ContextFlags::INTEGRITY,
        SecurityMode::Encryption => ContextFlags::MUTUAL | ContextFlags::CONFIDENTIALITY,
    }
}

/// An established initiator context bound to one connection.
#[derive(Debug)]
pub struct EstablishedContext<C> {
    id: ContextId,
    target: ServiceName,
    mode: SecurityMode,
    flags: ContextFlags,
    rounds: usize,
    inner: C,
}

impl<C: SealingContext> EstablishedContext<C> {
    /// Protect one outbound message according to the negotiated mode.
    pub fn wrap(&mut self, message: &[u8]) -> Result<Vec<u8>, SecurityError> {
        self.inner.wrap(self.mode.is_confidential(), message)
    }

    /// Context identifier.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Principal this context was negotiated with.
    pub fn target(&self) -> &ServiceName {
        &self.target
    }

    /// Protection mode.
    pub fn mode(&self) -> SecurityMode {
        self.mode
    }

    /// Granted flags.
    pub fn flags(&self) -> ContextFlags {
        self.flags
    }

    /// Number of inbound tokens consumed during negotiation.
    pub fn rounds(&self) -> usize {
        self.rounds
    }
}

/// An established acceptor context.
#[derive(Debug)]
pub struct AcceptedContext<U> {
    id: ContextId,
    flags: ContextFlags,
    inner: U,
}

impl<U: UnsealingContext> AcceptedContext<U> {
    /// Verify one wrap token.
    pub fn unwrap_token(&mut self, token: &[u8]) -> Result<Unwrapped, SecurityError> {
        self.inner.unwrap_token(token)
    }

    /// Read the next wrap token from `stream` and verify it.
    pub async fn read_message<S>(&mut self, stream: &mut S) -> Result<Unwrapped, SecurityError>
    where
        S: AsyncRead + Unpin,
    {
        let token = recv_token(stream).await?;
        self.inner.unwrap_token(&token)
    }

    /// Context identifier.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Granted flags.
    pub fn flags(&self) -> ContextFlags {
        self.flags
    }
}

/// Negotiate an initiator context over `stream`.
pub async fn negotiate<M, S>(
    stream: &mut S,
    mechanism: &M,
    target: &ServiceName,
    mode: SecurityMode,
) -> Result<EstablishedContext<<M::Initiator as InitiatorContext>::Sealer>, SecurityError>
where
    M: Mechanism,
    S: AsyncRead + AsyncWrite + Unpin,
{
    let id = ContextId::next();
    let requested = required_flags(mode);
    debug!(context = %id, %target, mechanism = mechanism.name(), %requested, "starting negotiation");

    let mut ctx = mechanism.initiate(target, requested)?;
    let mut input: Option<Vec<u8>> = None;
    let mut rounds = 0;

    loop {
        let step = ctx.step(input.as_deref())?;
        if !step.token().is_empty() {
            send_token(stream, step.token()).await?;
            debug!(context = %id, len = step.token().len(), "sent negotiation token");
        }
        if let Step::Complete(_) = step {
            break;
        }
        if rounds == MAX_HANDSHAKE_ROUNDS {
            return Err(SecurityError::TooManyRounds(rounds));
        }
        let reply = recv_token(stream).await?;
        rounds += 1;
        debug!(context = %id, round = rounds, len = reply.len(), "received negotiation token");
        input = Some(reply);
    }

    let sealer = ctx.into_established()?;
    let granted = sealer.flags();
    let missing = requested.difference(granted);
    if !missing.is_empty() {
        warn!(context = %id, %target, %granted, %missing, "peer did not grant requested flags");
        return Err(SecurityError::MissingCapability(missing.to_string()));
    }

    debug!(context = %id, %target, %granted, rounds, "context established");
    Ok(EstablishedContext {
        id,
        target: target.clone(),
        mode,
        flags: granted,
        rounds,
        inner: sealer,
    })
}

/// Accept an inbound negotiation over `stream`.
pub async fn accept<A, S>(stream: &mut S, mut ctx: A) -> Result<AcceptedContext<A::Unsealer>, SecurityError>
where
    A: AcceptorContext,
    S: AsyncRead + AsyncWrite + Unpin,
{
    let id = ContextId::next();
    let mut rounds = 0;

    loop {
        if rounds == MAX_HANDSHAKE_ROUNDS {
            return Err(SecurityError::TooManyRounds(rounds));
        }
        let input = recv_token(stream).await?;
        rounds += 1;
        match ctx.step(&input)? {
            // The initiator is waiting for a reply, so even an empty token goes out.
            Step::Continue(token) => send_token(stream, &token).await?,
            Step::Complete(token) => {
                if !token.is_empty() {
                    send_token(stream, &token).await?;
                }
                break;
            }
        }
    }

    let unsealer = ctx.into_established()?;
    let flags = unsealer.flags();
    debug!(context = %id, %flags, rounds, "accepted context");
    Ok(AcceptedContext {
        id,
        flags,
        inner: unsealer,
    })
}
