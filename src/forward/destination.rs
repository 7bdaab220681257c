//! One forwarding target: resolve, connect, negotiate, wrap, send.

use std::time::Instant;

use tracing::{debug, info, warn};

use super::slot::{SendSlot, SendStatus};
use super::state::{Connection, ConnectionPhase, ConnectionState};
use crate::codec::{CompressionStats, WireCodec};
use crate::config::{ForwardConfig, SecurityConfig};
use crate::core::{ForwardError, SecurityError, RETRY_MAX};
use crate::security::{negotiate, InitiatorContext, Mechanism, NegotiationState, ServiceName};
use crate::transport::{send_token, ResolvedAddress, TcpTransport, Transport};

type Sealer<M> = <<M as Mechanism>::Initiator as InitiatorContext>::Sealer;
type State<T, M> = ConnectionState<<T as Transport>::Stream, Sealer<M>>;

/// Result of a successful [`Destination::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Wrapped and written to the socket.
    Sent,
    /// Parked until the socket reports write readiness.
    Buffered,
}

/// Point-in-time view of a destination.
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationStatus {
    /// Connection phase.
    pub phase: ConnectionPhase,
    /// Socket status.
    pub send_status: SendStatus,
    /// Security negotiation progress.
    pub negotiation: NegotiationState,
    /// Failed resolutions since the last success (capped).
    pub retry_count: u32,
    /// When the destination became unresolved or suspended.
    pub suspended_at: Option<Instant>,
    /// Last successful transmission.
    pub last_sent_at: Option<Instant>,
    /// Compression decisions so far.
    pub compression: CompressionStats,
}

fn transport_error(err: SecurityError) -> ForwardError {
    match err {
        SecurityError::Io(e) => ForwardError::Transport(e),
        other => ForwardError::Wrap(other),
    }
}

/// A configured forwarding target.
///
/// Owns the connection state machine, the socket and security context
/// (present only while `Active`), and the [`SendSlot`] shared with the
/// write-readiness path.
pub struct Destination<T: Transport, M: Mechanism> {
    config: ForwardConfig,
    security: SecurityConfig,
    principal: ServiceName,
    codec: WireCodec,
    transport: T,
    mechanism: M,
    state: State<T, M>,
    slot: SendSlot,
    negotiation: NegotiationState,
    retry_count: u32,
    last_sent_at: Option<Instant>,
    stats: CompressionStats,
}

impl<M: Mechanism> Destination<TcpTransport, M> {
    /// Create a TCP destination using the configured connect timeout.
    pub fn tcp(config: ForwardConfig, security: SecurityConfig, mechanism: M) -> Self {
        let transport = TcpTransport::new(config.connect_timeout);
        Self::new(config, security, transport, mechanism)
    }
}

impl<T: Transport, M: Mechanism> Destination<T, M> {
    /// Create a destination in the `Unresolved` phase.
    ///
    /// `security` is snapshotted; later changes to the caller's copy do not
    /// affect this destination.
    pub fn new(config: ForwardConfig, security: SecurityConfig, transport: T, mechanism: M) -> Self {
        let codec = WireCodec::new(config.framing, config.compression_level)
            .with_max_message_size(config.max_message_size);
        let principal = security.principal_for(&config.host);

        Self {
            config,
            security,
            principal,
            codec,
            transport,
            mechanism,
            state: ConnectionState::unresolved(),
            slot: SendSlot::new(),
            negotiation: NegotiationState::NotStarted,
            retry_count: 0,
            last_sent_at: None,
            stats: CompressionStats::default(),
        }
    }

    /// Forward one message.
    ///
    /// A destination that is not `Active` is resumed first. Handshake, wrap
    /// and transport failures close the socket, drop the context and suspend
    /// the destination; the message is not retried.
    pub async fn send(&mut self, message: &[u8]) -> Result<SendOutcome, ForwardError> {
        if self.phase() != ConnectionPhase::Active {
            self.try_resume().await?;
            if self.phase() != ConnectionPhase::Active {
                return Err(ForwardError::Suspended);
            }
        }

        let encoded = self.codec.encode_with_stats(message, Some(&mut self.stats));
        match self.slot.buffer_if_connecting(encoded) {
            Ok(replaced) => {
                if replaced.is_some() {
                    debug!(host = %self.config.host, "pending message replaced");
                }
                Ok(SendOutcome::Buffered)
            }
            Err(encoded) => {
                // A flush posted by the readiness path may still be queued.
                self.flush_pending().await?;
                self.transmit(&encoded).await?;
                Ok(SendOutcome::Sent)
            }
        }
    }

    /// Attempt to leave `Unresolved` or `Suspended`.
    ///
    /// From `Suspended` this succeeds without touching the network; the next
    /// send proves reachability. From `Unresolved` the host is resolved again.
    /// Calling it while `Active` does nothing.
    pub async fn try_resume(&mut self) -> Result<(), ForwardError> {
        match self.state.phase() {
            ConnectionPhase::Active => {
                debug!(host = %self.config.host, "resume requested while active, ignoring");
                Ok(())
            }
            ConnectionPhase::Suspended => {
                self.state.resume();
                debug!(host = %self.config.host, port = self.config.port, "destination resumed");
                Ok(())
            }
            ConnectionPhase::Unresolved => {
                let host = &self.config.host;
                match self
                    .transport
                    .resolve(host, self.config.port, self.config.address_family)
                    .await
                {
                    Ok(address) => {
                        debug!(%host, port = self.config.port, addr = %address.primary(), "host resolved, resuming");
                        self.state.resolved(address);
                        self.retry_count = 0;
                        Ok(())
                    }
                    Err(source) => {
                        self.retry_count = (self.retry_count + 1).min(RETRY_MAX);
                        debug!(%host, retries = self.retry_count, error = %source, "resolution failed");
                        Err(ForwardError::Resolution {
                            host: host.clone(),
                            source,
                        })
                    }
                }
            }
        }
    }

    /// Record write readiness and flush any pending message.
    ///
    /// Returns whether a pending message was sent.
    pub async fn notify_writable(&mut self) -> Result<bool, ForwardError> {
        if !self.slot.mark_writable() {
            debug!(host = %self.config.host, status = ?self.slot.status(), "spurious write readiness");
        }
        self.flush_pending().await
    }

    /// Send the pending message, if any.
    ///
    /// The slot is cleared whatever the outcome.
    pub async fn flush_pending(&mut self) -> Result<bool, ForwardError> {
        let Some(pending) = self.slot.take_pending() else {
            return Ok(false);
        };
        if self.phase() != ConnectionPhase::Active {
            info!(host = %self.config.host, "dropping pending message, destination not active");
            return Err(ForwardError::Suspended);
        }
        self.transmit(&pending).await?;
        Ok(true)
    }

    /// Close the socket and release the security context. Idempotent.
    ///
    /// A message still parked in the slot belonged to this connection and is
    /// discarded with it.
    pub fn close(&mut self) {
        if self.state.detach().is_some() {
            debug!(host = %self.config.host, "connection closed");
        }
        if self.slot.reset().is_some() {
            debug!(host = %self.config.host, "pending message discarded on close");
        }
        if self.negotiation == NegotiationState::Established {
            self.negotiation = NegotiationState::NotStarted;
        }
    }

    async fn transmit(&mut self, encoded: &[u8]) -> Result<(), ForwardError> {
        match self.transmit_once(encoded).await {
            Ok(()) => {
                self.last_sent_at = Some(Instant::now());
                Ok(())
            }
            Err(err) => {
                self.suspend(&err);
                Err(err)
            }
        }
    }

    async fn transmit_once(&mut self, encoded: &[u8]) -> Result<(), ForwardError> {
        if !self.state.has_connection() {
            self.connect().await?;
        }
        let conn = self.state.connection_mut().ok_or(ForwardError::Suspended)?;
        let token = conn.context.wrap(encoded).map_err(ForwardError::Wrap)?;
        send_token(&mut conn.stream, &token).await.map_err(transport_error)?;
        debug!(host = %self.config.host, context = %conn.context.id(), len = token.len(), "message sent");
        Ok(())
    }

    async fn connect(&mut self) -> Result<(), ForwardError> {
        let address = self.state.address().cloned().ok_or(ForwardError::Suspended)?;
        let mut stream = self
            .transport
            .connect(&address)
            .await
            .map_err(ForwardError::Transport)?;
        self.slot.set_status(SendStatus::Connecting);

        self.negotiation = NegotiationState::InProgress;
        match negotiate(&mut stream, &self.mechanism, &self.principal, self.security.mode).await {
            Ok(context) => {
                self.negotiation = NegotiationState::Established;
                // The stream is connected and the handshake is over, so it is writable.
                self.slot.set_status(SendStatus::Ready);
                debug!(
                    host = %self.config.host,
                    context = %context.id(),
                    flags = %context.flags(),
                    "security context established"
                );
                self.state
                    .attach(Connection::new(stream, context))
                    .map_err(|_| ForwardError::Suspended)
            }
            Err(e) => {
                self.negotiation = NegotiationState::Failed;
                Err(ForwardError::Handshake(e))
            }
        }
    }

    fn suspend(&mut self, err: &ForwardError) {
        warn!(
            host = %self.config.host,
            port = self.config.port,
            error = %err,
            "forwarding failed, suspending destination"
        );
        self.close();
        self.state.suspend(Instant::now());
    }

    /// Current connection phase.
    pub fn phase(&self) -> ConnectionPhase {
        self.state.phase()
    }

    /// Current socket status.
    pub fn send_status(&self) -> SendStatus {
        self.slot.status()
    }

    /// True while the host should report write readiness.
    pub fn wants_write_notification(&self) -> bool {
        self.phase() == ConnectionPhase::Active && self.slot.wants_write_notification()
    }

    /// Handle to the status/pending slot shared with the readiness path.
    pub fn slot(&self) -> SendSlot {
        self.slot.clone()
    }

    /// Security negotiation progress.
    pub fn negotiation_state(&self) -> NegotiationState {
        self.negotiation
    }

    /// Failed resolutions since the last success.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// When the destination became unresolved or suspended.
    pub fn suspended_at(&self) -> Option<Instant> {
        self.state.since()
    }

    /// Last successful transmission.
    pub fn last_sent_at(&self) -> Option<Instant> {
        self.last_sent_at
    }

    /// Check if a socket is open.
    pub fn is_connected(&self) -> bool {
        self.state.has_connection()
    }

    /// Address from the last successful resolution.
    pub fn address(&self) -> Option<&ResolvedAddress> {
        self.state.address()
    }

    /// Principal used for negotiation.
    pub fn principal(&self) -> &ServiceName {
        &self.principal
    }

    /// Destination settings.
    pub fn config(&self) -> &ForwardConfig {
        &self.config
    }

    /// Compression decisions so far.
    pub fn compression_stats(&self) -> &CompressionStats {
        &self.stats
    }

    /// Snapshot of the bookkeeping above.
    pub fn status(&self) -> DestinationStatus {
        DestinationStatus {
            phase: self.phase(),
            send_status: self.send_status(),
            negotiation: self.negotiation,
            retry_count: self.retry_count,
            suspended_at: self.suspended_at(),
            last_sent_at: self.last_sent_at,
            compression: self.stats.clone(),
        }
    }
}

impl<T: Transport, M: Mechanism> std::fmt::Debug for Destination<T, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Destination")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("phase", &self.phase())
            .field("send_status", &self.send_status())
            .field("negotiation", &self.negotiation)
            .finish_non_exhaustive()
    }
}
