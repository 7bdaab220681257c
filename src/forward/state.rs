//! Per-destination connection state machine.
//!
//! ```text
//!              resolve ok                      send failure
//! Unresolved ─────────────► Active ◄───────────────────────┐
//!     ▲  │ resolve fail       │                            │
//!     └──┘                    └────────► Suspended ────────┘
//!                                send failure     resume (no network check)
//! ```
//!
//! Each variant carries only the data valid in that state: an `Active`
//! destination always has an address, and only an `Active` destination can
//! hold a connection.

use std::time::Instant;

use crate::security::EstablishedContext;
use crate::transport::ResolvedAddress;

/// Connection health as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Address unknown; resolution failed or has not happened yet.
    Unresolved,
    /// Believed reachable; sends are attempted.
    Active,
    /// A send failed; waiting for resumption.
    Suspended,
}

/// An open stream with its established security context.
///
/// Dropping it closes the socket and releases the context.
#[derive(Debug)]
pub struct Connection<S, C> {
    pub(crate) stream: S,
    pub(crate) context: EstablishedContext<C>,
}

impl<S, C> Connection<S, C> {
    pub(crate) fn new(stream: S, context: EstablishedContext<C>) -> Self {
        Self { stream, context }
    }
}

#[derive(Debug)]
pub(crate) enum ConnectionState<S, C> {
    Unresolved {
        since: Instant,
    },
    Active {
        address: ResolvedAddress,
        connection: Option<Connection<S, C>>,
    },
    Suspended {
        address: ResolvedAddress,
        since: Instant,
    },
}

impl<S, C> ConnectionState<S, C> {
    pub(crate) fn unresolved() -> Self {
        ConnectionState::Unresolved { since: Instant::now() }
    }

    pub(crate) fn phase(&self) -> ConnectionPhase {
        match self {
            ConnectionState::Unresolved { .. } => ConnectionPhase::Unresolved,
            ConnectionState::Active { .. } => ConnectionPhase::Active,
            ConnectionState::Suspended { .. } => ConnectionPhase::Suspended,
        }
    }

    pub(crate) fn address(&self) -> Option<&ResolvedAddress> {
        match self {
            ConnectionState::Unresolved { .. } => None,
            ConnectionState::Active { address, .. } | ConnectionState::Suspended { address, .. } => Some(address),
        }
    }

    pub(crate) fn connection_mut(&mut self) -> Option<&mut Connection<S, C>> {
        match self {
            ConnectionState::Active { connection, .. } => connection.as_mut(),
            _ => None,
        }
    }

    pub(crate) fn has_connection(&self) -> bool {
        matches!(self, ConnectionState::Active { connection: Some(_), .. })
    }

    /// Time the destination entered its current non-active state.
    pub(crate) fn since(&self) -> Option<Instant> {
        match self {
            ConnectionState::Unresolved { since } | ConnectionState::Suspended { since, .. } => Some(*since),
            ConnectionState::Active { .. } => None,
        }
    }

    /// `Unresolved -> Active` after a successful resolution.
    pub(crate) fn resolved(&mut self, address: ResolvedAddress) {
        debug_assert!(matches!(self, ConnectionState::Unresolved { .. }));
        *self = ConnectionState::Active {
            address,
            connection: None,
        };
    }

    /// `Suspended -> Active`. Returns false in any other state.
    pub(crate) fn resume(&mut self) -> bool {
        match std::mem::replace(self, Self::unresolved()) {
            ConnectionState::Suspended { address, .. } => {
                *self = ConnectionState::Active {
                    address,
                    connection: None,
                };
                true
            }
            other => {
                *self = other;
                false
            }
        }
    }

    /// Store the connection of an `Active` destination.
    ///
    /// Returns the connection back if the destination is not `Active`.
    pub(crate) fn attach(&mut self, conn: Connection<S, C>) -> Result<(), Connection<S, C>> {
        match self {
            ConnectionState::Active { connection, .. } => {
                *connection = Some(conn);
                Ok(())
            }
            _ => Err(conn),
        }
    }

    /// Drop any connection, keeping the phase. Idempotent.
    pub(crate) fn detach(&mut self) -> Option<Connection<S, C>> {
        match self {
            ConnectionState::Active { connection, .. } => connection.take(),
            _ => None,
        }
    }

    /// `Active -> Suspended`, dropping the connection.
    ///
    /// Other states are left as they are.
    pub(crate) fn suspend(&mut self, now: Instant) {
        match std::mem::replace(self, Self::unresolved()) {
            ConnectionState::Active { address, connection } => {
                drop(connection);
                *self = ConnectionState::Suspended { address, since: now };
            }
            other => *self = other,
        }
    }
}
