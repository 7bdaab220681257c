//! Name resolution and stream establishment.
//!
//! [`Transport`] is the seam between the forwarding engine and the network;
//! [`TcpTransport`] is the production implementation.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::core::DEFAULT_CONNECT_TIMEOUT;

/// Address family used when resolving a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressFamily {
    /// Any family the resolver returns.
    #[default]
    Any,
    /// IPv4 only.
    Ipv4,
    /// IPv6 only.
    Ipv6,
}

impl AddressFamily {
    /// Check if an address belongs to this family.
    pub fn accepts(self, addr: &SocketAddr) -> bool {
        match self {
            AddressFamily::Any => true,
            AddressFamily::Ipv4 => addr.is_ipv4(),
            AddressFamily::Ipv6 => addr.is_ipv6(),
        }
    }
}

/// Result of a successful resolution: one or more socket addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAddress {
    addrs: Vec<SocketAddr>,
}

impl ResolvedAddress {
    /// Wrap a resolver result. Returns `None` if it is empty.
    pub fn new(addrs: Vec<SocketAddr>) -> Option<Self> {
        if addrs.is_empty() {
            None
        } else {
            Some(Self { addrs })
        }
    }

    /// All candidate addresses in resolver order.
    pub fn addrs(&self) -> &[SocketAddr] {
        &self.addrs
    }

    /// First candidate address.
    pub fn primary(&self) -> SocketAddr {
        self.addrs[0]
    }
}

impl From<SocketAddr> for ResolvedAddress {
    fn from(addr: SocketAddr) -> Self {
        Self { addrs: vec![addr] }
    }
}

/// Network operations needed by a destination.
pub trait Transport: Send + Sync + 'static {
    /// Connected byte stream.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Resolve `host` with a numeric port.
    fn resolve(
        &self,
        host: &str,
        port: u16,
        family: AddressFamily,
    ) -> impl Future<Output = io::Result<ResolvedAddress>> + Send;

    /// Open a stream to one of the resolved addresses.
    fn connect(&self, address: &ResolvedAddress) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

/// TCP transport using the tokio resolver.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    connect_timeout: Duration,
}

impl TcpTransport {
    /// Create a transport with the given connect timeout.
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Connect timeout in use.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl Transport for TcpTransport {
    type Stream = TcpStream;

    async fn resolve(&self, host: &str, port: u16, family: AddressFamily) -> io::Result<ResolvedAddress> {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
            .await?
            .filter(|addr| family.accepts(addr))
            .collect();

        ResolvedAddress::new(addrs).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no {family:?} address for {host}"),
            )
        })
    }

    async fn connect(&self, address: &ResolvedAddress) -> io::Result<TcpStream> {
        let mut last_err = None;
        for addr in address.addrs() {
            match tokio::time::timeout(self.connect_timeout, TcpStream::connect(*addr)).await {
                Ok(Ok(stream)) => {
                    stream.set_nodelay(true)?;
                    tracing::debug!(%addr, "connected");
                    return Ok(stream);
                }
                Ok(Err(e)) => {
                    tracing::debug!(%addr, error = %e, "connect failed");
                    last_err = Some(e);
                }
                Err(_) => {
                    tracing::debug!(%addr, "connect timed out");
                    last_err = Some(io::ErrorKind::TimedOut.into());
                }
            }
        }
        Err(last_err.unwrap_or_else(|| io::ErrorKind::AddrNotAvailable.into()))
    }
}
