//! Test doubles shared by unit tests.

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::DuplexStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::core::SecurityError;
use crate::security::{
    accept, AcceptorContext, ContextFlags, InitiatorContext, Mechanism, SealingContext, ServiceName, Step,
    UnsealingContext, Unwrapped,
};
use crate::transport::{recv_token, AddressFamily, ResolvedAddress, Transport};

const DEFAULT_GRANT: ContextFlags = ContextFlags::MUTUAL
    .with(ContextFlags::SEQUENCE)
    .with(ContextFlags::INTEGRITY)
    .with(ContextFlags::CONFIDENTIALITY);

/// Mechanism needing exactly `rounds` token exchanges.
///
/// Initiator tokens are `tok-N`, acceptor replies `ack-N`. Wrapping prefixes
/// the message with `S` (sealed) or `I` (integrity).
#[derive(Debug, Clone)]
pub(crate) struct ScriptedMechanism {
    rounds: usize,
    granted: ContextFlags,
    fail_wrap: Arc<AtomicBool>,
    initiated: Arc<AtomicUsize>,
}

impl ScriptedMechanism {
    pub(crate) fn new(rounds: usize) -> Self {
        Self {
            rounds,
            granted: DEFAULT_GRANT,
            fail_wrap: Arc::new(AtomicBool::new(false)),
            initiated: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn granting(mut self, granted: ContextFlags) -> Self {
        self.granted = granted;
        self
    }

    pub(crate) fn fail_wrap(&self, fail: bool) {
        self.fail_wrap.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn initiated(&self) -> usize {
        self.initiated.load(Ordering::SeqCst)
    }
}

impl Mechanism for ScriptedMechanism {
    type Initiator = ScriptedInitiator;

    fn name(&self) -> &'static str {
        "scripted"
    }

    fn initiate(&self, _target: &ServiceName, _requested: ContextFlags) -> Result<ScriptedInitiator, SecurityError> {
        self.initiated.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedInitiator {
            rounds: self.rounds,
            sent: 0,
            complete: false,
            granted: self.granted,
            fail_wrap: self.fail_wrap.clone(),
        })
    }
}

#[derive(Debug)]
pub(crate) struct ScriptedInitiator {
    rounds: usize,
    sent: usize,
    complete: bool,
    granted: ContextFlags,
    fail_wrap: Arc<AtomicBool>,
}

impl InitiatorContext for ScriptedInitiator {
    type Sealer = ScriptedSealer;

    fn step(&mut self, input: Option<&[u8]>) -> Result<Step, SecurityError> {
        if self.complete {
            return Err(SecurityError::HandshakeFailed("already complete".into()));
        }
        let expected = self.sent.checked_sub(1).map(|k| format!("ack-{k}").into_bytes());
        if input.map(<[u8]>::to_vec) != expected {
            return Err(SecurityError::HandshakeFailed("unexpected token".into()));
        }
        if self.sent < self.rounds {
            let token = format!("tok-{}", self.sent).into_bytes();
            self.sent += 1;
            Ok(Step::Continue(token))
        } else {
            self.complete = true;
            Ok(Step::Complete(Vec::new()))
        }
    }

    fn into_established(self) -> Result<ScriptedSealer, SecurityError> {
        if !self.complete {
            return Err(SecurityError::HandshakeFailed("incomplete".into()));
        }
        Ok(ScriptedSealer {
            granted: self.granted,
            fail_wrap: self.fail_wrap,
        })
    }
}

#[derive(Debug)]
pub(crate) struct ScriptedSealer {
    granted: ContextFlags,
    fail_wrap: Arc<AtomicBool>,
}

impl SealingContext for ScriptedSealer {
    fn flags(&self) -> ContextFlags {
        self.granted
    }

    fn wrap(&mut self, confidential: bool, message: &[u8]) -> Result<Vec<u8>, SecurityError> {
        if self.fail_wrap.load(Ordering::SeqCst) {
            return Err(SecurityError::WrapFailed);
        }
        let mut token = vec![if confidential { b'S' } else { b'I' }];
        token.extend_from_slice(message);
        Ok(token)
    }
}

/// Acceptor side of [`ScriptedMechanism`].
#[derive(Debug)]
pub(crate) struct ScriptedAcceptor {
    rounds: usize,
    seen: usize,
    complete: bool,
}

impl ScriptedAcceptor {
    pub(crate) fn new(rounds: usize) -> Self {
        Self {
            rounds,
            seen: 0,
            complete: false,
        }
    }
}

impl AcceptorContext for ScriptedAcceptor {
    type Unsealer = ScriptedUnsealer;

    fn step(&mut self, input: &[u8]) -> Result<Step, SecurityError> {
        if self.complete || input != format!("tok-{}", self.seen).as_bytes() {
            return Err(SecurityError::HandshakeFailed("unexpected token".into()));
        }
        let reply = format!("ack-{}", self.seen).into_bytes();
        self.seen += 1;
        if self.seen >= self.rounds {
            self.complete = true;
            Ok(Step::Complete(reply))
        } else {
            Ok(Step::Continue(reply))
        }
    }

    fn into_established(self) -> Result<ScriptedUnsealer, SecurityError> {
        if !self.complete {
            return Err(SecurityError::HandshakeFailed("incomplete".into()));
        }
        Ok(ScriptedUnsealer)
    }
}

#[derive(Debug)]
pub(crate) struct ScriptedUnsealer;

impl UnsealingContext for ScriptedUnsealer {
    fn flags(&self) -> ContextFlags {
        DEFAULT_GRANT
    }

    fn unwrap_token(&mut self, token: &[u8]) -> Result<Unwrapped, SecurityError> {
        match token.split_first() {
            Some((b'S', message)) => Ok(Unwrapped {
                message: message.to_vec(),
                confidential: true,
            }),
            Some((b'I', message)) => Ok(Unwrapped {
                message: message.to_vec(),
                confidential: false,
            }),
            _ => Err(SecurityError::MalformedToken),
        }
    }
}

/// Read one wrap token from a peer that skipped negotiation.
pub(crate) async fn read_unwrapped(stream: &mut DuplexStream) -> Result<Vec<u8>, SecurityError> {
    let token = recv_token(stream).await?;
    Ok(ScriptedUnsealer.unwrap_token(&token)?.message)
}

/// Accept a scripted negotiation on the next peer and collect every message
/// until the initiator goes away.
pub(crate) fn spawn_acceptor(peer: oneshot::Receiver<DuplexStream>, rounds: usize) -> JoinHandle<Vec<Vec<u8>>> {
    tokio::spawn(async move {
        let mut stream = peer.await.unwrap();
        let mut ctx = accept(&mut stream, ScriptedAcceptor::new(rounds)).await.unwrap();
        let mut messages = Vec::new();
        while let Ok(unwrapped) = ctx.read_message(&mut stream).await {
            messages.push(unwrapped.message);
        }
        messages
    })
}

#[derive(Debug, Default)]
struct MockInner {
    fail_resolution: AtomicBool,
    fail_connect: AtomicBool,
    connects: AtomicUsize,
    peers: Mutex<VecDeque<oneshot::Sender<DuplexStream>>>,
}

/// In-memory transport. Every connect hands the far end of a duplex pipe to
/// the oldest receiver from [`MockTransport::next_peer`].
#[derive(Debug, Clone, Default)]
pub(crate) struct MockTransport {
    inner: Arc<MockInner>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_resolution(&self, fail: bool) {
        self.inner.fail_resolution.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_connect(&self, fail: bool) {
        self.inner.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Successful connects so far.
    pub(crate) fn connects(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn next_peer(&self) -> oneshot::Receiver<DuplexStream> {
        let (tx, rx) = oneshot::channel();
        self.inner.peers.lock().push_back(tx);
        rx
    }
}

impl Transport for MockTransport {
    type Stream = DuplexStream;

    async fn resolve(&self, host: &str, port: u16, _family: AddressFamily) -> io::Result<ResolvedAddress> {
        if self.inner.fail_resolution.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::NotFound, format!("{host}: name does not resolve")));
        }
        Ok(SocketAddr::from(([127, 0, 0, 1], port)).into())
    }

    async fn connect(&self, _address: &ResolvedAddress) -> io::Result<DuplexStream> {
        if self.inner.fail_connect.load(Ordering::SeqCst) {
            return Err(io::ErrorKind::ConnectionRefused.into());
        }
        let peer = self
            .inner
            .peers
            .lock()
            .pop_front()
            .ok_or(io::ErrorKind::ConnectionRefused)?;
        let (client, server) = tokio::io::duplex(64 * 1024);
        let _ = peer.send(server);
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        Ok(client)
    }
}
