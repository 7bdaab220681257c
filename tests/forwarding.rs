//! End-to-end forwarding over loopback TCP with the Noise mechanism.

#![cfg(feature = "noise")]

use std::time::Duration;

use gssfwd::codec::WireCodec;
use gssfwd::crypto::{Keyring, NoiseMechanism, NoiseResponder, StaticKeypair};
use gssfwd::prelude::*;
use gssfwd::security::accept;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug)]
struct Received {
    connection: usize,
    message: Vec<u8>,
    confidential: bool,
}

struct Relay {
    port: u16,
    public_key: [u8; 32],
    messages: mpsc::UnboundedReceiver<Received>,
    task: JoinHandle<()>,
}

impl Relay {
    async fn next(&mut self) -> Received {
        tokio::time::timeout(Duration::from_secs(5), self.messages.recv())
            .await
            .expect("relay timed out")
            .expect("relay stopped")
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn principal() -> ServiceName {
    ServiceName::new("host", "127.0.0.1")
}

/// Accept connections one at a time. The first connection is dropped after
/// `drop_first_after` messages when set.
async fn start_relay(responder: NoiseResponder, drop_first_after: Option<usize>) -> Relay {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let public_key = *responder.public_key();
    let (tx, messages) = mpsc::unbounded_channel();

    let task = tokio::spawn(async move {
        let mut connection = 0;
        while let Ok((mut stream, _)) = listener.accept().await {
            let acceptor = responder.acceptor().unwrap();
            if let Ok(mut ctx) = accept(&mut stream, acceptor).await {
                let mut count = 0;
                while let Ok(unwrapped) = ctx.read_message(&mut stream).await {
                    let _ = tx.send(Received {
                        connection,
                        message: unwrapped.message,
                        confidential: unwrapped.confidential,
                    });
                    count += 1;
                    if connection == 0 && Some(count) == drop_first_after {
                        break;
                    }
                }
            }
            connection += 1;
        }
    });

    Relay {
        port,
        public_key,
        messages,
        task,
    }
}

fn destination(
    relay: &Relay,
    security: SecurityConfig,
    framing: Framing,
    level: u8,
) -> Destination<TcpTransport, NoiseMechanism> {
    let config = ForwardConfig::builder("127.0.0.1")
        .port(relay.port)
        .framing(framing)
        .compression_level(level)
        .build()
        .unwrap();
    let keyring = Keyring::new().with(principal(), relay.public_key);
    Destination::tcp(config, security, NoiseMechanism::new(StaticKeypair::generate(), keyring))
}

#[tokio::test]
async fn test_compressed_traditional_message() {
    let responder = NoiseResponder::new(StaticKeypair::generate(), principal());
    let mut relay = start_relay(responder, None).await;
    let mut dest = destination(&relay, SecurityConfig::default(), Framing::Traditional, 5);

    let message = vec![b'.'; 2000];
    assert_eq!(dest.send(&message).await.unwrap(), SendOutcome::Sent);

    let received = relay.next().await;
    assert!(received.confidential);
    let wire = received.message;
    assert_eq!(wire.last(), Some(&b'\n'));
    if cfg!(feature = "compression") {
        assert_eq!(wire[0], b'z');
        assert!(wire.len() < 2000);
    }

    let (decoded, rest) = WireCodec::new(Framing::Traditional, 5).decode(&wire).unwrap();
    assert_eq!(decoded, message);
    assert!(rest.is_empty());
}

#[tokio::test]
async fn test_octet_counted_hello_through_forwarder() {
    let responder = NoiseResponder::new(StaticKeypair::generate(), principal());
    let mut relay = start_relay(responder, None).await;
    let dest = destination(&relay, SecurityConfig::default(), Framing::OctetCounting, 0);
    let handle = Forwarder::spawn(dest);

    assert_eq!(handle.send("hello").await.unwrap(), SendOutcome::Sent);
    assert_eq!(relay.next().await.message, b"5 hello");

    let status = handle.status().await.unwrap();
    assert_eq!(status.phase, ConnectionPhase::Active);
    assert_eq!(status.negotiation, NegotiationState::Established);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_every_message_reaches_relay() {
    let responder = NoiseResponder::new(StaticKeypair::generate(), principal());
    let mut relay = start_relay(responder, None).await;
    let handle = Forwarder::spawn(destination(&relay, SecurityConfig::default(), Framing::Traditional, 5));

    let lines: Vec<String> = (0..20)
        .map(|i| format!("<30>Oct 17 09:{i:02}:11 db{i} postgres[{}]: checkpoint complete ", 400 + i).repeat(12))
        .collect();
    for line in &lines {
        assert_eq!(handle.send(line.as_str()).await.unwrap(), SendOutcome::Sent);
    }

    let codec = WireCodec::new(Framing::Traditional, 5);
    for line in &lines {
        let received = relay.next().await;
        assert_eq!(received.connection, 0);
        let (decoded, rest) = codec.decode(&received.message).unwrap();
        assert_eq!(decoded, line.as_bytes());
        assert!(rest.is_empty());
    }
    handle.shutdown().await;
}

#[tokio::test]
async fn test_unresolvable_host_stays_unresolved() {
    let config = ForwardConfig::builder("nosuchhost.invalid").build().unwrap();
    let keyring = Keyring::new();
    let mut dest = Destination::tcp(
        config,
        SecurityConfig::default(),
        NoiseMechanism::new(StaticKeypair::generate(), keyring),
    );

    let err = dest.send(b"dropped").await.unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(err, ForwardError::Resolution { .. }));
    assert_eq!(dest.phase(), ConnectionPhase::Unresolved);
    assert_eq!(dest.retry_count(), 1);
    assert!(!dest.is_connected());
    assert_eq!(dest.send_status(), SendStatus::NotConnected);
}

#[tokio::test]
async fn test_write_error_suspends_and_renegotiates() {
    let responder = NoiseResponder::new(StaticKeypair::generate(), principal());
    let mut relay = start_relay(responder, Some(1)).await;
    let mut dest = destination(&relay, SecurityConfig::default(), Framing::OctetCounting, 0);

    dest.send(b"first").await.unwrap();
    let first = relay.next().await;
    assert_eq!((first.connection, first.message.as_slice()), (0, &b"5 first"[..]));

    // The relay has hung up; writes fail once the reset arrives.
    let mut failure = None;
    for _ in 0..100 {
        match dest.send(b"ping").await {
            Ok(_) => tokio::time::sleep(Duration::from_millis(20)).await,
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    let failure = failure.expect("write never failed");
    assert!(matches!(failure, ForwardError::Transport(_)));
    assert_eq!(dest.phase(), ConnectionPhase::Suspended);
    assert!(!dest.is_connected());
    assert_eq!(dest.send_status(), SendStatus::NotConnected);
    assert_eq!(dest.negotiation_state(), NegotiationState::NotStarted);

    assert_eq!(dest.send(b"again").await.unwrap(), SendOutcome::Sent);
    assert_eq!(dest.phase(), ConnectionPhase::Active);
    assert_eq!(dest.negotiation_state(), NegotiationState::Established);

    let again = relay.next().await;
    assert_eq!((again.connection, again.message.as_slice()), (1, &b"5 again"[..]));
}

#[tokio::test]
async fn test_integrity_mode_is_not_confidential() {
    let responder = NoiseResponder::new(StaticKeypair::generate(), principal());
    let mut relay = start_relay(responder, None).await;
    let mut dest = destination(
        &relay,
        SecurityConfig::new(SecurityMode::Integrity),
        Framing::OctetCounting,
        0,
    );

    dest.send(b"signed only").await.unwrap();
    let received = relay.next().await;
    assert!(!received.confidential);
    assert_eq!(received.message, b"11 signed only");
}

#[tokio::test]
async fn test_unauthorized_initiator_is_suspended() {
    let stranger = StaticKeypair::generate();
    let responder = NoiseResponder::new(StaticKeypair::generate(), principal()).authorize(*stranger.public_key());
    let relay = start_relay(responder, None).await;
    let mut dest = destination(&relay, SecurityConfig::default(), Framing::OctetCounting, 0);

    let err = dest.send(b"rejected").await.unwrap_err();
    assert!(matches!(err, ForwardError::Handshake(_)));
    assert_eq!(dest.phase(), ConnectionPhase::Suspended);
    assert_eq!(dest.negotiation_state(), NegotiationState::Failed);
}
