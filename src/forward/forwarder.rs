//! Send path as a tokio task.
//!
//! The [`Destination`] is owned by one task and driven by commands from
//! any number of [`ForwarderHandle`] clones. Write readiness is recorded
//! directly on the shared [`SendSlot`] and followed by a flush command, so
//! the status flip never waits behind a send in progress.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error};

use super::destination::{Destination, DestinationStatus, SendOutcome};
use super::slot::SendSlot;
use super::state::ConnectionPhase;
use crate::core::ForwardError;
use crate::security::Mechanism;
use crate::transport::Transport;

const COMMAND_QUEUE_DEPTH: usize = 64;

#[derive(Debug)]
enum Command {
    Send {
        message: Vec<u8>,
        reply: oneshot::Sender<Result<SendOutcome, ForwardError>>,
    },
    Flush,
    Resume {
        reply: oneshot::Sender<Result<(), ForwardError>>,
    },
    Status {
        reply: oneshot::Sender<DestinationStatus>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Task owning one destination.
pub struct Forwarder<T: Transport, M: Mechanism> {
    destination: Destination<T, M>,
    rx: mpsc::Receiver<Command>,
}

impl<T: Transport, M: Mechanism> Forwarder<T, M> {
    /// Move `destination` into a new task and return a handle to it.
    pub fn spawn(destination: Destination<T, M>) -> ForwarderHandle {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let slot = destination.slot();
        let forwarder = Self { destination, rx };
        tokio::spawn(forwarder.run());
        ForwarderHandle { tx, slot }
    }

    async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            match command {
                Command::Send { message, reply } => {
                    let result = self.destination.send(&message).await;
                    let _ = reply.send(result);
                }
                Command::Flush => {
                    if let Err(e) = self.destination.flush_pending().await {
                        error!(
                            host = %self.destination.config().host,
                            port = self.destination.config().port,
                            error = %e,
                            "flushing pending message failed"
                        );
                    }
                }
                Command::Resume { reply } => {
                    let result = self.destination.try_resume().await;
                    let _ = reply.send(result);
                }
                Command::Status { reply } => {
                    let _ = reply.send(self.destination.status());
                }
                Command::Shutdown { reply } => {
                    self.destination.close();
                    debug!(host = %self.destination.config().host, "forwarder stopped");
                    let _ = reply.send(());
                    return;
                }
            }
        }
        self.destination.close();
    }
}

/// Host-side surface of a running [`Forwarder`].
///
/// Cheap to clone. Every call fails with [`ForwardError::Shutdown`] once the
/// forwarder has stopped.
#[derive(Debug, Clone)]
pub struct ForwarderHandle {
    tx: mpsc::Sender<Command>,
    slot: SendSlot,
}

impl ForwarderHandle {
    async fn request<R>(&self, command: impl FnOnce(oneshot::Sender<R>) -> Command) -> Result<R, ForwardError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| ForwardError::Shutdown)?;
        rx.await.map_err(|_| ForwardError::Shutdown)
    }

    /// Forward one message and wait for the outcome.
    pub async fn send(&self, message: impl Into<Vec<u8>>) -> Result<SendOutcome, ForwardError> {
        let message = message.into();
        self.request(|reply| Command::Send { message, reply }).await?
    }

    /// True while the host should watch the socket for write readiness.
    pub fn wants_write_notification(&self) -> bool {
        self.slot.wants_write_notification()
    }

    /// Report write readiness.
    ///
    /// The status becomes `Ready` before this returns; the pending message
    /// is flushed by the forwarder task.
    pub async fn notify_writable(&self) -> Result<(), ForwardError> {
        if !self.slot.mark_writable() {
            debug!(status = ?self.slot.status(), "write readiness outside connecting");
        }
        self.tx.send(Command::Flush).await.map_err(|_| ForwardError::Shutdown)
    }

    /// Ask the destination to leave `Unresolved` or `Suspended`.
    pub async fn try_resume(&self) -> Result<(), ForwardError> {
        self.request(|reply| Command::Resume { reply }).await?
    }

    /// Snapshot of the destination's bookkeeping.
    pub async fn status(&self) -> Result<DestinationStatus, ForwardError> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// Close the connection and stop the forwarder. Idempotent.
    pub async fn shutdown(&self) {
        let _ = self.request(|reply| Command::Shutdown { reply }).await;
    }

    /// Check if the forwarder task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Periodically resume the destination behind `handle` while it is not
/// `Active`. The first attempt happens one `period` from now.
///
/// Stops once the forwarder shuts down.
pub fn spawn_resume_ticker(handle: ForwarderHandle, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Ok(status) = handle.status().await else {
                break;
            };
            if status.phase == ConnectionPhase::Active {
                continue;
            }
            match handle.try_resume().await {
                Ok(()) => debug!(phase = ?status.phase, "periodic resumption succeeded"),
                Err(ForwardError::Shutdown) => break,
                Err(e) => debug!(error = %e, retries = status.retry_count, "periodic resumption failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Framing;
    use crate::config::{ForwardConfig, SecurityConfig};
    use crate::forward::SendStatus;
    use crate::testing::{read_unwrapped, spawn_acceptor, MockTransport, ScriptedMechanism};

    fn spawn(transport: &MockTransport, rounds: usize) -> ForwarderHandle {
        let config = ForwardConfig::builder("relay.example.net")
            .framing(Framing::OctetCounting)
            .build()
            .unwrap();
        Forwarder::spawn(Destination::new(
            config,
            SecurityConfig::default(),
            transport.clone(),
            ScriptedMechanism::new(rounds),
        ))
    }

    #[tokio::test]
    async fn test_send_through_handle() {
        let transport = MockTransport::new();
        let peer = spawn_acceptor(transport.next_peer(), 1);
        let handle = spawn(&transport, 1);

        assert_eq!(handle.send("hello").await.unwrap(), SendOutcome::Sent);
        assert!(!handle.wants_write_notification());

        let status = handle.status().await.unwrap();
        assert_eq!(status.phase, ConnectionPhase::Active);
        assert!(status.last_sent_at.is_some());

        handle.shutdown().await;
        assert_eq!(peer.await.unwrap(), vec![b"5 hello".to_vec()]);
    }

    #[tokio::test]
    async fn test_sequential_sends_without_readiness_reports() {
        let transport = MockTransport::new();
        let peer = spawn_acceptor(transport.next_peer(), 1);
        let handle = spawn(&transport, 1);

        let mut outcomes = Vec::new();
        for message in ["one", "two", "three", "four"] {
            outcomes.push(handle.send(message).await.unwrap());
        }
        assert_eq!(outcomes, vec![SendOutcome::Sent; 4]);

        handle.shutdown().await;
        assert_eq!(
            peer.await.unwrap(),
            vec![b"3 one".to_vec(), b"3 two".to_vec(), b"5 three".to_vec(), b"4 four".to_vec()]
        );
    }

    #[tokio::test]
    async fn test_notify_writable_flushes_pending() {
        let transport = MockTransport::new();
        let peer = transport.next_peer();
        let handle = spawn(&transport, 0);

        assert_eq!(handle.send("first").await.unwrap(), SendOutcome::Sent);
        handle.slot.set_status(SendStatus::Connecting);
        assert!(handle.wants_write_notification());
        assert_eq!(handle.send("second").await.unwrap(), SendOutcome::Buffered);

        handle.notify_writable().await.unwrap();
        assert!(!handle.wants_write_notification());

        let mut peer = peer.await.unwrap();
        assert_eq!(read_unwrapped(&mut peer).await.unwrap(), b"5 first");
        assert_eq!(read_unwrapped(&mut peer).await.unwrap(), b"6 second");

        assert_eq!(handle.send("third").await.unwrap(), SendOutcome::Sent);
        assert_eq!(read_unwrapped(&mut peer).await.unwrap(), b"5 third");
        assert_eq!(handle.status().await.unwrap().send_status, SendStatus::Ready);
    }

    #[tokio::test]
    async fn test_send_after_readiness_keeps_order() {
        let transport = MockTransport::new();
        let peer = transport.next_peer();
        let handle = spawn(&transport, 0);

        handle.send("one").await.unwrap();
        handle.slot.set_status(SendStatus::Connecting);
        assert_eq!(handle.send("two").await.unwrap(), SendOutcome::Buffered);
        // Flush command and the next send race through the queue.
        let (flushed, sent) = tokio::join!(handle.notify_writable(), handle.send("three"));
        flushed.unwrap();
        sent.unwrap();

        let mut peer = peer.await.unwrap();
        let mut received = Vec::new();
        for _ in 0..3 {
            received.push(read_unwrapped(&mut peer).await.unwrap());
        }
        assert_eq!(received, vec![b"3 one".to_vec(), b"3 two".to_vec(), b"5 three".to_vec()]);
    }

    #[tokio::test]
    async fn test_resume_through_handle() {
        let transport = MockTransport::new();
        let handle = spawn(&transport, 0);

        // No peer registered: connect is refused and the destination suspends.
        let err = handle.send("lost").await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(handle.status().await.unwrap().phase, ConnectionPhase::Suspended);

        handle.try_resume().await.unwrap();
        assert_eq!(handle.status().await.unwrap().phase, ConnectionPhase::Active);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_later_calls() {
        let transport = MockTransport::new();
        let handle = spawn(&transport, 0);

        handle.shutdown().await;
        handle.shutdown().await;
        assert!(matches!(handle.send("late").await, Err(ForwardError::Shutdown)));
        assert!(matches!(handle.status().await, Err(ForwardError::Shutdown)));
        assert!(handle.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_resolves_unresolved_destination() {
        let transport = MockTransport::new();
        let handle = spawn(&transport, 0);
        let ticker = spawn_resume_ticker(handle.clone(), Duration::from_secs(60));

        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(handle.status().await.unwrap().phase, ConnectionPhase::Unresolved);

        time::sleep(Duration::from_secs(35)).await;
        assert_eq!(handle.status().await.unwrap().phase, ConnectionPhase::Active);

        handle.shutdown().await;
        time::sleep(Duration::from_secs(60)).await;
        ticker.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_counts_failed_resolutions() {
        let transport = MockTransport::new();
        transport.fail_resolution(true);
        let handle = spawn(&transport, 0);
        let ticker = spawn_resume_ticker(handle.clone(), Duration::from_secs(60));

        time::sleep(Duration::from_secs(185)).await;
        let status = handle.status().await.unwrap();
        assert_eq!(status.phase, ConnectionPhase::Unresolved);
        assert_eq!(status.retry_count, 3);

        handle.shutdown().await;
        time::sleep(Duration::from_secs(60)).await;
        ticker.await.unwrap();
    }
}
