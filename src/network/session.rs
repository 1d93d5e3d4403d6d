//! Client Session
//!
//! A reader and a writer task per connected socket. Reads newline-delimited
//! messages and forwards them to the match channel, writes whatever the
//! channel queues, and runs the client's input deadline.
//!
//! The deadline is armed when a message carrying an input timeout has been
//! fully written, disarmed by any other write and by every line read.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace, warn, Instrument, Span};

/// Messages longer than this are logged by size only.
const LOG_MESSAGE_MAX: usize = 500;

/// Client slot (0 or 1).
pub type ClientId = usize;

/// A line queued for one client.
#[derive(Debug, Clone)]
pub struct Outgoing {
    /// Message text without the trailing newline
    pub text: String,
    /// Input deadline armed once the line is written
    pub input_timeout: Option<Duration>,
}

/// Session -> channel notifications.
#[derive(Debug)]
pub enum SessionEvent {
    /// A connection was accepted for `client`.
    Joined {
        /// Slot
        client: ClientId,
        /// Queue feeding the session's writer
        link: mpsc::Sender<Outgoing>,
    },

    /// A full line was read.
    Line {
        /// Slot
        client: ClientId,
        /// Line without the newline
        text: String,
        /// Time since the last completed write to this client
        elapsed: Duration,
    },

    /// The input deadline fired.
    InputTimeout {
        /// Slot
        client: ClientId,
    },

    /// The connection was closed or failed.
    Closed {
        /// Slot
        client: ClientId,
    },
}

/// Per-connection session.
pub struct Session {
    client: ClientId,
    stream: TcpStream,
    outgoing: mpsc::Receiver<Outgoing>,
    events: mpsc::Sender<SessionEvent>,
    shutdown_rx: broadcast::Receiver<()>,
}

/// Completion of one write.
#[derive(Debug, Clone, Copy)]
struct Written {
    at: Instant,
    input_timeout: Option<Duration>,
}

impl Session {
    /// Wrap an accepted socket. Returns the session and its outgoing queue.
    pub fn new(
        client: ClientId,
        stream: TcpStream,
        events: mpsc::Sender<SessionEvent>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> (Self, mpsc::Sender<Outgoing>) {
        let (link, outgoing) = mpsc::channel(64);
        let session = Self {
            client,
            stream,
            outgoing,
            events,
            shutdown_rx,
        };
        (session, link)
    }

    /// Run until the peer disconnects, the channel drops the link, or the
    /// server shuts down. The socket is closed on return.
    pub async fn run(self) {
        let Self { client, stream, outgoing, events, mut shutdown_rx } = self;
        let (reader, writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        // A full send buffer blocks only the writer task
        let (written_tx, mut written_rx) = watch::channel(None::<Written>);
        let writer_task = tokio::spawn(
            write_loop(client, writer, outgoing, written_tx).instrument(Span::current()),
        );

        let mut deadline: Option<Instant> = None;
        let mut writer_done = false;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line {
                        Ok(Some(text)) => {
                            deadline = None;
                            // Marks the latest write as seen so it cannot arm a deadline
                            let elapsed = written_rx
                                .borrow_and_update()
                                .map_or(Duration::ZERO, |w| w.at.elapsed());
                            trace!(
                                "[in] client={}, elapsed_from_output={:.3}s, message={}",
                                client,
                                elapsed.as_secs_f64(),
                                loggable(&text),
                            );
                            let event = SessionEvent::Line { client, text, elapsed };
                            if events.send(event).await.is_err() {
                                break;
                            }
                        }
                        Ok(None) => {
                            debug!("Client {} closed the connection", client);
                            let _ = events.send(SessionEvent::Closed { client }).await;
                            break;
                        }
                        Err(e) => {
                            debug!("Read error on client {}: {}", client, e);
                            let _ = events.send(SessionEvent::Closed { client }).await;
                            break;
                        }
                    }
                }

                changed = written_rx.changed() => {
                    if changed.is_err() {
                        writer_done = true;
                        break;
                    }
                    let written = *written_rx.borrow_and_update();
                    deadline = written.and_then(|w| w.input_timeout.map(|t| w.at + t));
                }

                _ = wait_deadline(deadline) => {
                    deadline = None;
                    if events.send(SessionEvent::InputTimeout { client }).await.is_err() {
                        break;
                    }
                }

                _ = shutdown_rx.recv() => {
                    debug!("Client {} session stopped by server", client);
                    break;
                }
            }
        }

        if !writer_done {
            writer_task.abort();
        }
        match writer_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Write error on client {}: {}", client, e);
                let _ = events.send(SessionEvent::Closed { client }).await;
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => warn!("Writer task of client {} failed: {}", client, e),
        }
    }
}

/// Drain the outgoing queue into the socket, publishing each completed write.
/// Returns once the channel drops the link.
async fn write_loop(
    client: ClientId,
    mut writer: OwnedWriteHalf,
    mut outgoing: mpsc::Receiver<Outgoing>,
    written_tx: watch::Sender<Option<Written>>,
) -> std::io::Result<()> {
    while let Some(out) = outgoing.recv().await {
        let mut bytes = out.text.into_bytes();
        bytes.push(b'\n');
        writer.write_all(&bytes).await?;
        written_tx.send_replace(Some(Written {
            at: Instant::now(),
            input_timeout: out.input_timeout,
        }));
        bytes.pop();
        trace!(
            "[out] client={}, message={}",
            client,
            loggable(&String::from_utf8_lossy(&bytes)),
        );
    }
    debug!("Client {} link dropped by channel", client);
    writer.shutdown().await
}

/// Resolve at `deadline`, never when disarmed.
async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn loggable(message: &str) -> std::borrow::Cow<'_, str> {
    if message.len() <= LOG_MESSAGE_MAX {
        message.into()
    } else {
        format!("(too long (size={}))", message.len()).into()
    }
}
