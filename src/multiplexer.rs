//! Arrival-ordered line multiplexing over several child processes.
//!
//! A match involves up to three external processes writing line-buffered text
//! concurrently: the simulator (mandatory) and one or two controller
//! containers started lazily mid-run. Each attached stream gets its own
//! reader thread feeding a shared channel, so the consumer blocks on a single
//! queue instead of juggling per-pipe readiness.
//!
//! Ordering guarantee: lines of one process are delivered in write order
//! (single reader thread per stream). No global order is promised across
//! processes beyond channel arrival order, and the match controller must not
//! rely on one.

use std::io::{BufRead, BufReader, Read};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use tracing::trace;

/// Identifies which child process a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessRole {
    /// The simulator container; the only process whose lines drive the match.
    Simulator,
    /// The submitted controller under evaluation.
    Participant,
    /// The ladder opponent's controller, in two-sided matches.
    Opponent,
}

impl std::fmt::Display for ProcessRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProcessRole::Simulator => "simulator",
            ProcessRole::Participant => "participant",
            ProcessRole::Opponent => "opponent",
        };
        write!(f, "{s}")
    }
}

/// One event popped from the multiplexed stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A complete text line, tagged with its source process.
    Line(ProcessRole, String),
    /// The tagged process closed its stdout (it exited or was killed).
    Eof(ProcessRole),
}

/// Fans line-buffered output of several child processes into one queue.
#[derive(Debug)]
pub struct LineMultiplexer {
    tx: Sender<StreamEvent>,
    rx: Receiver<StreamEvent>,
}

impl LineMultiplexer {
    /// Creates an empty multiplexer; streams are attached as processes spawn.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        LineMultiplexer { tx, rx }
    }

    /// Registers a newly spawned process's output stream.
    ///
    /// Safe to call at any point between polls; controller containers are
    /// attached mid-run once the simulator asks for them. The reader thread
    /// emits [`StreamEvent::Eof`] when the stream ends and stops silently if
    /// the multiplexer was dropped first.
    pub fn attach<R: Read + Send + 'static>(&self, role: ProcessRole, reader: R) {
        let tx = self.tx.clone();
        std::thread::spawn(move || {
            let reader = BufReader::new(reader);
            for line in reader.lines() {
                let Ok(line) = line else {
                    break;
                };
                trace!(%role, line);
                if tx.send(StreamEvent::Line(role, line)).is_err() {
                    return; // consumer is gone
                }
            }
            let _ = tx.send(StreamEvent::Eof(role));
        });
    }

    /// Waits up to `timeout` for the next event.
    ///
    /// Returns `None` when no tracked process produced anything in time; the
    /// caller is expected to re-check child liveness and poll again.
    pub fn poll(&self, timeout: Duration) -> Option<StreamEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

impl Default for LineMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}
