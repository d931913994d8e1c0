use std::io::{self, Read};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::codec::LineConfig;
use crate::error::{LineError, Result};
use crate::reader::LineReader;

/// Observer called on the pump thread with every line read, before it is queued.
pub type LineTap = Box<dyn FnMut(&str) + Send>;

enum PumpEvent {
    Line(String),
    Failed(io::Error),
    Closed,
}

/// A dedicated reader thread that owns one output stream.
///
/// The thread blocks on the stream and queues complete lines; the owner
/// pulls them with a bounded wait. There is exactly one consumer, so
/// line order on the wire is the order lines come out of the pump.
pub struct LinePump {
    rx: Receiver<PumpEvent>,
    label: String,
    closed: bool,
}

impl LinePump {
    /// Start pumping lines from `stream` on a new thread.
    pub fn spawn<R>(label: &str, stream: R, config: LineConfig) -> io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        Self::start(label, stream, config, None)
    }

    /// Start pumping lines, passing each one to `tap` as it arrives.
    pub fn with_tap<R>(label: &str, stream: R, config: LineConfig, tap: LineTap) -> io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        Self::start(label, stream, config, Some(tap))
    }

    fn start<R>(
        label: &str,
        stream: R,
        config: LineConfig,
        tap: Option<LineTap>,
    ) -> io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let thread_label = label.to_string();
        thread::Builder::new()
            .name(format!("stdiorpc-{label}"))
            .spawn(move || {
                pump_lines(LineReader::with_config(stream, config), tx, tap, &thread_label)
            })?;

        Ok(Self {
            rx,
            label: label.to_string(),
            closed: false,
        })
    }

    /// Wait up to `wait` for the next line.
    ///
    /// Returns `Ok(None)` when nothing arrived in time. Once the stream has
    /// ended every call returns `Err(LineError::ConnectionClosed)` at once.
    pub fn recv_timeout(&mut self, wait: Duration) -> Result<Option<String>> {
        if self.closed {
            return Err(LineError::ConnectionClosed);
        }
        match self.rx.recv_timeout(wait) {
            Ok(event) => self.accept(event),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                self.closed = true;
                Err(LineError::ReaderGone)
            }
        }
    }

    /// Take the next queued line without waiting.
    pub fn try_recv(&mut self) -> Result<Option<String>> {
        if self.closed {
            return Err(LineError::ConnectionClosed);
        }
        match self.rx.try_recv() {
            Ok(event) => self.accept(event),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                self.closed = true;
                Err(LineError::ReaderGone)
            }
        }
    }

    /// Whether the stream has ended (end-of-file, read error, or lost reader).
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Label given at spawn time.
    pub fn label(&self) -> &str {
        &self.label
    }

    fn accept(&mut self, event: PumpEvent) -> Result<Option<String>> {
        match event {
            PumpEvent::Line(line) => Ok(Some(line)),
            PumpEvent::Closed => {
                self.closed = true;
                Err(LineError::ConnectionClosed)
            }
            PumpEvent::Failed(err) => {
                self.closed = true;
                Err(LineError::Io(err))
            }
        }
    }
}

impl std::fmt::Debug for LinePump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinePump")
            .field("label", &self.label)
            .field("closed", &self.closed)
            .finish()
    }
}

fn pump_lines<R: Read>(
    mut reader: LineReader<R>,
    tx: Sender<PumpEvent>,
    mut tap: Option<LineTap>,
    label: &str,
) {
    loop {
        match reader.read_line() {
            Ok(line) => {
                trace!(stream = label, %line, "line received");
                if let Some(tap) = tap.as_mut() {
                    tap(&line);
                }
                if tx.send(PumpEvent::Line(line)).is_err() {
                    debug!(stream = label, "line consumer dropped, stopping pump");
                    return;
                }
            }
            Err(LineError::LineTooLong { size, max }) => {
                warn!(stream = label, size, max, "discarding over-long line");
            }
            Err(LineError::ConnectionClosed) => {
                debug!(stream = label, "stream reached end-of-file");
                let _ = tx.send(PumpEvent::Closed);
                return;
            }
            Err(LineError::Io(err)) => {
                debug!(stream = label, error = %err, "stream read failed");
                let _ = tx.send(PumpEvent::Failed(err));
                return;
            }
            Err(other) => {
                let _ = tx.send(PumpEvent::Failed(io::Error::other(other.to_string())));
                return;
            }
        }
    }
}

/// Drain a stream on a background thread, logging each line at debug level.
///
/// Used for a child's stderr so it can never fill its pipe and stall the
/// child. The thread exits at end-of-file.
pub fn forward_to_log<R>(label: &str, stream: R) -> io::Result<JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    let label = label.to_string();
    thread::Builder::new()
        .name(format!("stdiorpc-{label}"))
        .spawn(move || {
            let mut reader = LineReader::new(stream);
            loop {
                match reader.read_line() {
                    Ok(line) => debug!(stream = %label, %line, "child output"),
                    Err(LineError::LineTooLong { size, .. }) => {
                        debug!(stream = %label, size, "child output line too long, skipped")
                    }
                    Err(LineError::ConnectionClosed) => return,
                    Err(err) => {
                        debug!(stream = %label, error = %err, "stopped forwarding child output");
                        return;
                    }
                }
            }
        })
}
