use std::io::{self, ErrorKind, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use stdiorpc_line::{LineConfig, LineError, LinePump, LineTap, LineWriter};
use stdiorpc_process::Liveness;
use tracing::debug;

use crate::error::{Result, RpcError};
use crate::message::{Message, RequestId};
use crate::protocol::NOTIFICATION_PREFIX;

/// Default bounded pause while waiting for output.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How responses without an `id` member are treated.
///
/// Some servers answer the handshake without echoing the request id. Such a
/// line is accepted only if it carries `result`.
///
/// `Accept` follows the behaviour of existing stdio MCP clients.
/// `HandshakeOnly` is the strict reading: an id-less result can only answer
/// the handshake call, which is the first call of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdlessResults {
    /// Any id-less `result` answers the pending call.
    #[default]
    Accept,
    /// Only until the first response with a matching id has been seen.
    HandshakeOnly,
    /// Never; every answer must echo the id.
    Reject,
}

/// Configuration for an [`RpcChannel`].
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Methods starting with this prefix are discarded as notifications.
    pub notification_prefix: String,
    /// Longest single wait for output before the deadline is re-checked.
    pub poll_interval: Duration,
    /// Policy for id-less `result` lines.
    pub idless_results: IdlessResults,
    /// Line framing limits for both directions.
    pub line: LineConfig,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            notification_prefix: NOTIFICATION_PREFIX.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            idless_results: IdlessResults::default(),
            line: LineConfig::default(),
        }
    }
}

/// Counters for lines seen on the output stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Lines taken from the stream, blank ones included.
    pub lines_read: u64,
    /// Lines returned as an answer.
    pub matched: u64,
    /// Notification-shaped messages discarded.
    pub notifications: u64,
    /// Lines that were not a JSON object.
    pub noise: u64,
    /// JSON objects that answered nothing pending.
    pub unrelated: u64,
}

/// Request/response correlation over a child's stdin and stdout.
///
/// Writes go straight to the input stream. Output is read by a [`LinePump`]
/// thread; this type is its only consumer.
pub struct RpcChannel<W: Write> {
    writer: Option<LineWriter<W>>,
    lines: LinePump,
    config: ChannelConfig,
    stats: ChannelStats,
    id_matched: bool,
}

impl<W: Write> RpcChannel<W> {
    /// Create a channel with default configuration.
    pub fn new<R>(input: W, output: R) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        Self::with_config(input, output, ChannelConfig::default())
    }

    /// Create a channel with explicit configuration.
    pub fn with_config<R>(input: W, output: R, config: ChannelConfig) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        let lines = LinePump::spawn("stdout", output, config.line.clone())?;
        Ok(Self::from_parts(input, lines, config))
    }

    /// Create a channel whose output lines are also passed to `tap`.
    ///
    /// The tap runs on the reader thread and sees every line, including
    /// the ones the matcher discards.
    pub fn with_tap<R>(input: W, output: R, config: ChannelConfig, tap: LineTap) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        let lines = LinePump::with_tap("stdout", output, config.line.clone(), tap)?;
        Ok(Self::from_parts(input, lines, config))
    }

    fn from_parts(input: W, lines: LinePump, config: ChannelConfig) -> Self {
        Self {
            writer: Some(LineWriter::with_config(input, config.line.clone())),
            lines,
            config,
            stats: ChannelStats::default(),
            id_matched: false,
        }
    }

    /// Serialize `message` as one line and write it to the input stream.
    pub fn send(&mut self, message: &Message) -> Result<()> {
        let line = message.to_line()?;
        let writer = self.writer.as_mut().ok_or_else(|| {
            RpcError::Io(io::Error::new(ErrorKind::BrokenPipe, "input stream closed"))
        })?;
        debug!(id = ?message.id(), method = ?message.method(), "sending message");
        writer.write_line(&line)?;
        Ok(())
    }

    /// Wait for the response to `id`.
    ///
    /// Lines are read until one answers `id` or `timeout` elapses, whichever
    /// is first. Noise, notifications and unrelated messages are discarded.
    /// When nothing matched in time, `liveness` decides between
    /// [`RpcError::ProcessExited`] and [`RpcError::Timeout`]. Once the output
    /// stream has ended, the process is polled every interval so an exit
    /// is reported without waiting out the whole budget.
    pub fn receive_matching(
        &mut self,
        id: &RequestId,
        timeout: Duration,
        liveness: &mut dyn Liveness,
    ) -> Result<Message> {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(expired(timeout, liveness));
            }
            let wait = (deadline - now).min(self.config.poll_interval);

            match self.lines.recv_timeout(wait) {
                Ok(Some(line)) => {
                    if let Some(message) = self.classify(&line, id) {
                        return Ok(message);
                    }
                }
                Ok(None) => {}
                Err(LineError::ConnectionClosed) => {
                    if !liveness.is_alive() {
                        debug!(%id, "output closed and process exited");
                        return Err(RpcError::ProcessExited);
                    }
                    thread::sleep(wait);
                }
                Err(LineError::ReaderGone) => {
                    return Err(RpcError::MalformedStream(
                        "output reader stopped without end-of-file".to_string(),
                    ));
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Close the input stream so the child sees end-of-file.
    ///
    /// Later sends fail with a broken-pipe I/O error.
    pub fn close_input(&mut self) {
        if self.writer.take().is_some() {
            debug!("closed input stream");
        }
    }

    pub fn is_input_closed(&self) -> bool {
        self.writer.is_none()
    }

    /// Whether the output stream has ended.
    pub fn is_output_closed(&self) -> bool {
        self.lines.is_closed()
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    fn classify(&mut self, line: &str, id: &RequestId) -> Option<Message> {
        self.stats.lines_read += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        let value: serde_json::Value = match serde_json::from_str(trimmed) {
            Ok(value) => value,
            Err(err) => {
                self.stats.noise += 1;
                debug!(line = trimmed, error = %err, "discarding non-JSON line");
                return None;
            }
        };
        let Some(message) = Message::from_value(value) else {
            self.stats.noise += 1;
            debug!(line = trimmed, "discarding non-object JSON");
            return None;
        };

        if message.is_notification(&self.config.notification_prefix) {
            self.stats.notifications += 1;
            debug!(method = ?message.method(), "discarding notification");
            return None;
        }

        match message.id() {
            Some(value) if id.matches(value) => {
                self.stats.matched += 1;
                self.id_matched = true;
                debug!(%id, "matched response");
                Some(message)
            }
            None if message.result().is_some() && self.accepts_idless() => {
                self.stats.matched += 1;
                debug!(%id, "accepting id-less result");
                Some(message)
            }
            _ => {
                self.stats.unrelated += 1;
                debug!(expected = %id, got = ?message.id(), "discarding unrelated message");
                None
            }
        }
    }

    fn accepts_idless(&self) -> bool {
        match self.config.idless_results {
            IdlessResults::Accept => true,
            IdlessResults::HandshakeOnly => !self.id_matched,
            IdlessResults::Reject => false,
        }
    }
}

impl<W: Write> std::fmt::Debug for RpcChannel<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcChannel")
            .field("input_closed", &self.writer.is_none())
            .field("output", &self.lines)
            .field("stats", &self.stats)
            .finish()
    }
}

fn expired(timeout: Duration, liveness: &mut dyn Liveness) -> RpcError {
    if liveness.is_alive() {
        RpcError::Timeout(timeout)
    } else {
        RpcError::ProcessExited
    }
}
