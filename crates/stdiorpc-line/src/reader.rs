use std::io::{ErrorKind, Read};

use bytes::BytesMut;

use crate::codec::{decode_line, take_partial_line, LineConfig, TERMINATOR};
use crate::error::{LineError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete lines from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete lines.
/// After an over-long line is reported, the reader skips to the next
/// terminator and carries on.
pub struct LineReader<T> {
    inner: T,
    buf: BytesMut,
    config: LineConfig,
    discarding: bool,
    eof: bool,
}

impl<T: Read> LineReader<T> {
    /// Create a new line reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, LineConfig::default())
    }

    /// Create a new line reader with explicit configuration.
    pub fn with_config(inner: T, config: LineConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            discarding: false,
            eof: false,
        }
    }

    /// Read the next line (blocking), without its terminator.
    ///
    /// An unterminated final line is returned before end-of-file is
    /// reported. Returns `Err(LineError::ConnectionClosed)` once EOF is reached.
    pub fn read_line(&mut self) -> Result<String> {
        loop {
            if self.discarding {
                match self.buf.iter().position(|&b| b == TERMINATOR) {
                    Some(pos) => {
                        let _ = self.buf.split_to(pos + 1);
                        self.discarding = false;
                        continue;
                    }
                    None => self.buf.clear(),
                }
            } else {
                match decode_line(&mut self.buf, self.config.max_line_len) {
                    Ok(Some(line)) => return Ok(line),
                    Ok(None) => {}
                    Err(err) => {
                        if self.buf.len() > self.config.max_line_len
                            && !self.buf.contains(&TERMINATOR)
                        {
                            self.buf.clear();
                            self.discarding = true;
                        }
                        return Err(err);
                    }
                }
            }

            if self.eof {
                return Err(LineError::ConnectionClosed);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(LineError::Io(err)),
            };

            if read == 0 {
                self.eof = true;
                if self.discarding {
                    self.buf.clear();
                } else if let Some(line) = take_partial_line(&mut self.buf) {
                    return Ok(line);
                }
                return Err(LineError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current line reader configuration.
    pub fn config(&self) -> &LineConfig {
        &self.config
    }
}
