use bytes::{Buf, BufMut, BytesMut};

use crate::error::{LineError, Result};

/// Line terminator.
pub const TERMINATOR: u8 = b'\n';

/// Default maximum line length: 16 MiB.
pub const DEFAULT_MAX_LINE_LEN: usize = 16 * 1024 * 1024;

/// Configuration for line framing.
#[derive(Debug, Clone)]
pub struct LineConfig {
    /// Maximum line length in bytes, excluding the terminator. Default: 16 MiB.
    pub max_line_len: usize,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}

/// Encode a payload as one line.
///
/// The payload must not contain `\n` or `\r`; a line terminator inside a
/// message would split it in two on the wire.
pub fn encode_line(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.iter().any(|&b| b == TERMINATOR || b == b'\r') {
        return Err(LineError::EmbeddedNewline);
    }
    dst.reserve(payload.len() + 1);
    dst.put_slice(payload);
    dst.put_u8(TERMINATOR);
    Ok(())
}

/// Decode one line from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete line yet.
/// On success the line and its terminator are consumed from the buffer.
/// A complete line over `max_line_len` is consumed and reported as
/// [`LineError::LineTooLong`]; an incomplete one is reported but left in
/// place for the caller to discard.
pub fn decode_line(src: &mut BytesMut, max_line_len: usize) -> Result<Option<String>> {
    match src.iter().position(|&b| b == TERMINATOR) {
        Some(pos) if pos > max_line_len => {
            src.advance(pos + 1);
            Err(LineError::LineTooLong {
                size: pos,
                max: max_line_len,
            })
        }
        Some(pos) => {
            let line = src.split_to(pos + 1);
            Ok(Some(to_text(&line[..pos])))
        }
        None if src.len() > max_line_len => Err(LineError::LineTooLong {
            size: src.len(),
            max: max_line_len,
        }),
        None => Ok(None),
    }
}

/// Take an unterminated final line (the stream ended without `\n`).
pub fn take_partial_line(src: &mut BytesMut) -> Option<String> {
    if src.is_empty() {
        return None;
    }
    let rest = src.split();
    Some(to_text(&rest))
}

fn to_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
