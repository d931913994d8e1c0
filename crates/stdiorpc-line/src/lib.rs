//! Newline-delimited message framing over process pipes.
//!
//! Every message is one line of UTF-8 text terminated by `\n`:
//! - no length prefix, no batching
//! - a trailing `\r` is tolerated on input
//! - undecodable bytes are replaced with U+FFFD instead of failing
//!
//! Output from a child is read by exactly one [`LinePump`] thread, which
//! queues complete lines for a single synchronous consumer.

pub mod codec;
pub mod error;
pub mod pump;
pub mod reader;
pub mod writer;

pub use codec::{decode_line, encode_line, take_partial_line, LineConfig, DEFAULT_MAX_LINE_LEN};
pub use error::{LineError, Result};
pub use pump::{forward_to_log, LinePump, LineTap};
pub use reader::LineReader;
pub use writer::LineWriter;
