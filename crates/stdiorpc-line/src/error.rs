/// Errors that can occur while framing lines.
#[derive(Debug, thiserror::Error)]
pub enum LineError {
    /// A line exceeded the configured maximum length.
    #[error("line too long ({size} bytes, max {max})")]
    LineTooLong { size: usize, max: usize },

    /// An outgoing payload contains a line terminator.
    #[error("payload contains an embedded newline")]
    EmbeddedNewline,

    /// An I/O error occurred while reading or writing lines.
    #[error("line I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream reached end-of-file.
    #[error("connection closed")]
    ConnectionClosed,

    /// The reader thread stopped without reporting end-of-file.
    #[error("line reader thread terminated unexpectedly")]
    ReaderGone,
}

pub type Result<T> = std::result::Result<T, LineError>;
