use std::io;
use std::time::Duration;

use serde_json::Value;
use stdiorpc_line::LineError;
use stdiorpc_process::ProcessError;

/// Errors that can occur in client operations.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Process-level error, including failure to spawn.
    #[error("process error: {0}")]
    Process(#[from] ProcessError),

    /// The server process exited before a matching response arrived.
    #[error("server process exited")]
    ProcessExited,

    /// No matching response arrived while the process stayed alive.
    #[error("timed out after {0:?} waiting for a response")]
    Timeout(Duration),

    /// The output stream can no longer be read in a meaningful way.
    #[error("malformed stream: {0}")]
    MalformedStream(String),

    /// I/O error on the process pipes.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error for an outgoing message.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The matched response carried a JSON-RPC `error` member.
    #[error("remote error {code}: {message}")]
    Remote {
        code: i64,
        message: String,
        data: Option<Value>,
    },
}

impl RpcError {
    /// Stable short name for the error category, used in structured reports.
    pub fn kind(&self) -> &'static str {
        match self {
            RpcError::Process(ProcessError::Spawn { .. } | ProcessError::EmptyCommand) => {
                "spawn_failed"
            }
            RpcError::Process(_) => "process_error",
            RpcError::ProcessExited => "process_exited",
            RpcError::Timeout(_) => "timeout",
            RpcError::MalformedStream(_) => "malformed_stream",
            RpcError::Io(_) => "io_error",
            RpcError::Json(_) => "json_error",
            RpcError::Remote { .. } => "remote_error",
        }
    }
}

impl From<LineError> for RpcError {
    fn from(err: LineError) -> Self {
        match err {
            LineError::Io(io) => RpcError::Io(io),
            LineError::ConnectionClosed => {
                RpcError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "stream closed"))
            }
            LineError::ReaderGone => RpcError::MalformedStream(err.to_string()),
            LineError::LineTooLong { .. } | LineError::EmbeddedNewline => {
                RpcError::Io(io::Error::new(io::ErrorKind::InvalidInput, err.to_string()))
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
