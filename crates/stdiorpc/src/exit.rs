use std::fmt;
use std::io;

use stdiorpc_client::RpcError;
use stdiorpc_process::ProcessError;

// Process exit codes. 64 follows sysexits(3) EX_USAGE and 124 follows
// timeout(1); 3, 5 and 60 name the failing stage of a call.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const SPAWN_FAILED: i32 = 3;
pub const CHILD_EXITED: i32 = 5;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_exit_code(err: &io::Error) -> i32 {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::BrokenPipe | io::ErrorKind::UnexpectedEof => CHILD_EXITED,
        _ => INTERNAL,
    }
}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    CliError::new(io_exit_code(&err), format!("{context}: {err}"))
}

pub fn rpc_exit_code(err: &RpcError) -> i32 {
    match err {
        RpcError::Process(ProcessError::Spawn { .. } | ProcessError::EmptyCommand) => {
            SPAWN_FAILED
        }
        RpcError::Process(ProcessError::Io(err)) | RpcError::Io(err) => io_exit_code(err),
        RpcError::Process(_) => INTERNAL,
        RpcError::ProcessExited => CHILD_EXITED,
        RpcError::Timeout(_) => TIMEOUT,
        RpcError::MalformedStream(_) | RpcError::Json(_) | RpcError::Remote { .. } => {
            DATA_INVALID
        }
    }
}

pub fn rpc_error(context: &str, err: RpcError) -> CliError {
    CliError::new(rpc_exit_code(&err), format!("{context}: {err}"))
}
