/// Errors that can occur while managing a child process.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The OS refused to create the process.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// The command has no program to run.
    #[error("command has an empty program name")]
    EmptyCommand,

    /// The child's stdio handles were already handed out.
    #[error("child stdio already taken")]
    StdioTaken,

    /// An I/O error occurred while polling or signalling the process.
    #[error("process I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProcessError>;
