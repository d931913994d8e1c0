//! Child process supervision for stdio JSON-RPC.
//!
//! This is the lowest layer of stdiorpc. It spawns the server process with all
//! three standard streams piped, decides when the process is "ready", polls
//! its liveness and shuts it down. Everything above talks to the child through
//! the [`ChildStdio`] handles handed out here.

pub mod command;
pub mod error;
pub mod readiness;
mod signal;
pub mod supervisor;

pub use command::CommandSpec;
pub use error::{ProcessError, Result};
pub use readiness::{FixedDelay, PollUntil, ReadinessPolicy};
pub use supervisor::{ChildStdio, Liveness, ProcessSupervisor, SupervisorConfig};
