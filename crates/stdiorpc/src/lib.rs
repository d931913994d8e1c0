//! Synchronous JSON-RPC client for servers that speak over stdio.
//!
//! stdiorpc starts a server process, waits for it to settle, exchanges
//! newline-delimited JSON-RPC messages with it one call at a time and shuts
//! it down again. Output noise and notifications interleaved with the
//! responses are filtered out.
//!
//! # Crate Structure
//!
//! - [`process`]: spawning, readiness, liveness and termination
//! - [`line`]: newline framing and the single-consumer line pump
//! - [`client`]: request/response matching, sessions and MCP helpers
//!   (behind the `client` feature)

/// Re-export process supervision types.
pub mod process {
    pub use stdiorpc_process::*;
}

/// Re-export line framing types.
pub mod line {
    pub use stdiorpc_line::*;
}

/// Re-export client types (requires `client` feature).
#[cfg(feature = "client")]
pub mod client {
    pub use stdiorpc_client::*;
}
