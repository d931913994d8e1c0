//! Synchronous JSON-RPC over a child process's stdio.
//!
//! [`RpcChannel`] writes requests to the child's stdin and picks the
//! matching response out of its stdout, skipping log noise and
//! notifications. [`Session`] ties a channel to a supervised process and
//! adds sequential ids, timeouts, shutdown and the MCP handshake.

pub mod channel;
pub mod error;
pub mod handshake;
pub mod message;
pub mod protocol;
pub mod session;

pub use channel::{ChannelConfig, ChannelStats, IdlessResults, RpcChannel};
pub use error::{Result, RpcError};
pub use handshake::{ClientInfo, HandshakeConfig, InitializeParams};
pub use message::{Message, RequestId};
pub use protocol::{JSONRPC_VERSION, MCP_PROTOCOL_VERSION, NOTIFICATION_PREFIX};
pub use session::{Session, SessionConfig};
