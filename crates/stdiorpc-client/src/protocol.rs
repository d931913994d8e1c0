//! Wire-level constants.

/// JSON-RPC version string carried in every outgoing message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Methods with this prefix are notifications and are never answered.
pub const NOTIFICATION_PREFIX: &str = "notifications/";

/// MCP protocol revision offered during `initialize`.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// MCP method names used by the handshake helpers.
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const PING: &str = "ping";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
}
