//! MCP handshake and tool helpers on top of [`Session`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::error::Result;
use crate::protocol::{methods, MCP_PROTOCOL_VERSION};
use crate::session::Session;

/// Client identity sent in `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Parameters of the `initialize` request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: Value,
    pub client_info: ClientInfo,
}

/// Configuration for [`Session::initialize`].
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Protocol revision offered to the server.
    pub protocol_version: String,
    pub client_info: ClientInfo,
    /// Capabilities object sent verbatim.
    pub capabilities: Value,
    /// Follow a successful `initialize` with `notifications/initialized`.
    pub send_initialized: bool,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            client_info: ClientInfo::default(),
            capabilities: json!({"tools": {}, "resources": {}, "prompts": {}}),
            send_initialized: true,
        }
    }
}

impl HandshakeConfig {
    pub fn params(&self) -> InitializeParams {
        InitializeParams {
            protocol_version: self.protocol_version.clone(),
            capabilities: self.capabilities.clone(),
            client_info: self.client_info.clone(),
        }
    }
}

impl Session {
    /// Perform the MCP `initialize` exchange and return the server's result.
    pub fn initialize(&mut self, config: &HandshakeConfig) -> Result<Value> {
        let params = serde_json::to_value(config.params())?;
        let result = self.call(methods::INITIALIZE, Some(params))?.into_result()?;
        info!(
            protocol = ?result.get("protocolVersion"),
            server = ?result.get("serverInfo"),
            "session initialized"
        );
        if config.send_initialized {
            self.notify(methods::INITIALIZED, None)?;
        }
        Ok(result)
    }

    /// `tools/list`.
    pub fn list_tools(&mut self) -> Result<Value> {
        self.call(methods::TOOLS_LIST, Some(json!({})))?.into_result()
    }

    /// `tools/call` with the given tool name and arguments.
    pub fn call_tool(&mut self, name: &str, arguments: Value) -> Result<Value> {
        let params = json!({"name": name, "arguments": arguments});
        self.call(methods::TOOLS_CALL, Some(params))?.into_result()
    }

    /// `ping`.
    pub fn ping(&mut self) -> Result<()> {
        self.call(methods::PING, None)?.into_result().map(|_| ())
    }
}
