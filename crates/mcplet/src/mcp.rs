//! Typed session layer for the MCP stdio handshake.
//!
//! Wraps [`Client`] with the call sequence an MCP client performs against a
//! compliant server: `initialize`, the `notifications/initialized`
//! notification, then tool and resource operations. Method-specific result
//! payloads stay `serde_json::Value`; validating them is out of scope.

use serde::Serialize;
use serde_json::{json, Value};
use tokio::process::Command;

use crate::client::{CallError, Client, ClientConfig};
use crate::protocol::RpcError;
use crate::transport::{StdioTransport, Transport, TransportConfig, TransportError};

/// MCP protocol revision this client speaks.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
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

/// Params for the `initialize` request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: Value,
    pub client_info: ClientInfo,
}

impl Default for InitializeParams {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: json!({}),
            client_info: ClientInfo::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error(transparent)]
    Call(#[from] CallError),

    /// The server answered with a JSON-RPC error object. A normal negative
    /// outcome per the protocol, surfaced verbatim and never retried.
    #[error("server returned an error: {0}")]
    Rpc(RpcError),

    #[error("failed to encode params: {0}")]
    Params(#[from] serde_json::Error),
}

impl From<TransportError> for McpError {
    fn from(err: TransportError) -> Self {
        Self::Call(CallError::Transport(err))
    }
}

/// One MCP session over a transport.
pub struct McpSession<T: Transport> {
    client: Client<T>,
}

impl McpSession<StdioTransport> {
    /// Spawn `command` as the server process and wrap it in a session.
    pub fn connect(command: Command) -> Result<Self, McpError> {
        Self::connect_with_config(command, TransportConfig::default(), ClientConfig::default())
    }

    pub fn connect_with_config(
        command: Command,
        transport_config: TransportConfig,
        client_config: ClientConfig,
    ) -> Result<Self, McpError> {
        let transport = StdioTransport::spawn_with_config(command, transport_config)?;
        Ok(Self {
            client: Client::with_config(transport, client_config),
        })
    }
}

impl<T: Transport> McpSession<T> {
    /// Session over an already-established client (tests drive this with
    /// in-memory pipes).
    pub fn new(client: Client<T>) -> Self {
        Self { client }
    }

    /// Request `initialize`, then send the `notifications/initialized`
    /// notification the protocol expects before any other traffic.
    pub async fn initialize(&mut self, params: InitializeParams) -> Result<Value, McpError> {
        let params = serde_json::to_value(&params)?;
        let result = self.request("initialize", Some(params)).await?;
        self.client.notify("notifications/initialized", None).await?;
        Ok(result)
    }

    pub async fn list_tools(&mut self) -> Result<Value, McpError> {
        self.request("tools/list", Some(json!({}))).await
    }

    pub async fn list_resources(&mut self) -> Result<Value, McpError> {
        self.request("resources/list", Some(json!({}))).await
    }

    pub async fn read_resource(&mut self, uri: &str) -> Result<Value, McpError> {
        self.request("resources/read", Some(json!({ "uri": uri })))
            .await
    }

    /// Passthrough for methods this layer has no typed wrapper for.
    pub async fn call(&mut self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        self.request(method, params).await
    }

    pub async fn shutdown(self) -> Result<(), McpError> {
        self.client.shutdown().await?;
        Ok(())
    }

    async fn request(&mut self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let response = self.client.call(method, params).await?;
        response.into_result().map_err(McpError::Rpc)
    }
}
