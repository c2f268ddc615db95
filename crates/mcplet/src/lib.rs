//! mcplet: JSON-RPC 2.0 client for MCP servers over child-process stdio.
//!
//! The library is layered leaf-first:
//!
//! - **protocol**: JSON-RPC 2.0 message model
//! - **codec**: newline-delimited JSON framing
//! - **transport**: child process spawn + line-oriented send/receive
//! - **client**: request/response correlation by id
//! - **mcp**: typed session layer for the MCP handshake

pub mod client;
pub mod codec;
pub mod mcp;
pub mod protocol;
pub mod transport;

pub use client::{CallError, Client, ClientConfig, Discarded};
pub use codec::{Frame, JsonLineCodec};
pub use mcp::{ClientInfo, InitializeParams, McpError, McpSession, PROTOCOL_VERSION};
pub use protocol::{
    Incoming, Notification, Outgoing, Request, RequestId, Response, RpcError, JSONRPC_VERSION,
};
pub use transport::{Connection, StdioTransport, Transport, TransportConfig, TransportError};
