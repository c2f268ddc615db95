//! JSON-RPC 2.0 message model.
//!
//! Outbound messages are typed (`Request`, `Notification`); inbound lines are
//! parsed into the loose [`Incoming`] envelope because a peer's stdout may
//! carry responses, server-initiated notifications, or anything else — the
//! correlator only cares about `id`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version stamped on every outbound message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Request identifier. JSON-RPC allows both integers and strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

/// A request: carries an `id` and expects exactly one response with the same
/// `id`, eventually, on the same stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    /// Entirely absent from the wire when not supplied, never `null` or `{}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(method: impl Into<String>, params: Option<Value>, id: RequestId) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// A notification: no `id` field at all, no response is ever expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// Everything the write path can put on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outgoing {
    Request(Request),
    Notification(Notification),
}

impl From<Request> for Outgoing {
    fn from(req: Request) -> Self {
        Self::Request(req)
    }
}

impl From<Notification> for Outgoing {
    fn from(note: Notification) -> Self {
        Self::Notification(note)
    }
}

/// Loose envelope for anything the peer writes on its stdout.
///
/// Every field is optional so responses, server notifications, and stray
/// requests all parse; lines that are valid JSON but not an object fail to
/// parse and are handled as garbage upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incoming {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Incoming {
    /// A message with an `id` and no `method` is a response to somebody.
    pub fn is_response(&self) -> bool {
        self.id.is_some() && self.method.is_none()
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none() && self.method.is_some()
    }

    /// Converts into a [`Response`] if the message carries an `id`.
    pub fn into_response(self) -> Option<Response> {
        Some(Response {
            id: self.id?,
            result: self.result,
            error: self.error,
        })
    }
}

/// A correlated response: the outcome of a successful id match.
///
/// Carrying an `error` is a normal negative outcome per JSON-RPC, not a
/// transport fault; [`Response::into_result`] splits the two.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: RequestId,
    pub result: Option<Value>,
    pub error: Option<RpcError>,
}

impl Response {
    /// Splits the response into the JSON-RPC success/error outcome.
    ///
    /// A response with neither `result` nor `error` yields `Ok(Value::Null)`.
    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// JSON-RPC error object, surfaced verbatim to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}
