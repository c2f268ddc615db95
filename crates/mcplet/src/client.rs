//! Request/response correlation.
//!
//! A call is fire-and-match: send one request, then read successive lines
//! until one carries the matching id or the stream ends. There is no
//! background reader and no queue of unclaimed responses — a response read
//! while waiting for a different id is dropped, not buffered. One logical
//! caller per connection; `&mut self` enforces it.

use std::time::Duration;

use serde_json::Value;

use crate::codec::Frame;
use crate::protocol::{Incoming, Notification, Request, RequestId, Response};
use crate::transport::{Transport, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The stream closed before a matching response arrived. Connection
    /// loss, distinct from a valid empty result.
    #[error("connection closed before a response arrived")]
    NoResponse,

    #[error("no response within {0:?}")]
    DeadlineExceeded(Duration),
}

/// A line the correlator dropped while waiting for a response.
#[derive(Debug)]
pub enum Discarded<'a> {
    /// Received text that is not valid JSON-RPC.
    MalformedLine(&'a str),
    /// A parsed message whose id does not match the awaited request.
    UnexpectedMessage(&'a Incoming),
}

type DiscardHook = Box<dyn FnMut(Discarded<'_>) + Send>;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Upper bound on a whole call (send plus wait). `None` restores the
    /// unbounded wait of the bare protocol.
    pub call_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            call_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl ClientConfig {
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn no_call_timeout(mut self) -> Self {
        self.call_timeout = None;
        self
    }
}

/// JSON-RPC client over a [`Transport`].
///
/// Request ids come from a counter owned by this instance, so ids are unique
/// for the lifetime of the connection. Callers supplying their own ids via
/// [`Client::call_with_id`] take on that uniqueness obligation themselves:
/// matching is first-line-wins, and a duplicate id makes correlation
/// ambiguous.
pub struct Client<T: Transport> {
    transport: T,
    next_id: i64,
    config: ClientConfig,
    on_discard: Option<DiscardHook>,
}

impl<T: Transport> Client<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ClientConfig::default())
    }

    pub fn with_config(transport: T, config: ClientConfig) -> Self {
        Self {
            transport,
            next_id: 1,
            config,
            on_discard: None,
        }
    }

    /// Install an observer for discarded lines. Discarding is silent by
    /// default; the hook makes it observable without changing control flow.
    pub fn set_discard_hook(&mut self, hook: impl FnMut(Discarded<'_>) + Send + 'static) {
        self.on_discard = Some(Box::new(hook));
    }

    pub fn next_request_id(&mut self) -> RequestId {
        let id = self.next_id;
        self.next_id += 1;
        RequestId::Number(id)
    }

    /// Send a request with the next id from the instance counter and wait
    /// for the response carrying that id.
    pub async fn call(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Response, CallError> {
        let id = self.next_request_id();
        self.call_with_id(method, params, id).await
    }

    /// Send a request with a caller-chosen id and wait for the matching
    /// response.
    ///
    /// Interleaved lines with other ids and lines that fail to parse are
    /// discarded, not queued. A response carrying an `error` member is a
    /// normal outcome and is returned verbatim inside `Ok`.
    ///
    /// On deadline expiry the call aborts without corrupting framing: a
    /// partially received line stays buffered in the transport, so the next
    /// call resumes on a clean line boundary.
    pub async fn call_with_id(
        &mut self,
        method: &str,
        params: Option<Value>,
        id: RequestId,
    ) -> Result<Response, CallError> {
        let request = Request::new(method, params, id.clone());
        tracing::debug!(%id, method, "sending request");

        match self.config.call_timeout {
            Some(deadline) => {
                match tokio::time::timeout(deadline, self.exchange(request, &id)).await {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::warn!(%id, ?deadline, "call deadline expired");
                        Err(CallError::DeadlineExceeded(deadline))
                    }
                }
            }
            None => self.exchange(request, &id).await,
        }
    }

    /// Send a notification (no `id` field at all); never waits for a reply.
    pub async fn notify(&mut self, method: &str, params: Option<Value>) -> Result<(), CallError> {
        tracing::debug!(method, "sending notification");
        self.transport
            .send(Notification::new(method, params).into())
            .await?;
        Ok(())
    }

    pub async fn shutdown(self) -> Result<(), TransportError> {
        self.transport.shutdown().await
    }

    async fn exchange(&mut self, request: Request, id: &RequestId) -> Result<Response, CallError> {
        self.transport.send(request.into()).await?;

        loop {
            match self.transport.recv().await? {
                None => {
                    tracing::debug!(%id, "stream ended before a matching response");
                    return Err(CallError::NoResponse);
                }
                Some(Frame::Garbage(line)) => self.discard(Discarded::MalformedLine(&line)),
                Some(Frame::Message(msg)) => {
                    if msg.id.as_ref() == Some(id) {
                        tracing::debug!(%id, "response received");
                        return Ok(Response {
                            id: id.clone(),
                            result: msg.result,
                            error: msg.error,
                        });
                    }
                    self.discard(Discarded::UnexpectedMessage(&msg));
                }
            }
        }
    }

    fn discard(&mut self, discarded: Discarded<'_>) {
        match &discarded {
            Discarded::MalformedLine(line) => {
                tracing::debug!(%line, "discarding unparsable line")
            }
            Discarded::UnexpectedMessage(msg) => {
                tracing::debug!(id = ?msg.id, method = ?msg.method, "discarding message for another id")
            }
        }
        if let Some(hook) = self.on_discard.as_mut() {
            hook(discarded);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Connection;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tokio::io::{duplex, split, AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

    type DuplexClient = Client<Connection<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>>;

    fn pair() -> (DuplexClient, DuplexStream) {
        let (ours, theirs) = duplex(4096);
        let (reader, writer) = split(ours);
        (Client::new(Connection::new(reader, writer)), theirs)
    }

    #[tokio::test]
    async fn call_returns_matching_response() {
        let (mut client, peer) = pair();
        let (peer_read, mut peer_write) = split(peer);
        let mut lines = BufReader::new(peer_read).lines();

        let server = tokio::spawn(async move {
            let line = lines.next_line().await.unwrap().unwrap();
            let req: serde_json::Value = serde_json::from_str(&line).unwrap();
            assert_eq!(req["jsonrpc"], "2.0");
            assert_eq!(req["method"], "initialize");
            assert_eq!(req["id"], 1);
            assert_eq!(req["params"]["clientInfo"]["name"], "x");
            peer_write
                .write_all(
                    b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"protocolVersion\":\"2024-11-05\"}}\n",
                )
                .await
                .unwrap();
        });

        let resp = client
            .call(
                "initialize",
                Some(json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": {"name": "x", "version": "1.0"}
                })),
            )
            .await
            .unwrap();

        assert_eq!(resp.id, RequestId::Number(1));
        assert_eq!(
            resp.into_result().unwrap(),
            json!({"protocolVersion": "2024-11-05"})
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn call_skips_lines_with_other_ids() {
        let (mut client, peer) = pair();
        let (_peer_read, mut peer_write) = split(peer);

        let server = tokio::spawn(async move {
            peer_write
                .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":99,\"result\":{}}\n")
                .await
                .unwrap();
            peer_write
                .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":2,\"result\":[]}\n")
                .await
                .unwrap();
            // Keep the read side open until the client is done.
            std::future::pending::<()>().await;
        });

        let resp = client
            .call_with_id("tools/list", Some(json!({})), RequestId::Number(2))
            .await
            .unwrap();
        assert_eq!(resp.into_result().unwrap(), json!([]));
        server.abort();
    }

    #[tokio::test]
    async fn call_skips_unparsable_lines() {
        let (mut client, peer) = pair();
        let (_peer_read, mut peer_write) = split(peer);

        let server = tokio::spawn(async move {
            peer_write.write_all(b"not json\n").await.unwrap();
            peer_write
                .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":\"ok\"}\n")
                .await
                .unwrap();
            std::future::pending::<()>().await;
        });

        let resp = client.call("ping", None).await.unwrap();
        assert_eq!(resp.into_result().unwrap(), json!("ok"));
        server.abort();
    }

    #[tokio::test]
    async fn closed_stream_yields_no_response() {
        let (mut client, peer) = pair();
        let (peer_read, peer_write) = split(peer);
        let mut lines = BufReader::new(peer_read).lines();

        let server = tokio::spawn(async move {
            // Consume the request, then exit without answering; dropping the
            // halves closes the stream.
            let _ = lines.next_line().await;
            drop(peer_write);
        });

        let err = client.call("ping", None).await.unwrap_err();
        assert!(matches!(err, CallError::NoResponse));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn notifications_never_wait_and_carry_no_id() {
        let (mut client, peer) = pair();
        let (peer_read, _peer_write) = split(peer);
        let mut lines = BufReader::new(peer_read).lines();

        client
            .notify("notifications/initialized", None)
            .await
            .unwrap();

        let line = lines.next_line().await.unwrap().unwrap();
        let note: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(note["method"], "notifications/initialized");
        assert!(note.get("id").is_none());
        assert!(note.get("params").is_none());
    }

    #[tokio::test]
    async fn first_response_wins_on_duplicate_ids() {
        let (mut client, peer) = pair();
        let (_peer_read, mut peer_write) = split(peer);

        let server = tokio::spawn(async move {
            peer_write
                .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":7,\"result\":\"first\"}\n")
                .await
                .unwrap();
            peer_write
                .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":7,\"result\":\"second\"}\n")
                .await
                .unwrap();
            std::future::pending::<()>().await;
        });

        let resp = client
            .call_with_id("ping", None, RequestId::Number(7))
            .await
            .unwrap();
        assert_eq!(resp.into_result().unwrap(), json!("first"));
        server.abort();
    }

    #[tokio::test]
    async fn discard_hook_observes_dropped_lines() {
        let (mut client, peer) = pair();
        let (_peer_read, mut peer_write) = split(peer);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        client.set_discard_hook(move |discarded| {
            let label = match discarded {
                Discarded::MalformedLine(line) => format!("garbage:{}", line),
                Discarded::UnexpectedMessage(msg) => format!("unexpected:{:?}", msg.id),
            };
            sink.lock().unwrap().push(label);
        });

        let server = tokio::spawn(async move {
            peer_write.write_all(b"log: starting up\n").await.unwrap();
            peer_write
                .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":99,\"result\":{}}\n")
                .await
                .unwrap();
            peer_write
                .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n")
                .await
                .unwrap();
            std::future::pending::<()>().await;
        });

        client.call("ping", None).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], "garbage:log: starting up");
        assert!(seen[1].starts_with("unexpected:"));
        server.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn silent_peer_trips_the_deadline() {
        let (ours, theirs) = duplex(4096);
        let (reader, writer) = split(ours);
        let config = ClientConfig::default().with_call_timeout(Duration::from_secs(5));
        let mut client = Client::with_config(Connection::new(reader, writer), config);

        // Keep the peer alive but mute.
        let server = tokio::spawn(async move {
            let _held = theirs;
            std::future::pending::<()>().await;
        });

        let err = client.call("ping", None).await.unwrap_err();
        assert!(matches!(err, CallError::DeadlineExceeded(d) if d == Duration::from_secs(5)));
        server.abort();
    }

    #[test]
    fn config_timeout_defaults_and_clears() {
        let config = ClientConfig::default();
        assert_eq!(config.call_timeout, Some(Duration::from_secs(30)));
        assert!(config.no_call_timeout().call_timeout.is_none());
    }

    #[tokio::test]
    async fn counter_assigns_sequential_ids() {
        let (mut client, peer) = pair();
        let (_peer_read, mut peer_write) = split(peer);

        let server = tokio::spawn(async move {
            for id in 1..=2 {
                let line = format!("{{\"jsonrpc\":\"2.0\",\"id\":{},\"result\":null}}\n", id);
                peer_write.write_all(line.as_bytes()).await.unwrap();
            }
            std::future::pending::<()>().await;
        });

        let first = client.call("a", None).await.unwrap();
        assert_eq!(first.id, RequestId::Number(1));
        let second = client.call("b", None).await.unwrap();
        assert_eq!(second.id, RequestId::Number(2));
        server.abort();
    }
}
