//! Low-level obs-websocket v5 client.
//!
//! Connects to a running OBS instance over its WebSocket server and provides
//! request/response correlation on top of the v5 envelope format
//! (`{"op": <opcode>, "d": {...}}`).
//!
//! This module handles:
//! - The Hello → Identify → Identified handshake, including the
//!   challenge/salt authentication scheme
//! - Request ID generation and request/response correlation
//! - Timeout handling for requests
//!
//! Events (op 5) are logged at debug level and otherwise dropped; nothing
//! in the engine consumes them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::ObsError;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// opcodes of the obs-websocket v5 envelope.
const OP_HELLO: u64 = 0;
const OP_IDENTIFY: u64 = 1;
const OP_IDENTIFIED: u64 = 2;
const OP_EVENT: u64 = 5;
const OP_REQUEST: u64 = 6;
const OP_RESPONSE: u64 = 7;

/// RPC version this client speaks.
const RPC_VERSION: u64 = 1;

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A decoded op-7 response.
#[derive(Debug, Clone)]
struct ObsResponse {
    result: bool,
    code: i64,
    comment: Option<String>,
    data: Value,
}

// ---------------------------------------------------------------------------
// ObsClient
// ---------------------------------------------------------------------------

/// obs-websocket client managing one identified connection.
///
/// Requests are sent with auto-incrementing string IDs and responses are
/// correlated back to the caller through oneshot channels, the same way a
/// DevTools-style JSON-RPC client correlates command IDs.
pub struct ObsClient {
    next_id: AtomicU64,
    pending: Arc<Mutex<HashMap<String, oneshot::Sender<ObsResponse>>>>,
    writer: Arc<Mutex<WsSink>>,
    _reader_handle: tokio::task::JoinHandle<()>,
}

impl ObsClient {
    /// Connect to an obs-websocket server and complete the Identify
    /// handshake.
    ///
    /// `password` is only used when the server's Hello carries an
    /// authentication challenge; pass an empty string for servers without
    /// auth.
    pub async fn connect(host: &str, port: u16, password: &str) -> Result<Self, ObsError> {
        let url = format!("ws://{host}:{port}");
        url::Url::parse(&url).map_err(|e| ObsError::Connect {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        tracing::info!(url = %url, "connecting to obs-websocket");

        let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| ObsError::Connect {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let (mut writer, mut reader) = ws_stream.split();

        // Hello (op 0) is the first message the server sends.
        let hello = read_envelope(&mut reader).await?;
        if hello.0 != OP_HELLO {
            return Err(ObsError::Protocol(format!(
                "expected Hello (op 0), got op {}",
                hello.0
            )));
        }

        let mut identify = json!({ "rpcVersion": RPC_VERSION });
        if let Some(auth) = hello.1.get("authentication") {
            let challenge = auth
                .get("challenge")
                .and_then(Value::as_str)
                .ok_or_else(|| ObsError::Protocol("Hello missing auth challenge".into()))?;
            let salt = auth
                .get("salt")
                .and_then(Value::as_str)
                .ok_or_else(|| ObsError::Protocol("Hello missing auth salt".into()))?;
            identify["authentication"] = Value::String(auth_token(password, salt, challenge));
        }

        let envelope = json!({ "op": OP_IDENTIFY, "d": identify });
        writer
            .send(Message::Text(envelope.to_string().into()))
            .await
            .map_err(|e| ObsError::Protocol(format!("failed to send Identify: {e}")))?;

        // Identified (op 2) confirms the handshake. An auth failure closes
        // the socket instead.
        let identified = read_envelope(&mut reader).await.map_err(|e| match e {
            ObsError::Protocol(p) => ObsError::Auth(p),
            other => other,
        })?;
        if identified.0 != OP_IDENTIFIED {
            return Err(ObsError::Auth(format!(
                "expected Identified (op 2), got op {}",
                identified.0
            )));
        }

        tracing::info!(url = %url, "obs-websocket connection identified");

        let pending: Arc<Mutex<HashMap<String, oneshot::Sender<ObsResponse>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let pending_clone = Arc::clone(&pending);
        let reader_handle = tokio::spawn(async move {
            Self::read_loop(reader, pending_clone).await;
        });

        Ok(Self {
            next_id: AtomicU64::new(1),
            pending,
            writer: Arc::new(Mutex::new(writer)),
            _reader_handle: reader_handle,
        })
    }

    /// Send a request (op 6) and wait for its response (op 7).
    ///
    /// Returns the `responseData` value on success. A failed
    /// `requestStatus` is surfaced as [`ObsError::Request`].
    pub async fn request(&self, request_type: &str, data: Value) -> Result<Value, ObsError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        let envelope = build_request_envelope(&id, request_type, &data);

        tracing::debug!(id = %id, request = request_type, "sending obs request");

        // Register the pending response before sending to avoid races.
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id.clone(), tx);
        }

        {
            let mut writer = self.writer.lock().await;
            writer
                .send(Message::Text(envelope.to_string().into()))
                .await
                .map_err(|e| ObsError::Protocol(format!("failed to send request: {e}")))?;
        }

        let response = tokio::time::timeout(REQUEST_TIMEOUT, rx)
            .await
            .map_err(|_| ObsError::Timeout {
                request_type: request_type.to_string(),
                secs: REQUEST_TIMEOUT.as_secs(),
            })?
            .map_err(|_| ObsError::Protocol("response channel closed unexpectedly".into()))?;

        if !response.result {
            return Err(ObsError::Request {
                request_type: request_type.to_string(),
                code: response.code,
                comment: response.comment.unwrap_or_default(),
            });
        }

        Ok(response.data)
    }

    /// Background task that reads envelopes and routes responses.
    async fn read_loop(
        mut reader: WsSource,
        pending: Arc<Mutex<HashMap<String, oneshot::Sender<ObsResponse>>>>,
    ) {
        while let Some(msg_result) = reader.next().await {
            let msg = match msg_result {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::warn!(error = %e, "obs-websocket read error, stopping reader");
                    break;
                }
            };

            let text = match msg {
                Message::Text(t) => t.to_string(),
                Message::Close(_) => {
                    tracing::info!("obs-websocket closed by remote");
                    break;
                }
                _ => continue,
            };

            let json: Value = match serde_json::from_str(&text) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to parse obs message as JSON");
                    continue;
                }
            };

            match json.get("op").and_then(Value::as_u64) {
                Some(OP_RESPONSE) => {
                    let d = json.get("d").cloned().unwrap_or(Value::Null);
                    let Some((id, response)) = parse_response(&d) else {
                        tracing::warn!("malformed obs response envelope");
                        continue;
                    };
                    let mut pending_guard = pending.lock().await;
                    if let Some(tx) = pending_guard.remove(&id) {
                        let _ = tx.send(response);
                    } else {
                        tracing::debug!(id = %id, "response for unknown request id");
                    }
                }
                Some(OP_EVENT) => {
                    let event_type = json
                        .pointer("/d/eventType")
                        .and_then(Value::as_str)
                        .unwrap_or("?");
                    tracing::debug!(event = event_type, "obs event (ignored)");
                }
                _ => {}
            }
        }

        // Pending requests can never complete once the connection drops;
        // dropping their senders fails the waiting callers.
        let mut pending_guard = pending.lock().await;
        pending_guard.clear();
    }
}

/// Read one `{op, d}` envelope from the stream.
async fn read_envelope(reader: &mut WsSource) -> Result<(u64, Value), ObsError> {
    loop {
        let msg = reader
            .next()
            .await
            .ok_or_else(|| ObsError::Protocol("connection closed during handshake".into()))?
            .map_err(|e| ObsError::Protocol(format!("websocket error: {e}")))?;

        let text = match msg {
            Message::Text(t) => t.to_string(),
            Message::Close(frame) => {
                let reason = frame
                    .map(|f| f.reason.to_string())
                    .unwrap_or_else(|| "closed".into());
                return Err(ObsError::Protocol(reason));
            }
            _ => continue,
        };

        let json: Value = serde_json::from_str(&text)?;
        let op = json
            .get("op")
            .and_then(Value::as_u64)
            .ok_or_else(|| ObsError::Protocol("envelope missing op".into()))?;
        let d = json.get("d").cloned().unwrap_or(Value::Null);
        return Ok((op, d));
    }
}

// ---------------------------------------------------------------------------
// Protocol helpers
// ---------------------------------------------------------------------------

/// Derive the Identify authentication string from the Hello challenge.
///
/// `base64(sha256(base64(sha256(password + salt)) + challenge))` per the
/// obs-websocket v5 authentication scheme.
pub fn auth_token(password: &str, salt: &str, challenge: &str) -> String {
    let engine = base64::engine::general_purpose::STANDARD;

    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(salt.as_bytes());
    let secret = engine.encode(hasher.finalize());

    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(challenge.as_bytes());
    engine.encode(hasher.finalize())
}

/// Build an op-6 request envelope.
pub fn build_request_envelope(id: &str, request_type: &str, data: &Value) -> Value {
    json!({
        "op": OP_REQUEST,
        "d": {
            "requestType": request_type,
            "requestId": id,
            "requestData": data,
        }
    })
}

/// Decode the `d` payload of an op-7 response into `(requestId, response)`.
fn parse_response(d: &Value) -> Option<(String, ObsResponse)> {
    let id = d.get("requestId")?.as_str()?.to_string();
    let status = d.get("requestStatus")?;
    let response = ObsResponse {
        result: status.get("result").and_then(Value::as_bool).unwrap_or(false),
        code: status.get("code").and_then(Value::as_i64).unwrap_or(-1),
        comment: status
            .get("comment")
            .and_then(Value::as_str)
            .map(str::to_string),
        data: d.get("responseData").cloned().unwrap_or(Value::Null),
    };
    Some((id, response))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
