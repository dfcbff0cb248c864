//! The chat client: WebSocket transport, command registry, dispatch.
//!
//! Outbound lines flow through an unbounded mpsc queue drained by a writer
//! task, so a [`ChatHandle`] can be cloned freely and used before the
//! connection is up. The read loop answers PING, joins the configured
//! channel once the 001 welcome arrives, and spawns one task per inbound
//! `!command` so invocations of different commands interleave freely.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;

use crate::error::ChatError;
use crate::irc::{self, ParsedMessage, TwitchConfig, TWITCH_IRC_WSS};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Context passed to a command handler for one chat invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandContext {
    pub user: String,
    pub channel: String,
    /// Full message text including the `!command` prefix.
    pub text: String,
    /// Text after the command name, trimmed.
    pub args: String,
    /// Twitch message id, present when the tags capability is active.
    pub message_id: Option<String>,
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A registered command handler. Each invocation runs as its own task.
pub type CommandHandler = Arc<dyn Fn(CommandContext) -> HandlerFuture + Send + Sync>;

/// Connection readiness, published on a watch channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Ready,
    AuthFailed(String),
}

/// Outbound chat operations, mockable for engine tests.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Reply to the message in `ctx`, threaded when a message id exists.
    async fn reply(&self, ctx: &CommandContext, text: &str) -> Result<(), ChatError>;
    /// Send a plain message to the joined channel.
    async fn say(&self, text: &str) -> Result<(), ChatError>;
}

// ---------------------------------------------------------------------------
// ChatHandle
// ---------------------------------------------------------------------------

/// Cheap-clone sender half of the chat connection.
#[derive(Clone)]
pub struct ChatHandle {
    channel: String,
    out_tx: mpsc::UnboundedSender<String>,
}

impl ChatHandle {
    /// Queue a raw IRC line for the writer task.
    pub fn send_raw(&self, line: String) -> Result<(), ChatError> {
        self.out_tx.send(line).map_err(|_| ChatError::Closed)
    }
}

#[async_trait]
impl ChatApi for ChatHandle {
    async fn reply(&self, ctx: &CommandContext, text: &str) -> Result<(), ChatError> {
        let line = match &ctx.message_id {
            Some(id) => irc::build_reply(&self.channel, id, text),
            None => irc::build_privmsg(&self.channel, &format!("@{} {}", ctx.user, text)),
        };
        self.send_raw(line)
    }

    async fn say(&self, text: &str) -> Result<(), ChatError> {
        self.send_raw(irc::build_privmsg(&self.channel, text))
    }
}

// ---------------------------------------------------------------------------
// Line handling
// ---------------------------------------------------------------------------

/// What the read loop should do with one inbound IRC line.
#[derive(Debug, PartialEq, Eq)]
enum LineAction {
    Pong(String),
    Join,
    AuthFailed(String),
    Dispatch { name: String, ctx: CommandContext },
    Ignore,
}

/// Classify one inbound line. Pure, so the dispatch logic is testable
/// without a socket.
fn classify_line(line: &str, own_channel: &str) -> LineAction {
    if let Some(payload) = irc::parse_ping(line) {
        return LineAction::Pong(payload.to_string());
    }
    if irc::is_welcome(line) {
        return LineAction::Join;
    }
    if irc::is_auth_failure(line) {
        return LineAction::AuthFailed(line.to_string());
    }
    if let Some(ParsedMessage {
        sender,
        channel,
        text,
        message_id,
    }) = irc::parse_privmsg(line)
    {
        if channel != own_channel {
            return LineAction::Ignore;
        }
        if let Some((name, args)) = irc::parse_command(&text) {
            return LineAction::Dispatch {
                name: name.to_string(),
                ctx: CommandContext {
                    user: sender,
                    channel,
                    args: args.to_string(),
                    text,
                    message_id,
                },
            };
        }
    }
    LineAction::Ignore
}

// ---------------------------------------------------------------------------
// ChatClient
// ---------------------------------------------------------------------------

type HandlerMap = Arc<RwLock<HashMap<String, CommandHandler>>>;

/// Twitch chat client owning the connection lifecycle.
pub struct ChatClient {
    config: TwitchConfig,
    handle: ChatHandle,
    out_rx: Option<mpsc::UnboundedReceiver<String>>,
    handlers: HandlerMap,
    ready_tx: watch::Sender<ReadyState>,
    ready_rx: watch::Receiver<ReadyState>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl ChatClient {
    /// Build a client from validated configuration. Does not connect.
    pub fn new(config: TwitchConfig) -> Result<Self, ChatError> {
        irc::validate_config(&config)?;
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = watch::channel(ReadyState::Connecting);
        let handle = ChatHandle {
            channel: config.channel.clone(),
            out_tx,
        };
        Ok(Self {
            config,
            handle,
            out_rx: Some(out_rx),
            handlers: Arc::new(RwLock::new(HashMap::new())),
            ready_tx,
            ready_rx,
            tasks: Vec::new(),
        })
    }

    /// Sender half, available before the connection is up; queued messages
    /// flush once the writer task starts.
    pub fn handle(&self) -> ChatHandle {
        self.handle.clone()
    }

    /// Register a handler for `!name`.
    ///
    /// Fails once authentication has failed; registration resumes only
    /// after the credentials are fixed and a new client is built.
    pub fn register_command(
        &self,
        name: impl Into<String>,
        handler: CommandHandler,
    ) -> Result<(), ChatError> {
        if let ReadyState::AuthFailed(reason) = &*self.ready_rx.borrow() {
            return Err(ChatError::Auth(reason.clone()));
        }
        let name = name.into();
        tracing::debug!(command = %name, "chat command registered");
        self.handlers
            .write()
            .expect("handler registry poisoned")
            .insert(name, handler);
        Ok(())
    }

    /// Connect, authenticate, and spawn the writer and read-loop tasks.
    pub async fn start(&mut self) -> Result<(), ChatError> {
        let out_rx = self
            .out_rx
            .take()
            .ok_or_else(|| ChatError::Connect("client already started".into()))?;

        tracing::info!(url = TWITCH_IRC_WSS, "connecting to Twitch chat");
        let (ws_stream, _) = tokio_tungstenite::connect_async(TWITCH_IRC_WSS)
            .await
            .map_err(|e| ChatError::Connect(e.to_string()))?;
        let (writer, reader) = ws_stream.split();

        self.handle.send_raw(irc::build_cap_req())?;
        self.handle.send_raw(irc::build_pass(&self.config))?;
        self.handle.send_raw(irc::build_nick(&self.config))?;

        self.tasks.push(tokio::spawn(write_loop(writer, out_rx)));
        self.tasks.push(tokio::spawn(read_loop(
            reader,
            self.config.clone(),
            self.handle.clone(),
            Arc::clone(&self.handlers),
            self.ready_tx.clone(),
        )));

        Ok(())
    }

    /// Wait until the channel is joined. Surfaces authentication failures.
    pub async fn ready(&self) -> Result<(), ChatError> {
        let mut rx = self.ready_rx.clone();
        loop {
            match &*rx.borrow() {
                ReadyState::Ready => return Ok(()),
                ReadyState::AuthFailed(reason) => return Err(ChatError::Auth(reason.clone())),
                ReadyState::Connecting => {}
            }
            rx.changed().await.map_err(|_| ChatError::Closed)?;
        }
    }

    /// Stop the connection tasks.
    pub fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        tracing::info!("chat client stopped");
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.stop();
    }
}

type WsSink = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    Message,
>;
type WsSource = futures_util::stream::SplitStream<
    tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
>;

/// Drain the outbound queue into the socket.
async fn write_loop(mut writer: WsSink, mut out_rx: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = out_rx.recv().await {
        if let Err(e) = writer.send(Message::Text(line.into())).await {
            tracing::warn!(error = %e, "chat write failed, stopping writer");
            break;
        }
    }
}

/// Read frames, classify each line, and act on it.
async fn read_loop(
    mut reader: WsSource,
    config: TwitchConfig,
    handle: ChatHandle,
    handlers: HandlerMap,
    ready_tx: watch::Sender<ReadyState>,
) {
    while let Some(msg_result) = reader.next().await {
        let msg = match msg_result {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(error = %e, "chat read error, stopping reader");
                break;
            }
        };
        let frame = match msg {
            Message::Text(t) => t.to_string(),
            Message::Close(_) => {
                tracing::info!("chat connection closed by remote");
                break;
            }
            _ => continue,
        };

        for line in irc::split_lines(&frame) {
            match classify_line(line, &config.channel) {
                LineAction::Pong(payload) => {
                    let _ = handle.send_raw(irc::build_pong(&payload));
                }
                LineAction::Join => {
                    let _ = handle.send_raw(irc::build_join(&config));
                    let _ = ready_tx.send(ReadyState::Ready);
                    tracing::info!(channel = %config.channel, "joined chat channel");
                }
                LineAction::AuthFailed(reason) => {
                    tracing::error!("chat authentication failed");
                    let _ = ready_tx.send(ReadyState::AuthFailed(reason));
                }
                LineAction::Dispatch { name, ctx } => {
                    let handler = {
                        let registry = handlers.read().expect("handler registry poisoned");
                        registry.get(&name).cloned()
                    };
                    match handler {
                        Some(handler) => {
                            tracing::debug!(command = %name, user = %ctx.user, "dispatching command");
                            tokio::spawn(handler(ctx));
                        }
                        None => tracing::trace!(command = %name, "unregistered command, ignoring"),
                    }
                }
                LineAction::Ignore => {}
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
