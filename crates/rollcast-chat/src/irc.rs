//! Twitch IRC protocol: configuration, message builders, and parsers.
//!
//! Pure functions over raw IRC lines; the WebSocket transport lives in
//! [`crate::client`]. OAuth tokens are validated for format and never
//! logged.

use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// WebSocket URL for Twitch IRC.
pub const TWITCH_IRC_WSS: &str = "wss://irc-ws.chat.twitch.tv:443";

/// Maximum length for Twitch channel names and usernames.
const MAX_NAME_LEN: usize = 25;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Twitch chat connection settings.
///
/// The oauth token is sensitive; the `Debug` impl redacts it.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TwitchConfig {
    /// OAuth token, `oauth:` prefix plus alphanumeric characters.
    pub oauth_token: String,
    /// Channel to join, without the `#` prefix.
    pub channel: String,
    /// Bot username for the NICK command.
    pub bot_username: String,
}

impl std::fmt::Debug for TwitchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwitchConfig")
            .field("oauth_token", &"[REDACTED]")
            .field("channel", &self.channel)
            .field("bot_username", &self.bot_username)
            .finish()
    }
}

/// Validate an OAuth token: `oauth:` prefix followed by alphanumerics.
pub fn validate_oauth_token(token: &str) -> Result<(), ChatError> {
    let suffix = token
        .strip_prefix("oauth:")
        .ok_or_else(|| ChatError::InvalidConfig("oauth token must start with 'oauth:'".into()))?;
    if suffix.is_empty() {
        return Err(ChatError::InvalidConfig(
            "oauth token is empty after 'oauth:' prefix".into(),
        ));
    }
    if !suffix.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ChatError::InvalidConfig(
            "oauth token contains non-alphanumeric characters".into(),
        ));
    }
    Ok(())
}

/// Validate a channel name or username: 1–25 chars, alphanumeric or `_`.
pub fn validate_twitch_name(name: &str, field: &str) -> Result<(), ChatError> {
    if name.is_empty() {
        return Err(ChatError::InvalidConfig(format!("{field} cannot be empty")));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(ChatError::InvalidConfig(format!(
            "{field} exceeds {MAX_NAME_LEN} characters"
        )));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ChatError::InvalidConfig(format!(
            "{field} contains invalid characters: {name:?}"
        )));
    }
    Ok(())
}

/// Validate the whole configuration.
pub fn validate_config(config: &TwitchConfig) -> Result<(), ChatError> {
    validate_oauth_token(&config.oauth_token)?;
    validate_twitch_name(&config.channel, "channel")?;
    validate_twitch_name(&config.bot_username, "bot_username")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Message builders
// ---------------------------------------------------------------------------

/// Capabilities requested at login; tags carry message ids for replies.
pub fn build_cap_req() -> String {
    "CAP REQ :twitch.tv/tags twitch.tv/commands".to_string()
}

pub fn build_pass(config: &TwitchConfig) -> String {
    format!("PASS {}", config.oauth_token)
}

pub fn build_nick(config: &TwitchConfig) -> String {
    format!("NICK {}", config.bot_username)
}

pub fn build_join(config: &TwitchConfig) -> String {
    format!("JOIN #{}", config.channel)
}

pub fn build_privmsg(channel: &str, text: &str) -> String {
    format!("PRIVMSG #{channel} :{text}")
}

/// A PRIVMSG threaded under the message with the given id.
pub fn build_reply(channel: &str, parent_msg_id: &str, text: &str) -> String {
    format!("@reply-parent-msg-id={parent_msg_id} PRIVMSG #{channel} :{text}")
}

pub fn build_pong(payload: &str) -> String {
    format!("PONG :{payload}")
}

// ---------------------------------------------------------------------------
// Parsers
// ---------------------------------------------------------------------------

/// A parsed PRIVMSG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    pub sender: String,
    pub channel: String,
    pub text: String,
    /// The `id` tag when the tags capability is active.
    pub message_id: Option<String>,
}

/// Return the PING payload if the line is a PING.
pub fn parse_ping(raw: &str) -> Option<&str> {
    raw.strip_prefix("PING :")
        .or_else(|| raw.strip_prefix("PING"))
        .map(str::trim)
}

/// Whether the line is the 001 welcome numeric (login accepted).
pub fn is_welcome(raw: &str) -> bool {
    raw.split(' ').nth(1) == Some("001")
}

/// Whether the line is Twitch's login-failure NOTICE.
pub fn is_auth_failure(raw: &str) -> bool {
    raw.contains("NOTICE") && raw.contains("Login authentication failed")
        || raw.contains("NOTICE") && raw.contains("Improperly formatted auth")
}

/// Parse a raw IRC PRIVMSG, with or without a leading tags segment.
///
/// Expected shape:
/// `[@tags ]:user!user@user.tmi.twitch.tv PRIVMSG #channel :message text`
pub fn parse_privmsg(raw: &str) -> Option<ParsedMessage> {
    let (message_id, rest) = if let Some(tagged) = raw.strip_prefix('@') {
        let (tags, rest) = tagged.split_once(' ')?;
        (extract_tag(tags, "id"), rest)
    } else {
        (None, raw)
    };

    let rest = rest.strip_prefix(':')?;
    let (prefix, rest) = rest.split_once(' ')?;
    let sender = prefix.split('!').next()?.to_string();

    let rest = rest.strip_prefix("PRIVMSG ")?;
    let (channel_part, message) = rest.split_once(" :")?;
    let channel = channel_part.strip_prefix('#')?.to_string();

    Some(ParsedMessage {
        sender,
        channel,
        text: message.to_string(),
        message_id,
    })
}

/// Extract one key from a `k=v;k=v` tags segment.
fn extract_tag(tags: &str, key: &str) -> Option<String> {
    tags.split(';').find_map(|kv| {
        let (k, v) = kv.split_once('=')?;
        (k == key && !v.is_empty()).then(|| v.to_string())
    })
}

/// Split a `!name args` message into `(name, args)`.
pub fn parse_command(text: &str) -> Option<(&str, &str)> {
    let rest = text.strip_prefix('!')?;
    if rest.is_empty() {
        return None;
    }
    match rest.split_once(' ') {
        Some((name, args)) => Some((name, args.trim())),
        None => Some((rest.trim_end(), "")),
    }
}

/// A single WebSocket frame can carry several CRLF-terminated IRC lines.
pub fn split_lines(frame: &str) -> impl Iterator<Item = &str> {
    frame.split("\r\n").filter(|l| !l.is_empty())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
