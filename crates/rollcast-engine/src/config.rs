//! Bot configuration.
//!
//! One TOML file, `rollcast.toml` by default, overridable via the
//! `ROLLCAST_CONFIG` environment variable. Optional fields carry serde
//! defaults so a minimal file only needs the Twitch credentials, the OBS
//! scene, and at least one command.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::json;

use rollcast_chat::TwitchConfig;
use rollcast_obs::DisplayColors;

use crate::error::EngineError;

/// Environment variable overriding the config file path.
pub const CONFIG_PATH_VAR: &str = "ROLLCAST_CONFIG";

/// Default config file path.
pub const DEFAULT_CONFIG_PATH: &str = "rollcast.toml";

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// obs-websocket connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObsSection {
    #[serde(default = "default_obs_host")]
    pub host: String,
    #[serde(default = "default_obs_port")]
    pub port: u16,
    /// Empty when the server has authentication disabled.
    #[serde(default)]
    pub password: String,
    /// Scene the overlay sources live in.
    pub scene: String,
}

impl ObsSection {
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

fn default_obs_host() -> String {
    "localhost".to_string()
}

fn default_obs_port() -> u16 {
    4455
}

/// Hex colors for the rendered overlay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplaySection {
    #[serde(default = "default_dice_color")]
    pub dice_color: String,
    #[serde(default = "default_label_color")]
    pub label_color: String,
    #[serde(default = "default_chroma_key")]
    pub chroma_key: String,
}

impl DisplaySection {
    pub fn colors(&self) -> DisplayColors {
        DisplayColors {
            dice: self.dice_color.clone(),
            label: self.label_color.clone(),
            chroma: self.chroma_key.clone(),
        }
    }
}

impl Default for DisplaySection {
    fn default() -> Self {
        Self {
            dice_color: default_dice_color(),
            label_color: default_label_color(),
            chroma_key: default_chroma_key(),
        }
    }
}

fn default_dice_color() -> String {
    "EEEEEE".to_string()
}

fn default_label_color() -> String {
    "FFFFFF".to_string()
}

fn default_chroma_key() -> String {
    "00FF00".to_string()
}

/// One chat command definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Dice spec like `2d6` or `1d20+2d4`. Absent for chat-only commands.
    #[serde(default)]
    pub dice: Option<String>,
    /// Reply template; `{user}` and `{result}` are substituted.
    #[serde(default)]
    pub message: Option<String>,
    /// Seconds the overlay stays visible.
    #[serde(default = "default_display_time")]
    pub display_time: u64,
    /// Lua source evaluated after the display finishes.
    #[serde(default)]
    pub script: Option<String>,
}

fn default_display_time() -> u64 {
    5
}

// ---------------------------------------------------------------------------
// BotConfig
// ---------------------------------------------------------------------------

/// The whole configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub twitch: TwitchConfig,
    pub obs: ObsSection,
    #[serde(default)]
    pub display: DisplaySection,
    #[serde(default)]
    pub commands: HashMap<String, CommandConfig>,
}

impl BotConfig {
    /// Load from `ROLLCAST_CONFIG` or `rollcast.toml`.
    pub fn load() -> Result<Self, EngineError> {
        let path =
            std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(path: &Path) -> Result<Self, EngineError> {
        let raw = std::fs::read_to_string(path).map_err(|source| EngineError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&raw)?;
        tracing::info!(
            path = %path.display(),
            commands = config.commands.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// The configuration as a JSON value for script consumption, with the
    /// oauth token redacted.
    pub fn as_script_value(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| json!({}));
        if let Some(token) = value.pointer_mut("/twitch/oauth_token") {
            *token = json!("[REDACTED]");
        }
        value
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
        [twitch]
        oauth_token = "oauth:abc123"
        channel = "testchannel"
        bot_username = "roll_bot"

        [obs]
        scene = "Main"

        [commands.roll]
        dice = "2d6"
    "#;

    #[test]
    fn test_minimal_config() {
        let config: BotConfig = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.obs.host, "localhost");
        assert_eq!(config.obs.port, 4455);
        assert_eq!(config.obs.password, "");
        assert_eq!(config.obs.url(), "ws://localhost:4455");
        assert_eq!(config.display.chroma_key, "00FF00");

        let roll = &config.commands["roll"];
        assert_eq!(roll.dice.as_deref(), Some("2d6"));
        assert_eq!(roll.display_time, 5);
        assert!(roll.message.is_none());
        assert!(roll.script.is_none());
    }

    #[test]
    fn test_full_command_config() {
        let config: BotConfig = toml::from_str(
            r#"
            [twitch]
            oauth_token = "oauth:abc123"
            channel = "testchannel"
            bot_username = "roll_bot"

            [obs]
            host = "stream-pc"
            port = 4456
            password = "hunter2"
            scene = "Game"

            [display]
            dice_color = "FF0000"

            [commands.attack]
            dice = "1d20"
            message = "{user} rolled {result}"
            display_time = 8
            script = "chat.say('done')"
            "#,
        )
        .unwrap();

        assert_eq!(config.obs.url(), "ws://stream-pc:4456");
        assert_eq!(config.display.dice_color, "FF0000");
        assert_eq!(config.display.label_color, "FFFFFF");

        let attack = &config.commands["attack"];
        assert_eq!(attack.display_time, 8);
        assert_eq!(attack.message.as_deref(), Some("{user} rolled {result}"));
        assert!(attack.script.is_some());
    }

    #[test]
    fn test_missing_required_section_fails() {
        let result: Result<BotConfig, _> = toml::from_str("[obs]\nscene = \"Main\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = BotConfig::load_from(file.path()).unwrap();
        assert_eq!(config.twitch.channel, "testchannel");
    }

    #[test]
    fn test_load_missing_file() {
        let err = BotConfig::load_from(Path::new("/nonexistent/rollcast.toml")).unwrap_err();
        assert!(matches!(err, EngineError::ConfigRead { .. }));
    }

    #[test]
    fn test_script_value_redacts_token() {
        let config: BotConfig = toml::from_str(MINIMAL).unwrap();
        let value = config.as_script_value();
        assert_eq!(value["twitch"]["oauth_token"], "[REDACTED]");
        assert_eq!(value["obs"]["scene"], "Main");
        assert_eq!(value["commands"]["roll"]["dice"], "2d6");
    }
}
