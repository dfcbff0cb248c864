//! Command records.
//!
//! A `Command` is built once from its config entry and immutable
//! afterwards. It owns the per-command dispatch lock; invocations of the
//! same command queue on it in arrival order while different commands
//! never contend.

use std::time::Duration;

use serde_json::json;
use tokio::sync::Mutex;

use rollcast_dice::RollSpec;
use rollcast_script::CompiledScript;

use crate::config::CommandConfig;
use crate::error::EngineError;

/// A registered chat command.
#[derive(Debug)]
pub struct Command {
    pub(crate) name: String,
    pub(crate) spec: Option<RollSpec>,
    pub(crate) message: Option<String>,
    pub(crate) display_time: Duration,
    /// Compiled once at registration. Behind a mutex because the Lua
    /// state is `Send` but not `Sync`.
    pub(crate) script: Option<Mutex<CompiledScript>>,
    /// The command definition as scripts see it.
    pub(crate) config_value: serde_json::Value,
    /// Serializes invocations of this command.
    pub(crate) lock: Mutex<()>,
}

impl Command {
    /// Build a command from its config entry, parsing the dice spec and
    /// compiling the script up front. A failure here fails this command
    /// only.
    pub fn from_config(name: &str, config: &CommandConfig) -> Result<Self, EngineError> {
        let spec = config
            .dice
            .as_deref()
            .map(RollSpec::parse)
            .transpose()
            .map_err(|e| EngineError::Registration {
                command: name.to_string(),
                reason: e.to_string(),
            })?;

        let script = config
            .script
            .as_deref()
            .map(|source| CompiledScript::compile(name, source))
            .transpose()
            .map_err(|e| EngineError::Registration {
                command: name.to_string(),
                reason: e.to_string(),
            })?
            .map(Mutex::new);

        let config_value = serde_json::to_value(config).unwrap_or_else(|_| json!({}));

        Ok(Self {
            name: name.to_string(),
            spec,
            message: config.message.clone(),
            display_time: Duration::from_secs(config.display_time),
            script,
            config_value,
            lock: Mutex::new(()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> Option<&RollSpec> {
        self.spec.as_ref()
    }

    /// Reply text with `{user}` and `{result}` substituted, if a template
    /// is configured.
    pub fn render_message(&self, user: &str, result: i64) -> Option<String> {
        self.message.as_ref().map(|template| {
            template
                .replace("{user}", user)
                .replace("{result}", &result.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> CommandConfig {
        CommandConfig {
            dice: Some("2d6".to_string()),
            message: Some("{user} rolled {result}".to_string()),
            display_time: 5,
            script: None,
        }
    }

    #[test]
    fn test_from_config() {
        let cmd = Command::from_config("roll", &base_config()).unwrap();
        assert_eq!(cmd.name(), "roll");
        assert_eq!(cmd.spec().unwrap().die_count(), 2);
        assert_eq!(cmd.display_time, Duration::from_secs(5));
        assert!(cmd.script.is_none());
        assert_eq!(cmd.config_value["dice"], "2d6");
    }

    #[test]
    fn test_bad_dice_spec_fails_registration() {
        let mut config = base_config();
        config.dice = Some("2d7".to_string());
        let err = Command::from_config("roll", &config).unwrap_err();
        assert!(matches!(err, EngineError::Registration { command, .. } if command == "roll"));
    }

    #[test]
    fn test_bad_script_fails_registration() {
        let mut config = base_config();
        config.script = Some("not lua at all".to_string());
        assert!(Command::from_config("roll", &config).is_err());
    }

    #[test]
    fn test_valid_script_compiles() {
        let mut config = base_config();
        config.script = Some("chat.say('hi')".to_string());
        let cmd = Command::from_config("roll", &config).unwrap();
        assert!(cmd.script.is_some());
    }

    #[test]
    fn test_no_dice_is_valid() {
        let mut config = base_config();
        config.dice = None;
        let cmd = Command::from_config("greet", &config).unwrap();
        assert!(cmd.spec().is_none());
    }

    #[test]
    fn test_render_message() {
        let cmd = Command::from_config("roll", &base_config()).unwrap();
        assert_eq!(
            cmd.render_message("alice", 7).as_deref(),
            Some("alice rolled 7")
        );
    }

    #[test]
    fn test_render_message_without_template() {
        let mut config = base_config();
        config.message = None;
        let cmd = Command::from_config("roll", &config).unwrap();
        assert_eq!(cmd.render_message("alice", 7), None);
    }
}
