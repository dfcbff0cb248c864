//! Per-command serialized dispatch.
//!
//! One invocation walks roll → show → wait → hide → reply → script while
//! holding the command's lock; the guard drops on every exit path, so the
//! lock is free immediately after, success or not. Overlay and chat
//! failures propagate to the caller (the overlay may be left visible;
//! the next successful invocation reconciles it). Script failures are
//! contained here and never surface to chat.

use std::sync::Arc;

use tracing::{debug, warn};

use rollcast_chat::{ChatApi, CommandContext};
use rollcast_obs::{ObsApi, OverlayManager};
use rollcast_script::{HostRequest, Invocation};

use crate::command::Command;
use crate::error::EngineError;

pub struct Dispatcher {
    obs: Arc<dyn ObsApi>,
    overlay: Arc<OverlayManager>,
    chat: Arc<dyn ChatApi>,
    /// Resolved bot configuration for script consumption, token redacted.
    script_config: serde_json::Value,
}

impl Dispatcher {
    pub fn new(
        obs: Arc<dyn ObsApi>,
        overlay: Arc<OverlayManager>,
        chat: Arc<dyn ChatApi>,
        script_config: serde_json::Value,
    ) -> Self {
        Self {
            obs,
            overlay,
            chat,
            script_config,
        }
    }

    /// Run one invocation of `command` end to end.
    ///
    /// Invocations of the same command queue on its lock in arrival
    /// order; different commands run concurrently.
    pub async fn dispatch(
        &self,
        command: &Command,
        ctx: &CommandContext,
    ) -> Result<(), EngineError> {
        let _guard = command.lock.lock().await;
        debug!(command = %command.name, user = %ctx.user, "dispatch started");

        let rolled = command
            .spec
            .as_ref()
            .map(|spec| (rollcast_dice::roll(spec, &mut rand::rng()), spec));

        if let Some((outcome, spec)) = &rolled {
            let source = OverlayManager::source_name(&command.name);
            let item_id = self
                .overlay
                .set_dice_display(&source, spec.primary_faces(), &outcome.values)
                .await?;
            self.overlay.show(item_id).await?;
            tokio::time::sleep(command.display_time).await;
            self.overlay.hide(item_id).await?;
        }

        let result = rolled.as_ref().map(|(o, _)| o.total).unwrap_or(0);
        if let Some(text) = command.render_message(&ctx.user, result) {
            self.chat.reply(ctx, &text).await?;
        }

        if let Some(script) = &command.script {
            let outcome = {
                let script = script.lock().await;
                let invocation = Invocation {
                    user: ctx.user.clone(),
                    channel: ctx.channel.clone(),
                    text: ctx.text.clone(),
                    config: self.script_config.clone(),
                    command: command.config_value.clone(),
                    dice: command
                        .spec
                        .iter()
                        .flat_map(|s| s.terms.iter().map(|t| (t.count, t.faces)))
                        .collect(),
                    result,
                    results: rolled
                        .as_ref()
                        .map(|(o, _)| o.values.clone())
                        .unwrap_or_default(),
                };
                script.eval(&invocation)
            };
            if let Some(error) = outcome.error {
                warn!(command = %command.name, "script failed: {error}");
            }
            self.process_requests(ctx, outcome.requests).await;
        }

        debug!(command = %command.name, user = %ctx.user, "dispatch finished");
        Ok(())
    }

    /// Act on the side effects a script queued. Failures here are part of
    /// the script stage and are logged, not propagated.
    async fn process_requests(&self, ctx: &CommandContext, requests: Vec<HostRequest>) {
        for request in requests {
            let result = match request {
                HostRequest::Reply { text } => self
                    .chat
                    .reply(ctx, &text)
                    .await
                    .map(|_| ())
                    .map_err(|e| e.to_string()),
                HostRequest::Say { text } => {
                    self.chat.say(&text).await.map(|_| ()).map_err(|e| e.to_string())
                }
                HostRequest::ObsCall { request_type, data } => self
                    .obs
                    .call(&request_type, data)
                    .await
                    .map(|_| ())
                    .map_err(|e| e.to_string()),
            };
            if let Err(reason) = result {
                warn!("script host request failed: {reason}");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
