//! Sandboxed per-command extension scripts.
//!
//! Scripts run in a whitelist-only environment: core functions plus the
//! `math`/`string`/`table` libraries, nothing that touches the host
//! (`os`, `io`, `load`, `require`, `debug` are absent). `print` goes to
//! the tracing log. An instruction-count hook aborts runaway scripts.
//!
//! Side-effecting capabilities (`chat.say`, `chat.reply`, `obs.call`) do
//! not act immediately; they enqueue [`HostRequest`]s that the caller
//! processes after evaluation returns. Requests enqueued before a script
//! error are kept, so a script that sends a message and then raises still
//! sends the message.

use std::sync::{Arc, Mutex};

use mlua::{HookTriggers, Lua, RegistryKey, Table, Value};

use crate::convert::{json_to_lua, lua_to_json};
use crate::error::ScriptError;

/// Hard per-evaluation execution limit.
const MAX_INSTRUCTIONS: u32 = 1_000_000;

/// Environment keys installed for one evaluation and cleared afterwards.
const INVOCATION_KEYS: &[&str] = &["message", "command", "config", "dice", "result", "results"];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A side effect requested by a script, processed by the host after
/// evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum HostRequest {
    /// Reply to the triggering chat message.
    Reply { text: String },
    /// Send a plain message to the channel.
    Say { text: String },
    /// Raw obs-websocket request.
    ObsCall {
        request_type: String,
        data: serde_json::Value,
    },
}

/// Everything one command invocation exposes to its script.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub user: String,
    pub channel: String,
    /// Full message text including the `!command` prefix.
    pub text: String,
    /// Resolved bot configuration, credentials redacted.
    pub config: serde_json::Value,
    /// The command definition the script belongs to.
    pub command: serde_json::Value,
    /// Parsed dice terms as `(count, faces)` pairs.
    pub dice: Vec<(u32, u32)>,
    /// Roll total.
    pub result: i64,
    /// Per-die face strings.
    pub results: Vec<String>,
}

/// Result of one evaluation: the drained request queue plus an optional
/// error. Requests are present even when the script raised partway.
#[derive(Debug)]
pub struct ScriptOutcome {
    pub requests: Vec<HostRequest>,
    pub error: Option<ScriptError>,
}

type RequestQueue = Arc<Mutex<Vec<HostRequest>>>;

/// A script compiled once at registration and evaluated per invocation.
#[derive(Debug)]
pub struct CompiledScript {
    name: String,
    lua: Lua,
    func: RegistryKey,
    env: RegistryKey,
    requests: RequestQueue,
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

impl CompiledScript {
    /// Compile `source` under `name` with the sandbox environment and host
    /// capabilities installed.
    pub fn compile(name: &str, source: &str) -> Result<Self, ScriptError> {
        let lua = Lua::new();
        let requests: RequestQueue = Arc::new(Mutex::new(Vec::new()));

        let env = build_env(&lua, name, &requests).map_err(|e| ScriptError::Compile {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

        let func = lua
            .load(source)
            .set_name(name)
            .set_environment(env.clone())
            .into_function()
            .map_err(|e| ScriptError::Compile {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        let func = lua
            .create_registry_value(func)
            .map_err(|e| ScriptError::Compile {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        let env = lua
            .create_registry_value(env)
            .map_err(|e| ScriptError::Compile {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(script = %name, "script compiled");
        Ok(Self {
            name: name.to_string(),
            lua,
            func,
            env,
            requests,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the script for one invocation. Never returns `Err`: failures
    /// land in [`ScriptOutcome::error`] alongside any requests enqueued
    /// before the failure.
    pub fn eval(&self, invocation: &Invocation) -> ScriptOutcome {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();

        let error = self.run(invocation).err();
        let requests = std::mem::take(
            &mut *self
                .requests
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );

        ScriptOutcome { requests, error }
    }

    fn run(&self, invocation: &Invocation) -> Result<(), ScriptError> {
        let env: Table = self
            .lua
            .registry_value(&self.env)
            .map_err(|e| self.runtime_error(&e))?;

        self.install_invocation(&env, invocation)
            .map_err(|e| self.runtime_error(&e))?;

        self.lua.set_hook(
            HookTriggers::new().every_nth_instruction(MAX_INSTRUCTIONS),
            |_lua, _debug| {
                Err(mlua::Error::RuntimeError(
                    "instruction limit exceeded".to_string(),
                ))
            },
        );

        let func: Result<mlua::Function, _> = self.lua.registry_value(&self.func);
        let result = match func {
            Ok(func) => func.call::<()>(()),
            Err(e) => Err(e),
        };

        self.lua.remove_hook();
        for key in INVOCATION_KEYS {
            let _ = env.raw_set(*key, Value::Nil);
        }

        result.map_err(|e| self.runtime_error(&e))
    }

    fn install_invocation(&self, env: &Table, invocation: &Invocation) -> mlua::Result<()> {
        let message = self.lua.create_table()?;
        message.set("user", invocation.user.as_str())?;
        message.set("channel", invocation.channel.as_str())?;
        message.set("text", invocation.text.as_str())?;
        env.set("message", message)?;

        env.set("command", json_to_lua(&self.lua, &invocation.command)?)?;
        env.set("config", json_to_lua(&self.lua, &invocation.config)?)?;

        let dice = self.lua.create_table_with_capacity(invocation.dice.len(), 0)?;
        for (i, (count, faces)) in invocation.dice.iter().enumerate() {
            let term = self.lua.create_table()?;
            term.set("count", *count)?;
            term.set("faces", *faces)?;
            dice.raw_set(i + 1, term)?;
        }
        env.set("dice", dice)?;

        env.set("result", invocation.result)?;
        env.set("results", invocation.results.clone())?;
        Ok(())
    }

    fn runtime_error(&self, error: &mlua::Error) -> ScriptError {
        let reason = error.to_string();
        if reason.contains("instruction limit exceeded") {
            ScriptError::InstructionLimit {
                name: self.name.clone(),
            }
        } else {
            ScriptError::Runtime {
                name: self.name.clone(),
                reason,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Build the whitelist-only environment with host capabilities bound.
fn build_env(lua: &Lua, name: &str, requests: &RequestQueue) -> mlua::Result<Table> {
    let env = lua.create_table()?;

    let globals = lua.globals();
    for fn_name in &[
        "tostring", "tonumber", "type", "pairs", "ipairs", "next", "select", "error", "pcall",
        "xpcall", "assert", "rawget", "rawset", "rawlen", "rawequal", "setmetatable",
        "getmetatable", "unpack",
    ] {
        let val: Value = globals.get(*fn_name)?;
        if !matches!(val, Value::Nil) {
            env.set(*fn_name, val)?;
        }
    }
    for lib_name in &["math", "string", "table"] {
        let val: Value = globals.get(*lib_name)?;
        if !matches!(val, Value::Nil) {
            env.set(*lib_name, val)?;
        }
    }

    // print lands in the log, not stdout
    let script_name = name.to_string();
    let print_fn = lua.create_function(move |_, args: mlua::MultiValue| {
        let line = args
            .iter()
            .map(|v| match v {
                Value::String(s) => s.to_string_lossy().to_string(),
                other => format!("{other:#?}"),
            })
            .collect::<Vec<_>>()
            .join("\t");
        tracing::info!(script = %script_name, "{line}");
        Ok(())
    })?;
    env.set("print", print_fn)?;

    // chat.say / chat.reply enqueue host requests
    let chat = lua.create_table()?;
    let queue = Arc::clone(requests);
    chat.set(
        "say",
        lua.create_function(move |_, text: String| {
            queue
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .push(HostRequest::Say { text });
            Ok(())
        })?,
    )?;
    let queue = Arc::clone(requests);
    chat.set(
        "reply",
        lua.create_function(move |_, text: String| {
            queue
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .push(HostRequest::Reply { text });
            Ok(())
        })?,
    )?;
    env.set("chat", &chat)?;
    // the chat client is the platform client here
    env.set("twitch", chat)?;

    // obs.call enqueues a raw obs-websocket request
    let obs = lua.create_table()?;
    let queue = Arc::clone(requests);
    obs.set(
        "call",
        lua.create_function(move |_, (request_type, data): (String, Option<Value>)| {
            let data = match data {
                Some(value) => lua_to_json(&value)?,
                None => serde_json::Value::Object(serde_json::Map::new()),
            };
            queue
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .push(HostRequest::ObsCall { request_type, data });
            Ok(())
        })?,
    )?;
    env.set("obs", obs)?;

    // the pure roller, usable without going through the overlay
    env.set(
        "roll_dice",
        lua.create_function(|lua, spec: String| {
            let outcome = rollcast_dice::roll_spec(&spec)
                .map_err(|e| mlua::Error::RuntimeError(e.to_string()))?;
            let table = lua.create_table()?;
            table.set("values", outcome.values)?;
            table.set("total", outcome.total)?;
            Ok(table)
        })?,
    )?;

    Ok(env)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
