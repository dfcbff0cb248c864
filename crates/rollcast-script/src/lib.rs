//! rollcast-script — sandboxed Lua extension scripts for chat commands.
//!
//! A command may carry a Lua script that runs after its dice display
//! finishes. Scripts are compiled once at registration and evaluated per
//! invocation inside a whitelist-only environment with an instruction
//! limit. Side effects (chat messages, raw OBS requests) are queued as
//! [`HostRequest`]s for the host to process; script failures never escape
//! the sandbox.

pub mod convert;
pub mod error;
pub mod sandbox;

pub use convert::{json_to_lua, lua_to_json};
pub use error::ScriptError;
pub use sandbox::{CompiledScript, HostRequest, Invocation, ScriptOutcome};
