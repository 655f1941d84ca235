//! Lua implementation of [`ScriptExecutor`](flowroom_task_runtime::ScriptExecutor).
//!
//! Every call gets a brand-new Lua 5.4 state. The node's code is loaded as a
//! chunk whose environment is a private table holding `input`, `fetch`, and
//! the pure parts of the standard library. The chunk's first return value is
//! converted to JSON with the same lossy rules as `JSON.stringify`.
//!
//! ```lua
//! local res = fetch("https://api.example.com/items/" .. input.id)
//! if not res.ok then error("lookup failed: " .. res.status) end
//! return { id = input.id, name = res.json.name }
//! ```

mod convert;
mod executor;
mod fetch;
mod limits;
mod message;
mod sandbox;

pub use executor::LuaScriptExecutor;
pub use limits::SandboxLimits;
