//! One-shot Lua state with a restricted environment.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use mlua::{
  Function, HookTriggers, Lua, LuaOptions, MultiValue, StdLib, Table, Thread, Value as LuaValue,
  VmState,
};

use flowroom_task_runtime::{Capabilities, ScriptError, ScriptOutput};

use crate::convert::{json_to_lua, lua_to_json};
use crate::fetch::create_fetch;
use crate::limits::SandboxLimits;
use crate::message::{CHUNK_NAME, error_message};

/// Base functions copied into the script environment. Everything else in
/// `_G` (load, require, dofile, print, collectgarbage, ...) stays out.
const BASE_FUNCTIONS: &[&str] = &[
  "assert",
  "error",
  "getmetatable",
  "ipairs",
  "next",
  "pairs",
  "rawequal",
  "rawget",
  "rawlen",
  "rawset",
  "select",
  "setmetatable",
  "tonumber",
  "tostring",
  "type",
];

/// Pure libraries exposed as-is.
const LIBRARIES: &[&str] = &["string", "table", "math", "utf8"];

pub(crate) struct Sandbox {
  lua: Lua,
  limits: SandboxLimits,
}

impl Sandbox {
  /// Create a fresh Lua state with only pure standard libraries loaded.
  pub(crate) fn new(limits: &SandboxLimits) -> Result<Self, ScriptError> {
    let libs = StdLib::STRING | StdLib::TABLE | StdLib::MATH | StdLib::UTF8;
    let lua = Lua::new_with(libs, LuaOptions::default()).map_err(|e| lua_error(&e))?;

    if let Some(limit) = limits.memory_limit {
      lua.set_memory_limit(limit).map_err(|e| lua_error(&e))?;
    }

    Ok(Self {
      lua,
      limits: limits.clone(),
    })
  }

  /// Load `code` as a chunk, run it with `input` bound, and convert the result.
  pub(crate) async fn eval(
    self,
    code: &str,
    input: &serde_json::Value,
    capabilities: &Capabilities,
  ) -> Result<ScriptOutput, ScriptError> {
    let deadline = Deadline::start(&self.limits);
    let env = self
      .environment(input, capabilities, &deadline)
      .map_err(|e| lua_error(&e))?;

    let chunk = self
      .lua
      .load(code)
      .set_name(CHUNK_NAME)
      .set_environment(env)
      .into_function()
      .map_err(|e| lua_error(&e))?;

    // Hooks only fire on the thread they are set on, so the chunk gets a
    // thread of its own rather than going through `call_async`.
    let thread = self.lua.create_thread(chunk).map_err(|e| lua_error(&e))?;
    deadline.arm(&thread);

    let called = tokio::time::timeout(
      self.limits.timeout,
      thread.into_async::<LuaValue>(()),
    )
    .await;

    let value = match called {
      Err(_) => return Err(self.timeout_error()),
      Ok(Err(_)) if deadline.expired() => return Err(self.timeout_error()),
      Ok(Err(e)) => return Err(lua_error(&e)),
      Ok(Ok(value)) => value,
    };

    Ok(ScriptOutput::new(lua_to_json(&value)?))
  }

  fn environment(
    &self,
    input: &serde_json::Value,
    capabilities: &Capabilities,
    deadline: &Deadline,
  ) -> mlua::Result<Table> {
    let globals = self.lua.globals();
    let env = self.lua.create_table()?;

    for name in BASE_FUNCTIONS.iter().chain(LIBRARIES) {
      env.set(*name, globals.get::<LuaValue>(*name)?)?;
    }

    let string: Table = globals.get("string")?;
    string.set("dump", LuaValue::Nil)?;

    env.set("pcall", create_pcall(&self.lua, deadline.clone())?)?;
    env.set("fetch", create_fetch(&self.lua, capabilities.http.clone())?)?;
    env.set("input", json_to_lua(&self.lua, input)?)?;

    Ok(env)
  }

  fn timeout_error(&self) -> ScriptError {
    ScriptError::new(format!(
      "script timed out after {}ms",
      self.limits.timeout.as_millis()
    ))
  }
}

/// Wall-clock budget shared by every thread a script runs on.
#[derive(Clone)]
struct Deadline {
  at: Instant,
  interval: u32,
  expired: Arc<AtomicBool>,
}

impl Deadline {
  fn start(limits: &SandboxLimits) -> Self {
    Self {
      at: Instant::now() + limits.timeout,
      interval: limits.hook_interval.max(1),
      expired: Arc::new(AtomicBool::new(false)),
    }
  }

  /// Install the instruction hook on `thread`. Only one thread carries the
  /// hook at a time, so whoever switches threads must re-arm afterwards.
  fn arm(&self, thread: &Thread) {
    let at = self.at;
    let expired = self.expired.clone();
    let triggers = HookTriggers::new().every_nth_instruction(self.interval);

    thread.set_hook(triggers, move |_lua, _debug| {
      if expired.load(Ordering::SeqCst) || Instant::now() >= at {
        expired.store(true, Ordering::SeqCst);
        return Err(mlua::Error::RuntimeError("script timed out".to_string()));
      }
      Ok(VmState::Continue)
    });
  }

  fn expired(&self) -> bool {
    self.expired.load(Ordering::SeqCst)
  }
}

/// `pcall` that can call async functions and never swallows a timeout.
///
/// The protected call runs on its own hooked thread; the caller's thread is
/// re-armed once it returns.
fn create_pcall(lua: &Lua, deadline: Deadline) -> mlua::Result<Function> {
  lua.create_async_function(move |lua, (target, args): (LuaValue, MultiValue)| {
    let deadline = deadline.clone();
    let caller = lua.current_thread();
    async move {
      let func = match target {
        LuaValue::Function(func) => func,
        other => {
          return failed(&lua, format!("attempt to call a {} value", other.type_name()));
        }
      };

      let callee = lua.create_thread(func)?;
      deadline.arm(&callee);
      let outcome = callee.into_async::<MultiValue>(args).await;
      deadline.arm(&caller);

      match outcome {
        Ok(values) => Ok(
          std::iter::once(LuaValue::Boolean(true))
            .chain(values)
            .collect::<MultiValue>(),
        ),
        Err(e) if deadline.expired() => Err(e),
        Err(e) => failed(&lua, error_message(&e)),
      }
    }
  })
}

fn failed(lua: &Lua, message: String) -> mlua::Result<MultiValue> {
  Ok(MultiValue::from_iter([
    LuaValue::Boolean(false),
    LuaValue::String(lua.create_string(message)?),
  ]))
}

fn lua_error(err: &mlua::Error) -> ScriptError {
  ScriptError::new(error_message(err))
}
