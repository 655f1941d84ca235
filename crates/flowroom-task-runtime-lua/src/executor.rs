use async_trait::async_trait;
use tracing::{debug, instrument};

use flowroom_task_runtime::{Capabilities, ScriptError, ScriptExecutor, ScriptOutput};

use crate::limits::SandboxLimits;
use crate::sandbox::Sandbox;

/// Runs node scripts in a fresh, capability-scoped Lua state per call.
#[derive(Debug, Clone)]
pub struct LuaScriptExecutor {
  capabilities: Capabilities,
  limits: SandboxLimits,
}

impl LuaScriptExecutor {
  pub fn new(capabilities: Capabilities, limits: SandboxLimits) -> Self {
    Self {
      capabilities,
      limits,
    }
  }

  pub fn limits(&self) -> &SandboxLimits {
    &self.limits
  }
}

#[async_trait]
impl ScriptExecutor for LuaScriptExecutor {
  #[instrument(name = "script_run", skip_all, fields(code_len = code.len()))]
  async fn run(&self, code: &str, input: &serde_json::Value) -> Result<ScriptOutput, ScriptError> {
    let sandbox = Sandbox::new(&self.limits)?;
    let result = sandbox.eval(code, input, &self.capabilities).await;

    if let Err(e) = &result {
      debug!(error = %e, "script raised");
    }
    result
  }
}
