//! Normalizing Lua errors into the plain messages recorded on nodes.

/// Chunk name scripts are loaded under. The leading `=` makes Lua print it
/// verbatim in error locations (`script:3: boom`).
pub(crate) const CHUNK_NAME: &str = "=script";

/// Render an mlua error as the message a user would expect to see.
pub(crate) fn error_message(err: &mlua::Error) -> String {
  match err {
    mlua::Error::RuntimeError(message) => strip_location(message).to_string(),
    mlua::Error::SyntaxError { message, .. } => {
      format!("syntax error: {}", strip_traceback(message))
    }
    mlua::Error::MemoryError(_) => "script exceeded its memory limit".to_string(),
    mlua::Error::CallbackError { cause, .. } => error_message(cause),
    mlua::Error::WithContext { cause, .. } => error_message(cause),
    mlua::Error::ExternalError(inner) => inner.to_string(),
    other => strip_location(&other.to_string()).to_string(),
  }
}

fn strip_traceback(message: &str) -> &str {
  message
    .split("\nstack traceback:")
    .next()
    .unwrap_or(message)
    .trim_end()
}

/// Drop the `script:<line>: ` prefix Lua puts on string errors.
fn strip_location(message: &str) -> &str {
  let message = strip_traceback(message);
  let name = CHUNK_NAME.trim_start_matches('=');

  let Some(rest) = message.strip_prefix(name).and_then(|r| r.strip_prefix(':')) else {
    return message;
  };
  match rest.split_once(": ") {
    Some((line, text)) if !line.is_empty() && line.chars().all(|c| c.is_ascii_digit()) => text,
    _ => message,
  }
}
