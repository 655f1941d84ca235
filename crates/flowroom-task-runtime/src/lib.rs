//! Runtime abstraction for node scripts.
//!
//! A [`ScriptExecutor`] evaluates one node's source against one input and
//! hands back a JSON value (or nothing). Both the engine and the caller-side
//! worker run scripts through this trait, so the two execution locations
//! stay interchangeable.

mod capabilities;
mod error;
mod executor;

pub use capabilities::Capabilities;
pub use error::ScriptError;
pub use executor::{ScriptExecutor, ScriptOutput};
