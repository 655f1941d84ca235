//! Flowroom Workflow Orchestrator
//!
//! Runs the script nodes of a room's graph. A flow run starts at one node and
//! walks the graph depth-first, feeding each node's result to its children,
//! until every branch has stopped. Runs are bounded by an
//! [`ExecutionBudget`] rather than by visit tracking, so cyclic graphs
//! terminate.
//!
//! Each node is dispatched according to its execution location: `backend`
//! nodes run in this process, `caller` nodes are handed to the canvas client
//! (see [`CallerWorker`]) through a marker in shared state.

mod budget;
mod config;
mod coordinator;
mod dispatcher;
mod error;
mod events;
mod history;
mod worker;

pub use budget::{BudgetStop, ExecutionBudget};
pub use config::{OrchestratorConfig, TraversalPolicy};
pub use coordinator::{FlowOrchestrator, FlowOutcome, SingleNodeOutcome};
pub use dispatcher::LocationDispatcher;
pub use error::{DispatchError, OrchestratorError};
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use history::HistoryRecorder;
pub use worker::CallerWorker;
