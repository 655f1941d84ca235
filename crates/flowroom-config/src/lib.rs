//! Flowroom Config
//!
//! This crate contains the serializable types that make up a room's shared
//! document: the keyed node map, the ordered edge list, and the ordered
//! execution history. The same types are read by the engine, written back
//! with execution results, and rendered by collaborators.
//!
//! All types serialize as camelCase JSON, matching the document schema the
//! collaboration backend stores.

mod document;
mod edge;
mod execution;
mod node;
mod nullable;

pub use document::RoomDocument;
pub use edge::Edge;
pub use execution::{ExecutionRecord, ExecutionStatus, ExecutionUpdate, NodeExecutionResult};
pub use node::{ExecutionLocation, Node};
