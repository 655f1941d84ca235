//! Flowroom Workflow
//!
//! The graph model for a room. Edges are authored freely on the canvas, so
//! the graph may contain cycles, duplicate edges, and edges pointing at
//! nodes that no longer exist. This crate does not validate any of that;
//! it only answers "who comes after this node", in edge order.

mod graph;

pub use graph::children_of;
