//! HTTP gateway for flowroom.
//!
//! Exposes single-node and full-flow execution of a room over JSON:
//!
//! - `GET  /api/health`
//! - `POST /api/rooms/{room_id}/nodes/{node_id}/execute`
//! - `POST /api/rooms/{room_id}/flows`

mod error;
mod routes;
mod server;
mod state;

pub use error::GatewayError;
pub use server::{GatewayServer, router};
pub use state::AppState;
