//! Inbound adapters that translate external requests into gateway calls while
//! keeping framework details at the edge.
//!
//! REST handlers live under [`http`]; the WebSocket protocol under [`ws`].

pub mod http;
pub mod ws;
