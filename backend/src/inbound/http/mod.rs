//! HTTP inbound adapter: reconnection sync and health endpoints.

pub mod auth;
pub mod error;
pub mod health;
pub mod state;
pub mod sync;

pub use error::ApiResult;
