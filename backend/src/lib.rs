//! Real-time messaging gateway.
//!
//! Authenticated WebSocket connections, presence, deduplicated and
//! rate-limited direct messages, typing indicators, read receipts, edits and
//! soft deletes, reconnection sync and health reporting.

pub mod doc;
pub mod domain;
pub mod inbound;
pub mod outbound;
pub mod settings;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

/// Public OpenAPI surface used by Swagger UI and tooling.
pub use doc::ApiDoc;
