//! Process-local adapters used when no database is configured.
//!
//! They keep the same observable behaviour as the PostgreSQL adapters so the
//! gateway can run on a laptop and integration tests can drive full flows
//! without external services.

mod directory;
mod messages;

pub use directory::InMemoryDirectory;
pub use messages::InMemoryMessageRepository;
