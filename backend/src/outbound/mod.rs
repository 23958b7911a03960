//! Outbound adapters implementing the domain ports.
//!
//! - **auth**: JWT credential verification
//! - **cache**: Redis (and in-process) presence, rate-limit and dedup state
//! - **memory**: in-process message log and directory for database-less runs
//! - **persistence**: PostgreSQL repositories using Diesel
//! - **push**: HTTP push notification delivery
//!
//! Adapters translate between domain types and infrastructure
//! representations. They contain no business logic.

pub mod auth;
pub mod cache;
pub mod memory;
pub mod persistence;
pub mod push;
