//! Error shared by the shared-cache ports.
//!
//! Presence, rate-limit and dedup state all live in the same store, so their
//! adapters fail in the same ways and report through one error type.

use super::define_port_error;

define_port_error! {
    /// Errors raised by shared cache adapters.
    pub enum CacheError {
        /// The store could not be reached or a connection could not be taken
        /// from the pool.
        Unavailable { message: String } => "cache unavailable: {message}",
        /// A command was accepted but returned an unexpected reply.
        Protocol { message: String } => "cache protocol error: {message}",
        /// Stored data could not be decoded.
        Serialization { message: String } => "cache serialisation failed: {message}",
    }
}
