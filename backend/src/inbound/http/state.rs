//! Shared HTTP adapter state.
//!
//! Handlers accept this state via `actix_web::web::Data` so they only depend
//! on domain services and stay testable without I/O.

use std::sync::Arc;

use crate::domain::ports::MessageSync;
use crate::domain::{AuthenticationService, Gateway};

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    /// Bearer credential verification.
    pub auth: AuthenticationService,
    /// Reconnection catch-up.
    pub sync: Arc<dyn MessageSync>,
    /// Gateway, used for the health report.
    pub gateway: Arc<Gateway>,
}

impl HttpState {
    /// Construct state from its parts.
    pub fn new(auth: AuthenticationService, sync: Arc<dyn MessageSync>, gateway: Arc<Gateway>) -> Self {
        Self { auth, sync, gateway }
    }
}
