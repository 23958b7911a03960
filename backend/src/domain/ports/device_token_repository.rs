//! Port for device push tokens stored alongside user records.

use async_trait::async_trait;

use crate::domain::UserId;

use super::define_port_error;

define_port_error! {
    /// Errors raised by device token adapters.
    pub enum DeviceTokenRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "device token repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "device token repository query failed: {message}",
    }
}

/// Port for reading and invalidating a user's push token.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceTokenRepository: Send + Sync {
    /// Current token, if the user registered a device.
    async fn device_token(&self, user: &UserId)
    -> Result<Option<String>, DeviceTokenRepositoryError>;

    /// Forget the token after the push service rejected it.
    async fn clear_device_token(&self, user: &UserId) -> Result<(), DeviceTokenRepositoryError>;
}
