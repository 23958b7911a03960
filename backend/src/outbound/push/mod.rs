//! Push notification adapters.

mod http;

pub use http::{HttpPushNotifier, PushEndpoint};
