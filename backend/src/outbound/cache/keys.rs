//! Key layout for gateway state in the shared cache.
//!
//! Every key is prefixed with `gateway:` so the store can be shared with
//! other services.

use crate::domain::{CorrelationId, UserId};

const PREFIX: &str = "gateway";

/// Sorted set of users holding a live connection on any node, scored by the
/// unix time their presence lapses.
pub(crate) fn online_set() -> String {
    format!("{PREFIX}:presence:online_until")
}

/// JSON presence record for one user.
pub(crate) fn presence(user: &UserId) -> String {
    format!("{PREFIX}:presence:user:{user}")
}

/// Fixed-window send counter for one sender.
pub(crate) fn rate(sender: &UserId) -> String {
    format!("{PREFIX}:rate:{sender}")
}

/// Dedup marker for a sender's correlation id.
pub(crate) fn dedup(sender: &UserId, correlation_id: &CorrelationId) -> String {
    format!("{PREFIX}:dedup:{sender}:{}", correlation_id.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn keys_are_namespaced_per_user() {
        let user = UserId::random();
        assert_eq!(presence(&user), format!("gateway:presence:user:{user}"));
        assert_eq!(rate(&user), format!("gateway:rate:{user}"));
        assert!(online_set().starts_with("gateway:"));
    }

    #[rstest]
    fn dedup_key_scopes_correlation_to_sender() {
        let correlation = CorrelationId::new("abc-1").expect("valid correlation id");
        let a = UserId::random();
        let b = UserId::random();
        assert_ne!(dedup(&a, &correlation), dedup(&b, &correlation));
        assert!(dedup(&a, &correlation).ends_with(":abc-1"));
    }
}
