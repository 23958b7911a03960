//! In-memory users, accepted connections and device tokens.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::domain::ports::{
    DeviceTokenRepository, DeviceTokenRepositoryError, RelationshipDirectory,
    RelationshipDirectoryError,
};
use crate::domain::UserId;

#[derive(Default)]
struct Graph {
    users: HashMap<UserId, Profile>,
    connections: HashSet<(UserId, UserId)>,
}

#[derive(Default, Clone)]
struct Profile {
    display_name: Option<String>,
    device_token: Option<String>,
}

/// Directory seeded by the caller.
///
/// Implements both [`RelationshipDirectory`] and [`DeviceTokenRepository`]
/// because the platform stores device tokens on the user record.
#[derive(Default)]
pub struct InMemoryDirectory {
    graph: RwLock<Graph>,
}

impl InMemoryDirectory {
    /// Empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or rename a user.
    pub fn add_user(&self, user: UserId, display_name: Option<&str>) {
        if let Ok(mut graph) = self.graph.write() {
            graph.users.entry(user).or_default().display_name = display_name.map(str::to_owned);
        }
    }

    /// Record an accepted connection between two existing users.
    pub fn connect(&self, a: UserId, b: UserId) {
        if let Ok(mut graph) = self.graph.write() {
            graph.connections.insert(ordered(a, b));
        }
    }

    /// Register a device token for push fallback.
    pub fn set_device_token(&self, user: UserId, token: impl Into<String>) {
        if let Ok(mut graph) = self.graph.write() {
            graph.users.entry(user).or_default().device_token = Some(token.into());
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Graph>, String> {
        self.graph
            .read()
            .map_err(|_| "directory lock poisoned".to_owned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Graph>, String> {
        self.graph
            .write()
            .map_err(|_| "directory lock poisoned".to_owned())
    }
}

fn ordered(a: UserId, b: UserId) -> (UserId, UserId) {
    if a <= b { (a, b) } else { (b, a) }
}

#[async_trait]
impl RelationshipDirectory for InMemoryDirectory {
    async fn user_exists(&self, user: &UserId) -> Result<bool, RelationshipDirectoryError> {
        let graph = self.read().map_err(RelationshipDirectoryError::connection)?;
        Ok(graph.users.contains_key(user))
    }

    async fn are_connected(
        &self,
        a: &UserId,
        b: &UserId,
    ) -> Result<bool, RelationshipDirectoryError> {
        let graph = self.read().map_err(RelationshipDirectoryError::connection)?;
        Ok(graph.connections.contains(&ordered(*a, *b)))
    }

    async fn display_name(
        &self,
        user: &UserId,
    ) -> Result<Option<String>, RelationshipDirectoryError> {
        let graph = self.read().map_err(RelationshipDirectoryError::connection)?;
        Ok(graph
            .users
            .get(user)
            .and_then(|profile| profile.display_name.clone()))
    }
}

#[async_trait]
impl DeviceTokenRepository for InMemoryDirectory {
    async fn device_token(
        &self,
        user: &UserId,
    ) -> Result<Option<String>, DeviceTokenRepositoryError> {
        let graph = self.read().map_err(DeviceTokenRepositoryError::connection)?;
        Ok(graph
            .users
            .get(user)
            .and_then(|profile| profile.device_token.clone()))
    }

    async fn clear_device_token(&self, user: &UserId) -> Result<(), DeviceTokenRepositoryError> {
        let mut graph = self.write().map_err(DeviceTokenRepositoryError::connection)?;
        if let Some(profile) = graph.users.get_mut(user) {
            profile.device_token = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[tokio::test]
    async fn connections_are_symmetric() {
        let directory = InMemoryDirectory::new();
        let (a, b) = (UserId::random(), UserId::random());
        directory.add_user(a, Some("Ada"));
        directory.add_user(b, None);
        directory.connect(b, a);

        assert!(directory.are_connected(&a, &b).await.expect("lookup"));
        assert!(directory.are_connected(&b, &a).await.expect("lookup"));
        assert!(!directory
            .are_connected(&a, &UserId::random())
            .await
            .expect("lookup"));
    }

    #[rstest]
    #[tokio::test]
    async fn display_names_and_existence() {
        let directory = InMemoryDirectory::new();
        let ada = UserId::random();
        directory.add_user(ada, Some("Ada"));

        assert!(directory.user_exists(&ada).await.expect("lookup"));
        assert!(!directory.user_exists(&UserId::random()).await.expect("lookup"));
        assert_eq!(
            directory.display_name(&ada).await.expect("lookup").as_deref(),
            Some("Ada")
        );
    }

    #[rstest]
    #[tokio::test]
    async fn cleared_token_is_gone() {
        let directory = InMemoryDirectory::new();
        let user = UserId::random();
        directory.add_user(user, None);
        directory.set_device_token(user, "device-1");
        assert_eq!(
            directory.device_token(&user).await.expect("lookup").as_deref(),
            Some("device-1")
        );

        directory.clear_device_token(&user).await.expect("cleared");
        assert_eq!(directory.device_token(&user).await.expect("lookup"), None);
    }
}
