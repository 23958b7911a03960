//! PostgreSQL-backed user directory.
//!
//! Reads the platform's `users` and `user_connections` tables. The only
//! write is clearing a device token the push service rejected.

use async_trait::async_trait;
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::ports::{
    DeviceTokenRepository, DeviceTokenRepositoryError, RelationshipDirectory,
    RelationshipDirectoryError,
};
use crate::domain::UserId;

use super::error_mapping::{map_basic_diesel_error, map_pool_error};
use super::pool::DbPool;
use super::schema::{user_connections, users};

const ACCEPTED: &str = "accepted";

/// Diesel implementation of [`RelationshipDirectory`] and
/// [`DeviceTokenRepository`].
#[derive(Clone)]
pub struct DieselUserDirectory {
    pool: DbPool,
}

impl DieselUserDirectory {
    /// Create a directory over `pool`.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn directory_error(error: diesel::result::Error) -> RelationshipDirectoryError {
    map_basic_diesel_error(
        error,
        RelationshipDirectoryError::query,
        RelationshipDirectoryError::connection,
    )
}

fn token_error(error: diesel::result::Error) -> DeviceTokenRepositoryError {
    map_basic_diesel_error(
        error,
        DeviceTokenRepositoryError::query,
        DeviceTokenRepositoryError::connection,
    )
}

#[async_trait]
impl RelationshipDirectory for DieselUserDirectory {
    async fn user_exists(&self, user: &UserId) -> Result<bool, RelationshipDirectoryError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| map_pool_error(err, RelationshipDirectoryError::connection))?;
        diesel::select(exists(users::table.filter(users::id.eq(user.as_uuid()))))
            .get_result(&mut conn)
            .await
            .map_err(directory_error)
    }

    async fn are_connected(
        &self,
        a: &UserId,
        b: &UserId,
    ) -> Result<bool, RelationshipDirectoryError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| map_pool_error(err, RelationshipDirectoryError::connection))?;
        let (a, b) = (*a.as_uuid(), *b.as_uuid());
        let forward = user_connections::user_id
            .eq(a)
            .and(user_connections::connected_user_id.eq(b));
        let backward = user_connections::user_id
            .eq(b)
            .and(user_connections::connected_user_id.eq(a));
        diesel::select(exists(
            user_connections::table
                .filter(user_connections::status.eq(ACCEPTED))
                .filter(forward.or(backward)),
        ))
        .get_result(&mut conn)
        .await
        .map_err(directory_error)
    }

    async fn display_name(
        &self,
        user: &UserId,
    ) -> Result<Option<String>, RelationshipDirectoryError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| map_pool_error(err, RelationshipDirectoryError::connection))?;
        let name: Option<Option<String>> = users::table
            .filter(users::id.eq(user.as_uuid()))
            .select(users::display_name)
            .first(&mut conn)
            .await
            .optional()
            .map_err(directory_error)?;
        Ok(name.flatten())
    }
}

#[async_trait]
impl DeviceTokenRepository for DieselUserDirectory {
    async fn device_token(
        &self,
        user: &UserId,
    ) -> Result<Option<String>, DeviceTokenRepositoryError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| map_pool_error(err, DeviceTokenRepositoryError::connection))?;
        let token: Option<Option<String>> = users::table
            .filter(users::id.eq(user.as_uuid()))
            .select(users::device_token)
            .first(&mut conn)
            .await
            .optional()
            .map_err(token_error)?;
        Ok(token.flatten().filter(|value| !value.trim().is_empty()))
    }

    async fn clear_device_token(&self, user: &UserId) -> Result<(), DeviceTokenRepositoryError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| map_pool_error(err, DeviceTokenRepositoryError::connection))?;
        diesel::update(users::table.filter(users::id.eq(user.as_uuid())))
            .set(users::device_token.eq(None::<String>))
            .execute(&mut conn)
            .await
            .map_err(token_error)?;
        Ok(())
    }
}
