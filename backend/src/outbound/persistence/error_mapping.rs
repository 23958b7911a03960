//! Diesel and pool error mapping shared by the repositories.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use tracing::debug;

use super::pool::PoolError;

/// Coarse classification of a Diesel failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DieselFailure {
    /// The connection dropped mid-query.
    Connection,
    /// A foreign key points at a missing row.
    ForeignKey,
    /// A unique index rejected the write.
    Unique,
    /// Anything else.
    Query,
}

/// Classify a Diesel error and log its details at debug level.
pub(crate) fn classify(error: &DieselError) -> DieselFailure {
    match error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), "diesel operation failed");
            match kind {
                DatabaseErrorKind::ClosedConnection => DieselFailure::Connection,
                DatabaseErrorKind::ForeignKeyViolation => DieselFailure::ForeignKey,
                DatabaseErrorKind::UniqueViolation => DieselFailure::Unique,
                _ => DieselFailure::Query,
            }
        }
        other => {
            debug!(error_type = %std::any::type_name_of_val(other), "diesel operation failed");
            DieselFailure::Query
        }
    }
}

/// Map a Diesel error onto a port error's `query`/`connection` constructors.
pub(crate) fn map_basic_diesel_error<E>(
    error: DieselError,
    query: impl Fn(&'static str) -> E,
    connection: impl Fn(&'static str) -> E,
) -> E {
    match classify(&error) {
        DieselFailure::Connection => connection("database connection error"),
        DieselFailure::ForeignKey => query("referenced row does not exist"),
        DieselFailure::Unique => query("duplicate row"),
        DieselFailure::Query => query("database error"),
    }
}

/// Map a pool error onto a port error's `connection` constructor.
pub(crate) fn map_pool_error<E>(error: PoolError, connection: impl FnOnce(String) -> E) -> E {
    connection(error.into_message())
}
