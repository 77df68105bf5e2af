mod config;
mod connection;
mod error;
mod models;
pub mod store;

pub use config::MongoConfig;
pub use connection::RetryPolicy;
pub use error::MongoDaoError;
pub use store::MongoStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::VersionConflict {
                key,
                expected_version,
            } => StorageError::Conflict {
                key,
                expected_version,
            },
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
