use mongodb::error::Error as MongoError;
use thiserror::Error;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("`{key}` changed since version {expected_version}")]
    VersionConflict { key: String, expected_version: u64 },
    #[error("failed to save room `{code}`")]
    SaveRoom {
        code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load room `{code}`")]
    LoadRoom {
        code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to query rooms")]
    QueryRooms {
        #[source]
        source: MongoError,
    },
    #[error("failed to save scenario `{id}`")]
    SaveScenario {
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load scenario `{id}`")]
    LoadScenario {
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to query scenarios")]
    QueryScenarios {
        #[source]
        source: MongoError,
    },
    #[error("failed to append message to room `{room_code}`")]
    SaveMessage {
        room_code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to query messages of room `{room_code}`")]
    QueryMessages {
        room_code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to look up user `{user_id}`")]
    LoadUser {
        user_id: String,
        #[source]
        source: MongoError,
    },
}
