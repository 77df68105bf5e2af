/// Database model definitions.
pub mod models;
/// Storage abstraction layer for database operations.
pub mod storage;
/// Collaborator store traits and their implementations.
pub mod store;
