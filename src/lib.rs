pub mod auth;
pub mod cache;
pub mod error;
pub mod media;
pub mod models;
pub mod openapi;
pub mod repo;
pub mod routes;
pub mod storage;

// Re-export commonly used items for tests / external users
pub use cache::CategoryCache;
pub use repo::CategoryStore;
pub use routes::{config, AppState};
