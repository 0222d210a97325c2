//! Shared data models.

pub mod connection;
pub mod query;

// Re-export commonly used types
pub use connection::{
    ConnectionItem, ConnectionProfile, CreateConnectionRequest, DbType, UpdateConnectionRequest,
};
pub use query::{ExecutionResult, JsonRow, QueryRequest};
