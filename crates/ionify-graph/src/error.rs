//! Graph store errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    /// Underlying database error.
    #[error("graph database error: {0}")]
    Database(String),

    /// Node (de)serialization failed.
    #[error("graph serialization error: {0}")]
    Serialization(String),

    /// I/O error while opening or flushing the store.
    #[error("graph io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<redb::Error> for GraphError {
    fn from(err: redb::Error) -> Self {
        GraphError::Database(err.to_string())
    }
}

impl From<redb::DatabaseError> for GraphError {
    fn from(err: redb::DatabaseError) -> Self {
        GraphError::Database(err.to_string())
    }
}

impl From<redb::TableError> for GraphError {
    fn from(err: redb::TableError) -> Self {
        GraphError::Database(err.to_string())
    }
}

impl From<redb::TransactionError> for GraphError {
    fn from(err: redb::TransactionError) -> Self {
        GraphError::Database(err.to_string())
    }
}

impl From<redb::StorageError> for GraphError {
    fn from(err: redb::StorageError) -> Self {
        GraphError::Database(err.to_string())
    }
}

impl From<redb::CommitError> for GraphError {
    fn from(err: redb::CommitError) -> Self {
        GraphError::Database(err.to_string())
    }
}

impl From<bincode::Error> for GraphError {
    fn from(err: bincode::Error) -> Self {
        GraphError::Serialization(err.to_string())
    }
}
