//! Persistence error type

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl From<scylla::transport::errors::NewSessionError> for PersistenceError {
    fn from(err: scylla::transport::errors::NewSessionError) -> Self {
        PersistenceError::ConnectionError(err.to_string())
    }
}

impl From<scylla::transport::errors::QueryError> for PersistenceError {
    fn from(err: scylla::transport::errors::QueryError) -> Self {
        PersistenceError::QueryError(err.to_string())
    }
}

impl From<PersistenceError> for coach_core::Error {
    fn from(err: PersistenceError) -> Self {
        coach_core::Error::Persistence(err.to_string())
    }
}
