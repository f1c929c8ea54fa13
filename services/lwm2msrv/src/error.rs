//! Error handling for the LwM2M Modbus adapter
//!
//! Startup errors (`ConfigError`, `ConnectionError`) abort the process.
//! Everything else belongs to a single read or write and is turned into an
//! internal-error response by the translator.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum Lwm2mSrvError {
    /// Mapping file missing, malformed or semantically invalid
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Transport could not be opened at startup
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// A Modbus request failed (transport fault or exception response)
    #[error("Operation error: {0}")]
    OperationError(String),

    /// No response within the response timeout
    #[error("Timeout error: {0}")]
    TimeoutError(String),

    #[error("IO error: {0}")]
    IoError(String),
}

pub type Result<T> = std::result::Result<T, Lwm2mSrvError>;

impl Lwm2mSrvError {
    pub fn config(msg: impl Into<String>) -> Self {
        Lwm2mSrvError::ConfigError(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Lwm2mSrvError::ConnectionError(msg.into())
    }

    pub fn operation(msg: impl Into<String>) -> Self {
        Lwm2mSrvError::OperationError(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Lwm2mSrvError::TimeoutError(msg.into())
    }

    /// True for errors that must stop the service during startup
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Lwm2mSrvError::ConfigError(_) | Lwm2mSrvError::ConnectionError(_)
        )
    }
}

impl From<std::io::Error> for Lwm2mSrvError {
    fn from(err: std::io::Error) -> Self {
        Lwm2mSrvError::IoError(err.to_string())
    }
}
