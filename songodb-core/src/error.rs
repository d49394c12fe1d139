// src/error.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SongoError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    #[error("Cannot apply {operator} to a value of non-numeric type at '{path}'")]
    TypeMismatch { operator: &'static str, path: String },

    #[error("Unknown modifier: {0}")]
    UnknownModifier(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Who is at fault for an error: the caller's input or the engine/backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Client,
    Internal,
}

impl SongoError {
    pub fn class(&self) -> ErrorClass {
        match self {
            SongoError::InvalidArgument(_) | SongoError::InvalidNamespace(_) => ErrorClass::Client,
            _ => ErrorClass::Internal,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.class() == ErrorClass::Client
    }

    /// Stable machine-readable code, e.g. `"InvalidNamespace"`
    pub fn code(&self) -> &'static str {
        match self {
            SongoError::InvalidArgument(_) => "InvalidArgument",
            SongoError::InvalidNamespace(_) => "InvalidNamespace",
            SongoError::TypeMismatch { .. } => "TypeMismatch",
            SongoError::UnknownModifier(_) => "UnknownModifier",
            SongoError::Storage(_) | SongoError::Io(_) => "StorageFailure",
            SongoError::Serialization(_) => "SerializationFailure",
            SongoError::Config(_) => "ConfigError",
        }
    }
}

pub type Result<T> = std::result::Result<T, SongoError>;
