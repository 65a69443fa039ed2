//! Error types
//!
//! `ClusterError` is what synchronizers, the consumer and the controller
//! return. Connection and persistence failures that the contract reports as
//! booleans never surface here.

use std::fmt;
use std::time::Duration;

use crate::bus::BusError;
use crate::catalog::CatalogError;
use crate::config::ConfigError;

/// Errors raised while replicating catalog and configuration changes
#[derive(Debug)]
pub enum ClusterError {
    /// The event handed to a synchronizer is missing or incomplete
    InvalidArgument(String),
    /// The payload does not decode to a known event shape
    MalformedPayload(String),
    /// The event wraps an entity type outside the known dispatch set
    UnsupportedEntityKind(String),
    /// A cross-reference could not be resolved against the local catalog
    UnresolvedReference { kind: &'static str, name: String },
    /// The local domain store rejected the operation
    Catalog(CatalogError),
    /// A bounded operation did not complete in time
    Timeout(Duration),
    /// IO error (connection or persistence)
    Io(std::io::Error),
    /// Configuration error
    Config(ConfigError),
    /// Message bus error
    Bus(BusError),
}

impl fmt::Display for ClusterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            ClusterError::MalformedPayload(msg) => write!(f, "Malformed payload: {}", msg),
            ClusterError::UnsupportedEntityKind(kind) => {
                write!(f, "Unsupported entity kind: {}", kind)
            }
            ClusterError::UnresolvedReference { kind, name } => {
                write!(f, "Unable to resolve {} '{}' in the local catalog", kind, name)
            }
            ClusterError::Catalog(e) => write!(f, "Catalog error: {}", e),
            ClusterError::Timeout(d) => write!(f, "Operation timed out after {:?}", d),
            ClusterError::Io(e) => write!(f, "IO error: {}", e),
            ClusterError::Config(e) => write!(f, "Config error: {}", e),
            ClusterError::Bus(e) => write!(f, "Bus error: {}", e),
        }
    }
}

impl std::error::Error for ClusterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClusterError::Catalog(e) => Some(e),
            ClusterError::Io(e) => Some(e),
            ClusterError::Config(e) => Some(e),
            ClusterError::Bus(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CatalogError> for ClusterError {
    fn from(e: CatalogError) -> Self {
        ClusterError::Catalog(e)
    }
}

impl From<std::io::Error> for ClusterError {
    fn from(e: std::io::Error) -> Self {
        ClusterError::Io(e)
    }
}

impl From<ConfigError> for ClusterError {
    fn from(e: ConfigError) -> Self {
        ClusterError::Config(e)
    }
}

impl From<BusError> for ClusterError {
    fn from(e: BusError) -> Self {
        ClusterError::Bus(e)
    }
}

impl From<serde_json::Error> for ClusterError {
    fn from(e: serde_json::Error) -> Self {
        ClusterError::MalformedPayload(e.to_string())
    }
}

/// Result type for replication operations
pub type Result<T> = std::result::Result<T, ClusterError>;
