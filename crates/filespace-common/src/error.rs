//! Error types for the filespace directory
//!
//! This module defines the error taxonomy shared by the record store and
//! the directory cache.

use crate::types::{FilespaceOid, Locator};
use thiserror::Error;

/// Common result type for filespace operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for filespace operations
#[derive(Debug, Error)]
pub enum Error {
    // Directory errors
    #[error("persistent filespace information not set up: {0}")]
    NotInitialized(&'static str),

    #[error("did not find persistent filespace entry {oid}")]
    NotFound { oid: FilespaceOid },

    #[error(
        "location '{value}' is too long (found {} characters, expected no more than {limit} characters)",
        .value.len()
    )]
    InvalidInput { value: String, limit: usize },

    #[error("filespace directory is full (capacity {capacity} entries)")]
    CapacityExceeded { capacity: usize },

    #[error("persistent filespace entry {oid} at {locator} is inconsistent with the store: {detail}")]
    StoreInconsistency {
        oid: FilespaceOid,
        locator: Locator,
        detail: String,
    },

    // Record store errors
    #[error("no persisted record at {locator}")]
    RecordNotFound { locator: Locator },

    #[error("persisted record at {locator} was modified concurrently")]
    ConcurrentModification { locator: Locator },

    #[error("record schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("{source} ({context})")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },

    #[error("disk I/O error: {0}")]
    DiskIo(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(String),

    // Internal errors
    #[error("internal error: {0}")]
    Internal(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),
}

impl Error {
    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Annotate this error with a diagnostic context line
    #[must_use]
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The underlying error with all context frames removed
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Context lines attached to this error, outermost first
    #[must_use]
    pub fn contexts(&self) -> Vec<&str> {
        let mut lines = Vec::new();
        let mut current = self;
        while let Self::Context { context, source } = current {
            lines.push(context.as_str());
            current = source;
        }
        lines
    }

    /// Check if this error indicates a caller sequencing bug that must abort
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self.root(), Self::NotInitialized(_))
    }

    /// Check if this is a not found error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.root(),
            Self::NotFound { .. } | Self::RecordNotFound { .. }
        )
    }

    /// Check if this error was raised by input validation
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        matches!(self.root(), Self::InvalidInput { .. })
    }
}
