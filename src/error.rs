//! Error types for TenantGraph.
//!
//! This module defines the error hierarchy using `thiserror`. Every variant
//! records the source location where it was raised so that failures deep in
//! the collection pipeline can be traced back without a debugger.
//!
//! # Error Categories
//!
//! - **IO errors**: reading resource snapshots and configuration files
//! - **Config errors**: invalid or missing configuration
//! - **Identifier errors**: malformed cloud resource paths
//! - **Store errors**: the batched existence check or edge writes failed
//! - **Cloud errors**: fetches that were throttled, timed out or rejected
//! - **Graph errors**: graph construction and export
//!
//! Extraction never produces an error: rules degrade to an empty target set
//! on malformed property bags.
//!
//! # Example
//!
//! ```rust
//! use tenantgraph::error::{TenantGraphError, Result};
//!
//! fn read_snapshot(path: &str) -> Result<String> {
//!     std::fs::read_to_string(path)
//!         .map_err(|e| TenantGraphError::io(path, e, file!(), line!()))
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Macro to create errors with automatic source location tracking.
///
/// Usage:
/// ```ignore
/// return Err(err!(ConfigMissing { key: "neo4j.uri".to_string() }));
/// ```
#[macro_export]
macro_rules! err {
    ($variant:ident { $($field:ident: $value:expr),* $(,)? }) => {
        $crate::error::TenantGraphError::$variant {
            $($field: $value,)*
            src_path: file!(),
            src_line: line!(),
        }
    };
}

/// A specialized Result type for TenantGraph operations.
pub type Result<T> = std::result::Result<T, TenantGraphError>;

/// The main error type for TenantGraph.
#[derive(Error, Debug)]
pub enum TenantGraphError {
    // =========================================================================
    // I/O and File System Errors
    // =========================================================================
    /// I/O error with path context.
    #[error("I/O error at '{path}' ({src_path}:{src_line}): {source}")]
    Io {
        /// The path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// A resource snapshot could not be decoded.
    #[error("Invalid resource snapshot '{path}' ({src_path}:{src_line}): {message}")]
    Snapshot {
        /// The snapshot file
        path: PathBuf,
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Identifier Errors
    // =========================================================================
    /// A cloud resource identifier could not be parsed.
    #[error("Invalid resource identifier '{resource_id}' ({src_path}:{src_line}): {message}")]
    ResourceIdParse {
        /// The identifier that failed to parse
        resource_id: String,
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Graph Store Errors
    // =========================================================================
    /// The graph store rejected or failed a query.
    #[error("Graph store query failed ({src_path}:{src_line}): {message}")]
    GraphStore {
        /// Error message
        message: String,
        /// HTTP status code (if available)
        status_code: Option<u16>,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// The batched existence check did not answer in time.
    #[error("Graph store existence check timed out after {timeout_secs}s for {id_count} identifiers ({src_path}:{src_line})")]
    StoreTimeout {
        /// Configured timeout
        timeout_secs: u64,
        /// Size of the queried identifier set
        id_count: usize,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// Relation labels are interpolated into queries and must be plain identifiers.
    #[error("Invalid relation label '{relation}' ({src_path}:{src_line})")]
    InvalidRelation {
        /// The rejected label
        relation: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Cloud API Errors
    // =========================================================================
    /// The cloud API asked us to slow down.
    #[error("Cloud API throttled request for '{resource_id}' ({src_path}:{src_line})")]
    Throttled {
        /// The identifier being fetched
        resource_id: String,
        /// Server supplied `Retry-After` in seconds
        retry_after_secs: Option<u64>,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// The cloud API returned a failure status or the transport failed.
    #[error("Cloud API request for '{resource_id}' failed ({src_path}:{src_line}): {message}")]
    CloudApi {
        /// The identifier being fetched
        resource_id: String,
        /// Error message
        message: String,
        /// HTTP status code (if available)
        status_code: Option<u16>,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// A single fetch attempt exceeded its timeout.
    #[error("Fetching '{resource_id}' timed out after {timeout_secs}s ({src_path}:{src_line})")]
    FetchTimeout {
        /// The identifier being fetched
        resource_id: String,
        /// Configured per-attempt timeout
        timeout_secs: u64,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration parsing error.
    #[error("Failed to parse configuration ({src_path}:{src_line}): {message}")]
    ConfigParse {
        /// Error message
        message: String,
        /// The underlying error (if any)
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}' ({src_path}:{src_line}): {message}")]
    ConfigValue {
        /// The configuration key
        key: String,
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// Missing required configuration.
    #[error("Missing required configuration: {key} ({src_path}:{src_line})")]
    ConfigMissing {
        /// The missing configuration key
        key: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Graph Errors
    // =========================================================================
    /// Graph building error.
    #[error("Failed to build relationship graph ({src_path}:{src_line}): {message}")]
    GraphBuild {
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// Report or export generation error.
    #[error("Failed to generate report ({src_path}:{src_line}): {message}")]
    ReportGeneration {
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Generic Errors
    // =========================================================================
    /// Internal error (should not happen in normal operation).
    #[error("Internal error ({src_path}:{src_line}): {message}")]
    Internal {
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// Multiple errors occurred.
    #[error("Multiple errors occurred ({count} total)")]
    Multiple {
        /// Number of errors
        count: usize,
        /// The individual errors
        errors: Vec<TenantGraphError>,
    },
}

impl TenantGraphError {
    /// Creates an `Io` error.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error, src_path: &'static str, src_line: u32) -> Self {
        Self::Io { path: path.into(), source, src_path, src_line }
    }

    /// Creates a `GraphStore` error.
    #[must_use]
    pub fn graph_store(message: String, status_code: Option<u16>, src_path: &'static str, src_line: u32) -> Self {
        Self::GraphStore { message, status_code, src_path, src_line }
    }

    /// Creates a `ConfigParse` error.
    #[must_use]
    pub fn config_parse(message: String, source: Option<Box<dyn std::error::Error + Send + Sync>>, src_path: &'static str, src_line: u32) -> Self {
        Self::ConfigParse { message, source, src_path, src_line }
    }

    /// Creates an `Internal` error.
    #[must_use]
    pub fn internal(message: String, src_path: &'static str, src_line: u32) -> Self {
        Self::Internal { message, src_path, src_line }
    }

    /// Whether a retry of the same request may succeed.
    ///
    /// Throttling, timeouts, transport failures and 5xx responses are
    /// transient. Everything else (including 4xx responses) is permanent.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Throttled { .. } | Self::FetchTimeout { .. } | Self::StoreTimeout { .. } => true,
            Self::CloudApi { status_code, .. } | Self::GraphStore { status_code, .. } => {
                match status_code {
                    None => true,
                    Some(code) => *code >= 500 || *code == 408 || *code == 429,
                }
            }
            _ => false,
        }
    }

    /// Server-requested delay before the next attempt, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            Self::Throttled { retry_after_secs: Some(secs), .. } => {
                Some(std::time::Duration::from_secs(*secs))
            }
            _ => None,
        }
    }

    /// Determines if the caller may retry the whole operation later.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::GraphStore { .. }
                | Self::StoreTimeout { .. }
                | Self::Throttled { .. }
                | Self::CloudApi { .. }
                | Self::FetchTimeout { .. }
                | Self::ConfigParse { .. }
                | Self::ConfigValue { .. }
                | Self::ConfigMissing { .. }
        )
    }

    /// Returns the appropriate exit code for the error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Io { source, .. } if source.kind() == std::io::ErrorKind::PermissionDenied => 13,
            Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound => 14,
            Self::Snapshot { .. } => 15,
            Self::GraphStore { .. } | Self::StoreTimeout { .. } => 16,
            Self::Throttled { .. } | Self::CloudApi { .. } | Self::FetchTimeout { .. } => 17,
            Self::ConfigParse { .. } => 18,
            Self::ConfigValue { .. } => 19,
            Self::ConfigMissing { .. } => 20,
            Self::Multiple { .. } => 21,
            _ => 1,
        }
    }

    /// Consolidates multiple errors into a single `TenantGraphError::Multiple` if there's more than one.
    /// Otherwise, returns the single error or `Ok(())` if no errors.
    pub fn collect(mut errors: Vec<Self>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            count => Err(Self::Multiple { count, errors }),
        }
    }
}

/// Extension trait for `Result` to add context to errors.
pub trait ResultExt<T> {
    /// Adds a file path context to an I/O error.
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| TenantGraphError::Io {
            path: path.into(),
            source,
            src_path: file!(),
            src_line: line!(),
        })
    }
}

impl From<std::io::Error> for TenantGraphError {
    fn from(source: std::io::Error) -> Self {
        // Prefer ResultExt::with_path when the path is known
        Self::Io {
            path: PathBuf::new(),
            source,
            src_path: file!(),
            src_line: line!(),
        }
    }
}

impl From<serde_json::Error> for TenantGraphError {
    fn from(source: serde_json::Error) -> Self {
        Self::Internal {
            message: format!("JSON serialization/deserialization error: {source}"),
            src_path: file!(),
            src_line: line!(),
        }
    }
}
