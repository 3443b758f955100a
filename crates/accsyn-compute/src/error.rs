//! Error types for accsyn-compute.
//!
//! This module defines all error types used throughout the crate, from loading
//! compute data to running render engines and validating media.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for compute engine operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Compute Data Errors ===
    /// The compute data file does not exist or is a directory.
    #[error("compute data not found or is a directory @ '{path}'")]
    DataNotFound {
        /// Path to the compute data file.
        path: PathBuf,
    },

    /// The compute data file could not be parsed.
    #[error("compute data @ '{path}' is invalid: {source}")]
    DataInvalid {
        /// Path to the compute data file.
        path: PathBuf,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Engine Errors ===
    /// No engine is registered under the given name.
    #[error("unknown engine '{0}'")]
    UnknownEngine(String),

    /// The engine cannot run on this operating system.
    #[error("engine '{engine}' is not supported on {os}")]
    UnsupportedOs {
        /// Name of the engine.
        engine: &'static str,
        /// The current operating system.
        os: String,
    },

    /// The application the engine drives is not installed.
    #[error("{engine}: {message}")]
    InstallNotFound {
        /// Name of the engine.
        engine: &'static str,
        /// Description of what was searched for.
        message: String,
    },

    /// The installed application is not the version the engine expects.
    #[error("{engine}: installed version is not {expected}")]
    VersionMismatch {
        /// Name of the engine.
        engine: &'static str,
        /// The expected version.
        expected: String,
    },

    /// A required compute parameter is missing.
    #[error("{engine}: missing parameter '{name}'")]
    MissingParameter {
        /// Name of the engine.
        engine: &'static str,
        /// Name of the missing parameter.
        name: String,
    },

    /// A transcoding profile was not found among the engine profiles.
    #[error("profile '{0}' not found among profiles")]
    UnknownProfile(String),

    /// The item handed to the engine cannot be used.
    #[error("invalid item '{item}': {message}")]
    InvalidItem {
        /// The item as received.
        item: String,
        /// Why it was rejected.
        message: String,
    },

    // === Execution Errors ===
    /// The engine produced an empty command line.
    #[error("empty command line")]
    EmptyCommandLine,

    /// The engine process could not be started.
    #[error("failed to start '{program}': {source}")]
    Spawn {
        /// The program that failed to start.
        program: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The engine process exited unsuccessfully.
    #[error("execution failed with exit code {}, check log for clues", .code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    ExecutionFailed {
        /// Exit code, if the process exited normally.
        code: Option<i32>,
    },

    /// A required network mount is not available.
    #[error("mount not available: {0}")]
    MountUnavailable(PathBuf),

    // === Validation Errors ===
    /// Media validation failed.
    #[error("validation failed: {message}")]
    Validation {
        /// Description of the failure.
        message: String,
    },

    // === Job Errors ===
    /// Only compute jobs can run locally.
    #[error("unsupported job type '{0}'")]
    UnsupportedJobType(String),

    /// The job document is malformed.
    #[error("invalid job: {message}")]
    InvalidJob {
        /// Description of the problem.
        message: String,
    },

    /// One or more tasks of a job failed.
    #[error("{failed} of {total} tasks failed")]
    TaskFailed {
        /// Number of failed tasks.
        failed: usize,
        /// Total number of tasks.
        total: usize,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An XML document could not be parsed.
    #[error("XML error in {path}: {source}")]
    Xml {
        /// Path to the XML document.
        path: PathBuf,
        /// The underlying parse error.
        #[source]
        source: roxmltree::Error,
    },

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for compute engine operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a missing parameter error.
    #[must_use]
    pub fn missing_parameter(engine: &'static str, name: impl Into<String>) -> Self {
        Self::MissingParameter {
            engine,
            name: name.into(),
        }
    }

    /// Create an install not found error.
    #[must_use]
    pub fn install_not_found(engine: &'static str, message: impl Into<String>) -> Self {
        Self::InstallNotFound {
            engine,
            message: message.into(),
        }
    }

    /// Create an invalid item error.
    #[must_use]
    pub fn invalid_item(item: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidItem {
            item: item.into(),
            message: message.into(),
        }
    }

    /// Create a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create an invalid job error.
    #[must_use]
    pub fn invalid_job(message: impl Into<String>) -> Self {
        Self::InvalidJob {
            message: message.into(),
        }
    }

    /// Check if this error means the engine's application is missing.
    #[must_use]
    pub fn is_not_installed(&self) -> bool {
        matches!(
            self,
            Self::InstallNotFound { .. } | Self::VersionMismatch { .. } | Self::UnsupportedOs { .. }
        )
    }

    /// Check if this error came from the engine process itself.
    #[must_use]
    pub fn is_execution_failure(&self) -> bool {
        matches!(self, Self::ExecutionFailed { .. })
    }
}
