//! Error types for the Operative Gate.

use thiserror::Error;

/// Result type alias using the gate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the Operative Gate.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Configuration
    // =========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // =========================================================================
    // Policy
    // =========================================================================
    #[error("Policy load failed for tenant {tenant}: {reason}")]
    PolicyLoad { tenant: String, reason: String },

    #[error("Policy evaluation error: {0}")]
    Policy(String),

    // =========================================================================
    // Audit & Manifest
    // =========================================================================
    #[error("Audit log error: {0}")]
    Audit(String),

    #[error("Audit chain corrupted at {path}:{line}: {reason}")]
    AuditCorrupted {
        path: String,
        line: usize,
        reason: String,
    },

    #[error("Manifest error: {0}")]
    Manifest(String),

    // =========================================================================
    // Wrapped collaborators
    // =========================================================================
    #[error("Agent failed: {0}")]
    Agent(String),

    #[error("Executor failed: {0}")]
    Executor(String),

    // =========================================================================
    // Generic Errors
    // =========================================================================
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a policy evaluation error.
    pub fn policy(msg: impl Into<String>) -> Self {
        Self::Policy(msg.into())
    }

    /// Create an audit error.
    pub fn audit(msg: impl Into<String>) -> Self {
        Self::Audit(msg.into())
    }

    /// Create a manifest error.
    pub fn manifest(msg: impl Into<String>) -> Self {
        Self::Manifest(msg.into())
    }

    /// Create an agent failure.
    pub fn agent(msg: impl Into<String>) -> Self {
        Self::Agent(msg.into())
    }

    /// Create an executor failure.
    pub fn executor(msg: impl Into<String>) -> Self {
        Self::Executor(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable type name of this error, safe to record in the audit trail.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "ConfigError",
            Self::PolicyLoad { .. } => "PolicyLoadError",
            Self::Policy(_) => "PolicyError",
            Self::Audit(_) => "AuditError",
            Self::AuditCorrupted { .. } => "AuditCorrupted",
            Self::Manifest(_) => "ManifestError",
            Self::Agent(_) => "AgentError",
            Self::Executor(_) => "ExecutorError",
            Self::Serialization(_) => "SerializationError",
            Self::Io(_) => "IoError",
            Self::Internal(_) => "InternalError",
            Self::Other(_) => "OtherError",
        }
    }
}
