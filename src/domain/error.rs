//! Error taxonomy for the retrieval engine.
//!
//! Every fallible operation in the engine returns this single [`Error`] enum.
//! The variants correspond 1:1 to the error kinds the operator surface must
//! be able to report (`error_type` in the `{ok, result|error, error_type}`
//! envelope): `Validation`, `NotFound`, `Degraded`, `CircuitOpen`,
//! `Cancelled`, `LockContention`, `Cooldown`, `Transient`, `Corruption`, and
//! `Internal`.

use thiserror::Error;

/// Result type alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the retrieval engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input: unknown filter key, out-of-range score, bad
    /// identifier charset. Never retried.
    #[error("validation error: {message}")]
    Validation {
        /// Description of what failed validation.
        message: String,
    },

    /// Identifier absent from the `UnitStore`.
    #[error("not found: {resource}")]
    NotFound {
        /// The resource that was not found.
        resource: String,
    },

    /// A backend circuit is open; retrieval can still proceed with reduced
    /// strategies.
    #[error("degraded: {message}")]
    Degraded {
        /// Human-readable description of the degradation.
        message: String,
    },

    /// A specific component is temporarily unavailable.
    #[error("circuit open: {component}")]
    CircuitOpen {
        /// Name of the component whose circuit is open.
        component: String,
    },

    /// Deadline exceeded before the operation completed.
    #[error("cancelled: {reason}")]
    Cancelled {
        /// Why the operation was cancelled.
        reason: String,
    },

    /// The pipeline lock is held by another process.
    #[error("lock contention: held by {holder} since {since}")]
    LockContention {
        /// Identifier of the current lock holder.
        holder: String,
        /// ISO-8601 timestamp the lock was acquired.
        since: String,
    },

    /// A full-pipeline run was requested before the cooldown elapsed.
    #[error("cooldown: {remaining_secs}s remaining")]
    Cooldown {
        /// Seconds remaining before another full run is permitted.
        remaining_secs: u64,
    },

    /// Retriable I/O error, normally handled internally by
    /// `RetryableProvider` before it escapes to callers.
    #[error("transient error: {message}")]
    Transient {
        /// Description of the transient failure.
        message: String,
    },

    /// Checkpoint/manifest mismatch detected by `IndexValidator`.
    #[error("corruption detected: {message}")]
    Corruption {
        /// Description of the detected corruption.
        message: String,
    },

    /// Unexpected invariant violation. Logged with full context; only an
    /// opaque message crosses the external boundary.
    #[error("internal error: {message}")]
    Internal {
        /// Opaque description safe to surface to external callers.
        message: String,
    },

    /// I/O operation error.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// JSON parsing or serialization error.
    #[error("JSON error: {source}")]
    Json {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },
}

impl Error {
    /// Create a validation error.
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not-found error.
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a degraded error.
    pub fn degraded<S: Into<String>>(message: S) -> Self {
        Self::Degraded {
            message: message.into(),
        }
    }

    /// Create a circuit-open error.
    pub fn circuit_open<S: Into<String>>(component: S) -> Self {
        Self::CircuitOpen {
            component: component.into(),
        }
    }

    /// Create a cancelled error.
    pub fn cancelled<S: Into<String>>(reason: S) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    /// Create a transient error.
    pub fn transient<S: Into<String>>(message: S) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Create a corruption error.
    pub fn corruption<S: Into<String>>(message: S) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable tag used as `error_type` in the operator-tool response envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::NotFound { .. } => "not_found",
            Self::Degraded { .. } => "degraded",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::Cancelled { .. } => "cancelled",
            Self::LockContention { .. } => "lock_contention",
            Self::Cooldown { .. } => "cooldown",
            Self::Transient { .. } => "transient",
            Self::Corruption { .. } => "corruption",
            Self::Internal { .. } => "internal",
            Self::Io { .. } => "internal",
            Self::Json { .. } => "internal",
        }
    }

    /// Whether this error represents a strategy/backend that is temporarily
    /// unavailable and can be retried or downgraded around, as opposed to a
    /// hard failure.
    pub fn is_retryable_or_degradable(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. } | Self::Transient { .. })
    }
}
