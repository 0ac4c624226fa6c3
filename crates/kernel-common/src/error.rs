//! Error types for the cycle kernel.

use thiserror::Error;

/// Kernel error types covering configuration and cycle work failures.
///
/// Telemetry recording never produces one of these; only construction
/// and the work phases driven by the kernel loop can fail.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KernelError {
    /// Configuration or initialization error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A maintenance or production phase reported a failure.
    #[error("cycle work failed during {phase}: {reason}")]
    Work {
        /// Phase that failed ("maintenance" or "production").
        phase: &'static str,
        /// Failure description from the work implementation.
        reason: String,
    },
}

impl KernelError {
    /// Build a work failure for the maintenance phase.
    pub fn maintenance(reason: impl Into<String>) -> Self {
        Self::Work {
            phase: "maintenance",
            reason: reason.into(),
        }
    }

    /// Build a work failure for the production phase.
    pub fn production(reason: impl Into<String>) -> Self {
        Self::Work {
            phase: "production",
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;
