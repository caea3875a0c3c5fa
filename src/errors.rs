//! Error types for the impairment service

use thiserror::Error;

/// Errors surfaced to callers of the impairment service.
///
/// The service exposes a deliberately small taxonomy: callers get a
/// human-readable message and one of these kinds, never a structured sub-code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImpairError {
    /// Malformed or out-of-range input, or a well-formed name that does not
    /// currently resolve to an interface.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The state change or the kernel qdisc call failed (including timeouts).
    #[error("Internal error: {0}")]
    Internal(String),

    /// The service has been stopped and no longer accepts calls.
    #[error("Unavailable: {0}")]
    Unavailable(String),
}

impl ImpairError {
    /// Stable, upper-case code used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            ImpairError::InvalidArgument(_) => "INVALID_ARGUMENT",
            ImpairError::Internal(_) => "INTERNAL",
            ImpairError::Unavailable(_) => "UNAVAILABLE",
        }
    }

    /// The message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            ImpairError::InvalidArgument(m)
            | ImpairError::Internal(m)
            | ImpairError::Unavailable(m) => m,
        }
    }
}

/// Failures reported by the kernel-facing collaborators.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Interface not found: {0}")]
    NotFound(String),

    #[error("Netlink session is closed")]
    SessionClosed,

    #[error("Netlink error: {0}")]
    Netlink(#[from] rtnetlink::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ImpairError>;
