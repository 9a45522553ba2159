//! Bridge error taxonomy
//!
//! Every resource and call-bridge operation returns these to its immediate
//! caller; nothing is retried or swallowed.

use crate::term::{atoms, Term};
use nifbridge_config::ConfigError;
use thiserror::Error;

/// Errors produced by resource handles, call contexts and the host model
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BridgeError {
    /// Token does not resolve to a live resource of the expected kind
    #[error("Invalid resource: expected {expected}")]
    Invalid { expected: String },

    /// Resource already released
    #[error("Resource has been deallocated")]
    Deallocated,

    /// Allocation failed while preparing a resource, environment or call context
    #[error("Out of memory while allocating {what}")]
    OutOfMemory { what: &'static str },

    /// Second completion attempt on one call context
    #[error("Call context already completed")]
    AlreadyCompleted,

    /// Target mailbox no longer has a receiver
    #[error("Send failed: mailbox {pid} is closed")]
    SendFailed { pid: u64 },

    /// Resource type could not be opened
    #[error("Resource type '{name}': {reason}")]
    TypeRegistration { name: String, reason: String },

    /// Term handle belongs to another environment or was already taken
    #[error("Stale term reference into environment {env}")]
    StaleTerm { env: u64 },

    /// Managed-side function could not be evaluated
    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    /// Process-wide host has not been initialized
    #[error("Host not initialized")]
    NotInitialized,

    /// Process-wide host was initialized twice
    #[error("Host already initialized")]
    AlreadyInitialized,

    /// Host runtime could not be started
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Configuration could not be loaded or validated
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

impl From<ConfigError> for BridgeError {
    fn from(e: ConfigError) -> Self {
        BridgeError::Config(e.to_string())
    }
}

impl BridgeError {
    /// Short atom naming the error kind, as seen by managed code
    pub fn reason(&self) -> &'static str {
        match self {
            BridgeError::Invalid { .. } => "invalid",
            BridgeError::Deallocated => "deallocated",
            BridgeError::OutOfMemory { .. } => "enomem",
            BridgeError::AlreadyCompleted => "already_completed",
            BridgeError::SendFailed { .. } => "noproc",
            BridgeError::TypeRegistration { .. } => "resource_type",
            BridgeError::StaleTerm { .. } => "stale_term",
            BridgeError::Evaluation(_) => "evaluation",
            BridgeError::NotInitialized => "not_initialized",
            BridgeError::AlreadyInitialized => "already_initialized",
            BridgeError::Runtime(_) => "runtime",
            BridgeError::Config(_) => "config",
        }
    }

    /// Convert to the reply shape managed code receives.
    ///
    /// Allocation failure is the bare `enomem` atom; everything else is
    /// `{error, Message}`.
    pub fn to_term(&self) -> Term {
        match self {
            BridgeError::OutOfMemory { .. } => Term::Atom(atoms::ENOMEM),
            other => Term::error(Term::string(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_memory_is_enomem_atom() {
        let err = BridgeError::OutOfMemory { what: "environment" };
        assert_eq!(err.to_term(), Term::Atom(atoms::ENOMEM));
        assert_eq!(err.reason(), "enomem");
    }

    #[test]
    fn test_error_term_shape() {
        let term = BridgeError::Deallocated.to_term();
        assert_eq!(
            term,
            Term::tuple(vec![
                Term::Atom(atoms::ERROR),
                Term::string("Resource has been deallocated"),
            ])
        );
    }

    #[test]
    fn test_config_error_conversion() {
        let err: BridgeError = ConfigError::HomeNotFound.into();
        assert!(matches!(err, BridgeError::Config(ref msg) if msg.contains("Home")));
    }
}
