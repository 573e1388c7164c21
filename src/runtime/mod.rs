//! Engine boundary for the test harness
//!
//! This module wraps the external WebAssembly engine and exposes the
//! operations a spec test script performs: loading modules, instantiating
//! them against registered import namespaces, and running exported actions.
//! Every engine failure is classified into exactly one [`Failure`] tag so
//! that the assertion engine can pattern-match on it.

pub mod engine;
pub mod harness;
pub mod host;
pub mod registry;
pub mod value;

pub use engine::{CompiledModule, Instance};
pub use harness::Harness;
pub use host::{HostRef, HostRefs, HostState};
pub use registry::{Bindings, Registry};
pub use value::Value;

use std::fmt;

/// The category of a classified engine failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Validation,
    Link,
    Trap,
    UncaughtException,
    ResourceExhaustion,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Validation => "validation failure",
            FailureKind::Link => "link failure",
            FailureKind::Trap => "trap",
            FailureKind::UncaughtException => "uncaught exception",
            FailureKind::ResourceExhaustion => "resource exhaustion",
        };
        f.write_str(name)
    }
}

/// A classified outcome of a load, instantiate or invoke operation that did
/// not succeed. Exactly one variant applies per failed operation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Failure {
    #[error("validation failure: {0}")]
    Validation(String),
    #[error("link failure: {0}")]
    Link(String),
    #[error("trap: {0}")]
    Trap(String),
    #[error("uncaught exception: {0}")]
    UncaughtException(String),
    #[error("resource exhaustion: {0}")]
    ResourceExhaustion(String),
}

impl Failure {
    /// The category of this failure.
    pub fn kind(&self) -> FailureKind {
        match self {
            Failure::Validation(_) => FailureKind::Validation,
            Failure::Link(_) => FailureKind::Link,
            Failure::Trap(_) => FailureKind::Trap,
            Failure::UncaughtException(_) => FailureKind::UncaughtException,
            Failure::ResourceExhaustion(_) => FailureKind::ResourceExhaustion,
        }
    }

    /// The engine's message for this failure.
    pub fn message(&self) -> &str {
        match self {
            Failure::Validation(m)
            | Failure::Link(m)
            | Failure::Trap(m)
            | Failure::UncaughtException(m)
            | Failure::ResourceExhaustion(m) => m,
        }
    }
}

/// Errors returned by harness operations.
///
/// [`HarnessError::Failure`] carries a classified engine outcome that an
/// assertion may expect; every other variant is a harness-level error.
/// [`HarnessError::Internal`] is always fatal.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error(transparent)]
    Failure(#[from] Failure),
    #[error("{assertion} failed: expected {expected}, got {actual}")]
    Assertion {
        assertion: &'static str,
        expected: String,
        actual: String,
    },
    #[error("module was expected to be invalid, but validated OK")]
    UnexpectedValidity,
    #[error("Unknown export: {0}")]
    UnknownExport(String),
    #[error("Export {0} is neither a function nor a global")]
    NotCallable(String),
    #[error("Arity mismatch calling {name}: expected {expected} argument(s), got {actual}")]
    ArityMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("Argument {index} of {name}: expected {expected}, got {actual}")]
    ArgumentType {
        name: String,
        index: usize,
        expected: String,
        actual: String,
    },
    #[error("Invalid byte literal: {0}")]
    Literal(#[from] crate::literal::LiteralError),
    #[error("Internal harness error: {0}")]
    Internal(String),
}

impl HarnessError {
    /// The classified failure carried by this error, if any.
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            HarnessError::Failure(failure) => Some(failure),
            _ => None,
        }
    }

    /// Whether this error must abort the surrounding script.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HarnessError::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_kind_matches_variant() {
        assert_eq!(Failure::Trap("unreachable".into()).kind(), FailureKind::Trap);
        assert_eq!(Failure::Link("unknown import".into()).kind(), FailureKind::Link);
        assert_eq!(
            Failure::ResourceExhaustion("call stack exhausted".into()).kind(),
            FailureKind::ResourceExhaustion
        );
    }

    #[test]
    fn harness_error_exposes_failure() {
        let err = HarnessError::from(Failure::Validation("type mismatch".into()));
        assert_eq!(err.failure().map(Failure::kind), Some(FailureKind::Validation));
        assert_eq!(err.to_string(), "validation failure: type mismatch");
        assert!(!err.is_fatal());
        assert!(HarnessError::Internal("boom".into()).is_fatal());
    }

    #[test]
    fn argument_type_is_not_a_failure() {
        let err = HarnessError::ArgumentType {
            name: "fac".into(),
            index: 0,
            expected: "i64".into(),
            actual: "i32".into(),
        };
        assert!(err.failure().is_none());
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "Argument 0 of fac: expected i64, got i32");
    }
}
