//! Typed error enum for analysis, weaving, and runtime failures.
//!
//! Replaces generic `Result<T, String>` with one typed enum so each
//! boundary (analyzer query, weave abort, strand-local runtime fault, API
//! misuse) is distinguishable by the caller.

use std::error::Error as StdError;
use std::fmt;

/// Typed error for every fallible operation in the crate.
#[derive(Debug, Clone, PartialEq)]
pub enum WeftError {
    // Analysis errors
    /// A suspendability fact was queried for a signature the analysis never
    /// saw. Caller bug, non-recoverable.
    UnknownMethod {
        method: String,
    },

    // Weaving errors; all abort the current procedure's rewrite
    /// Recomputed frames disagree with the expected type discipline.
    FrameMismatch {
        at: usize,
        message: String,
    },
    /// The input procedure violates a structural invariant (dangling label,
    /// call/frame inconsistency, malformed monitor region).
    InvalidProcedure {
        message: String,
    },

    // Runtime errors, local to one strand
    StackUnderflow {
        at: usize,
    },
    KindMismatch {
        expected: String,
        got: String,
    },
    NullReference {
        at: usize,
    },
    DivisionByZero,
    UndefinedField {
        name: String,
    },
    /// A continuation-stack lane was popped past what was saved; the
    /// saved state and the restore path disagree.
    LaneUnderflow {
        lane: &'static str,
    },
    /// A `throw` op executed with no handler in the chain.
    UserThrow {
        message: String,
    },

    // Lifecycle / API misuse
    AlreadyStarted,
    ResumeAfterDone,
    /// A restore pass finished without any primitive consuming the resume
    /// token, so saved state would be silently dropped.
    LostRestore,

    // Generic fallback
    Generic {
        message: String,
    },
}

impl WeftError {
    pub fn unknown_method(method: impl Into<String>) -> Self {
        WeftError::UnknownMethod {
            method: method.into(),
        }
    }

    pub fn frame_mismatch(at: usize, message: impl Into<String>) -> Self {
        WeftError::FrameMismatch {
            at,
            message: message.into(),
        }
    }

    pub fn invalid_procedure(message: impl Into<String>) -> Self {
        WeftError::InvalidProcedure {
            message: message.into(),
        }
    }

    pub fn kind_mismatch(expected: impl Into<String>, got: impl Into<String>) -> Self {
        WeftError::KindMismatch {
            expected: expected.into(),
            got: got.into(),
        }
    }

    pub fn user_throw(message: impl Into<String>) -> Self {
        WeftError::UserThrow {
            message: message.into(),
        }
    }

    /// Get a human-readable description of the error.
    pub fn description(&self) -> String {
        match self {
            WeftError::UnknownMethod { method } => {
                format!("Analysis error: no suspendability fact for {}", method)
            }
            WeftError::FrameMismatch { at, message } => {
                format!("Weave error: frame mismatch at op {}: {}", at, message)
            }
            WeftError::InvalidProcedure { message } => {
                format!("Weave error: invalid procedure: {}", message)
            }
            WeftError::StackUnderflow { at } => {
                format!("Runtime error: operand stack underflow at op {}", at)
            }
            WeftError::KindMismatch { expected, got } => {
                format!("Runtime error: expected {}, got {}", expected, got)
            }
            WeftError::NullReference { at } => {
                format!("Runtime error: null reference at op {}", at)
            }
            WeftError::DivisionByZero => "Runtime error: division by zero".to_string(),
            WeftError::UndefinedField { name } => {
                format!("Runtime error: undefined field '{}'", name)
            }
            WeftError::LaneUnderflow { lane } => {
                format!("Continuation error: {} lane underflow", lane)
            }
            WeftError::UserThrow { message } => format!("Uncaught throw: {}", message),
            WeftError::AlreadyStarted => "Strand error: already started".to_string(),
            WeftError::ResumeAfterDone => {
                "Continuation error: resume() after completion".to_string()
            }
            WeftError::LostRestore => {
                "Continuation error: restore pass consumed by no primitive".to_string()
            }
            WeftError::Generic { message } => format!("Error: {}", message),
        }
    }
}

impl fmt::Display for WeftError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl StdError for WeftError {}

impl From<String> for WeftError {
    fn from(msg: String) -> Self {
        WeftError::Generic { message: msg }
    }
}

impl From<&str> for WeftError {
    fn from(msg: &str) -> Self {
        WeftError::Generic {
            message: msg.to_string(),
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, WeftError>;
