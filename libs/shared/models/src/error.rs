use serde::{Deserialize, Serialize};
use std::fmt;

/// Error taxonomy shared by every cell. Each cell keeps its own error enum
/// and maps its variants onto one of these kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input, fixable by the caller.
    Validation,
    /// A business rule rejected the operation.
    RuleViolation,
    /// A referenced record does not exist or is inactive.
    NotFound,
    /// A collaborator (store, directory, dispatcher) failed.
    Infrastructure,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Infrastructure)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::RuleViolation => write!(f, "rule_violation"),
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::Infrastructure => write!(f, "infrastructure"),
        }
    }
}
