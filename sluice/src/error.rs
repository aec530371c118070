use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of everything that can go wrong in a run.
///
/// `ItemFailure` never surfaces as an [`EngineError`]; it is carried inside
/// [`Outcome::Failure`](crate::Outcome::Failure) and aggregated into the
/// [`RunSummary`](crate::RunSummary).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidConfig,
    ItemFailure,
    DuplicateWrite,
    Worker,
}

/// Errors that abort or prevent a run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// Rejected before any work started.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Two outcomes were recorded for the same index. This is a defect in the
    /// partition source, never a recoverable condition.
    #[error("outcome for index {index} was recorded twice")]
    DuplicateWrite { index: u64 },

    /// Outcomes were read before the collector was sealed.
    #[error("result collector read before the run resolved")]
    NotSealed,

    /// A worker task died outside of the item boundary.
    #[error("worker failed: {0}")]
    Worker(String),
}

impl EngineError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::DuplicateWrite { .. } => ErrorKind::DuplicateWrite,
            Self::NotSealed | Self::Worker(_) => ErrorKind::Worker,
        }
    }

    /// Whether this error tears down the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DuplicateWrite { .. } | Self::Worker(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            EngineError::invalid("chunk_hint must be >= 1").kind(),
            ErrorKind::InvalidConfig
        );
        assert_eq!(
            EngineError::DuplicateWrite { index: 3 }.kind(),
            ErrorKind::DuplicateWrite
        );
        assert!(EngineError::DuplicateWrite { index: 3 }.is_fatal());
        assert!(!EngineError::invalid("x").is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = EngineError::DuplicateWrite { index: 7 };
        assert_eq!(err.to_string(), "outcome for index 7 was recorded twice");

        let err = EngineError::invalid("max_concurrency must be >= 1");
        assert_eq!(
            err.to_string(),
            "invalid configuration: max_concurrency must be >= 1"
        );
    }
}
