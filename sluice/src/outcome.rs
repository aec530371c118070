use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

use crate::error::ErrorKind;

/// Why one item did not produce a value.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ItemFailure {
    /// Index of the failed item.
    pub index: u64,
    /// Rendered error chain or panic payload.
    pub message: String,
    /// The item function panicked rather than returning an error.
    pub panicked: bool,
}

impl ItemFailure {
    pub fn new(index: u64, message: impl Into<String>) -> Self {
        Self {
            index,
            message: message.into(),
            panicked: false,
        }
    }

    pub(crate) fn from_error(index: u64, err: &anyhow::Error) -> Self {
        Self::new(index, format!("{err:#}"))
    }

    pub(crate) fn from_panic(index: u64, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "item panicked".to_string()
        };
        Self {
            index,
            message,
            panicked: true,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ItemFailure
    }
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.panicked {
            write!(f, "item {} panicked: {}", self.index, self.message)
        } else {
            write!(f, "item {} failed: {}", self.index, self.message)
        }
    }
}

/// The result of executing one item. Exactly one is recorded per index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Outcome<T> {
    Success(T),
    Failure(ItemFailure),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Success(v) => Some(v),
            Self::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&ItemFailure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(f) => Some(f),
        }
    }

    /// Label used for logs and metrics.
    pub fn status_str(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Failure(f) if f.panicked => "panicked",
            Self::Failure(_) => "failure",
        }
    }

    pub fn into_result(self) -> Result<T, ItemFailure> {
        match self {
            Self::Success(v) => Ok(v),
            Self::Failure(f) => Err(f),
        }
    }
}

impl<T> From<Result<T, ItemFailure>> for Outcome<T> {
    fn from(result: Result<T, ItemFailure>) -> Self {
        match result {
            Ok(v) => Self::Success(v),
            Err(f) => Self::Failure(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_failure_keeps_error_chain() {
        let err = Err::<(), _>(anyhow::anyhow!("connection reset"))
            .context("fetch https://example.invalid/")
            .unwrap_err();
        let failure = ItemFailure::from_error(4, &err);
        assert_eq!(failure.index, 4);
        assert_eq!(
            failure.message,
            "fetch https://example.invalid/: connection reset"
        );
        assert!(!failure.panicked);
    }

    #[test]
    fn test_failure_from_panic_payload() {
        let failure = ItemFailure::from_panic(1, Box::new("boom"));
        assert!(failure.panicked);
        assert_eq!(failure.to_string(), "item 1 panicked: boom");

        let failure = ItemFailure::from_panic(2, Box::new(String::from("owned boom")));
        assert_eq!(failure.message, "owned boom");

        let failure = ItemFailure::from_panic(3, Box::new(42u32));
        assert_eq!(failure.message, "item panicked");
    }

    #[test]
    fn test_outcome_accessors() {
        let ok: Outcome<u32> = Outcome::Success(9);
        assert!(ok.is_success());
        assert_eq!(ok.value(), Some(&9));
        assert_eq!(ok.status_str(), "success");

        let failed: Outcome<u32> = Outcome::Failure(ItemFailure::new(0, "nope"));
        assert!(failed.is_failure());
        assert_eq!(failed.failure().map(|f| f.index), Some(0));
        assert_eq!(failed.status_str(), "failure");
        assert!(failed.into_result().is_err());
    }
}
