//! Harness error taxonomy
//!
//! Every failure bubbles to the scenario boundary unchanged. Nothing here is
//! retried; teardown runs regardless of which variant ends a scenario.

use std::time::Duration;

use thiserror::Error;

use crate::events::EventKind;

/// Errors surfaced by wait primitives, the scenario runner and the
/// reference server/client pair
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("scenario timed out after {0:?}")]
    Timeout(Duration),

    #[error("received {message:?}, expected one of {expected:?}")]
    UnexpectedEvent {
        message: String,
        expected: Vec<String>,
    },

    #[error("received {message:?} two times")]
    DuplicateEvent { message: String },

    #[error("{what}: expected {expected}, got {actual}")]
    AssertionMismatch {
        what: String,
        expected: String,
        actual: String,
    },

    #[error("setup failed: {0}")]
    SetupFailure(String),

    #[error("event source {source_name} closed while waiting for {kind:?}")]
    SourceClosed { source_name: String, kind: EventKind },

    #[error("connection closed: {0}")]
    Disconnected(String),

    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl HarnessError {
    /// Build an `AssertionMismatch` from anything printable
    pub fn mismatch(
        what: impl Into<String>,
        expected: impl std::fmt::Debug,
        actual: impl std::fmt::Debug,
    ) -> Self {
        HarnessError::AssertionMismatch {
            what: what.into(),
            expected: format!("{:?}", expected),
            actual: format!("{:?}", actual),
        }
    }

    /// Re-tag a failure that happened before the scenario body ran
    pub fn into_setup_failure(self, stage: &str) -> Self {
        match self {
            HarnessError::SetupFailure(_) | HarnessError::Timeout(_) => self,
            other => HarnessError::SetupFailure(format!("{}: {}", stage, other)),
        }
    }
}

impl From<figment::Error> for HarnessError {
    fn from(err: figment::Error) -> Self {
        HarnessError::Config(Box::new(err))
    }
}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Compare two values, reporting both sides on mismatch
pub fn expect_eq<T>(what: &str, actual: &T, expected: &T) -> Result<()>
where
    T: PartialEq + std::fmt::Debug,
{
    if actual == expected {
        Ok(())
    } else {
        Err(HarnessError::mismatch(what, expected, actual))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expect_eq_reports_both_sides() {
        assert!(expect_eq("type", &1u16, &1u16).is_ok());

        let err = expect_eq("block type", &0u16, &1u16).unwrap_err();
        match err {
            HarnessError::AssertionMismatch {
                what,
                expected,
                actual,
            } => {
                assert_eq!(what, "block type");
                assert_eq!(expected, "1");
                assert_eq!(actual, "0");
            }
            other => panic!("Expected AssertionMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_setup_failure_keeps_timeouts() {
        let err = HarnessError::Timeout(Duration::from_secs(1)).into_setup_failure("login");
        assert!(matches!(err, HarnessError::Timeout(_)));

        let err = HarnessError::Disconnected("bot".into()).into_setup_failure("login");
        match err {
            HarnessError::SetupFailure(msg) => assert!(msg.starts_with("login: ")),
            other => panic!("Expected SetupFailure, got {:?}", other),
        }
    }
}
