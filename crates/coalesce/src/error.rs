//! Fault types.
//!
//! Triggers return before the operation runs, so a caller of `trigger()` can
//! never see an operation's error. Faults are logged and published on the
//! coalescer's fault channel instead (see [`Coalescer::faults`]).
//!
//! [`Coalescer::faults`]: crate::Coalescer::faults

use std::any::Any;
use std::sync::Arc;

use thiserror::Error;

/// Errors produced while running a coalesced operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoalesceError {
    /// The operation returned `Err`.
    #[error("operation `{operation}` failed: {message}")]
    OperationFailed {
        operation: Arc<str>,
        message: String,
    },

    /// The operation panicked. The panic was caught; the coalescer keeps going.
    #[error("operation `{operation}` panicked: {message}")]
    OperationPanicked {
        operation: Arc<str>,
        message: String,
    },
}

impl CoalesceError {
    pub(crate) fn failed(operation: &Arc<str>, err: &anyhow::Error) -> Self {
        Self::OperationFailed {
            operation: Arc::clone(operation),
            message: format!("{err:#}"),
        }
    }

    pub(crate) fn panicked(operation: &Arc<str>, payload: Box<dyn Any + Send>) -> Self {
        Self::OperationPanicked {
            operation: Arc::clone(operation),
            message: panic_message(payload.as_ref()),
        }
    }

    /// Name of the operation that faulted.
    pub fn operation(&self) -> &str {
        match self {
            Self::OperationFailed { operation, .. } | Self::OperationPanicked { operation, .. } => {
                operation
            }
        }
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, Self::OperationPanicked { .. })
    }
}

/// A fault published on the fault channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    /// 1-based run number within the coalescer's lifetime.
    pub run: u64,
    pub error: CoalesceError,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_keeps_the_error_chain() {
        let name: Arc<str> = Arc::from("flush");
        let err = anyhow::anyhow!("disk full").context("writing snapshot");

        let fault = CoalesceError::failed(&name, &err);

        assert_eq!(fault.operation(), "flush");
        assert!(!fault.is_panic());
        assert_eq!(
            fault.to_string(),
            "operation `flush` failed: writing snapshot: disk full"
        );
    }

    #[test]
    fn panic_payloads_are_rendered() {
        let name: Arc<str> = Arc::from("flush");

        let from_str = CoalesceError::panicked(&name, Box::new("boom"));
        let from_string = CoalesceError::panicked(&name, Box::new(String::from("kaboom")));
        let opaque = CoalesceError::panicked(&name, Box::new(42u8));

        assert!(from_str.is_panic());
        assert_eq!(from_str.to_string(), "operation `flush` panicked: boom");
        assert_eq!(from_string.to_string(), "operation `flush` panicked: kaboom");
        assert_eq!(
            opaque.to_string(),
            "operation `flush` panicked: non-string panic payload"
        );
    }
}
