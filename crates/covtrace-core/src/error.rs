use std::collections::TryReserveError;
use std::error::Error as StdError;

use thiserror::Error;

/// Failure raised by a [`ShouldTrace`](crate::ShouldTrace) implementation.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DecisionError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl DecisionError {
    /// Create an error with a message only.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create an error wrapping an underlying cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// The error message, without the source chain.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Tracer-level faults.
///
/// These are always distinct from errors raised by the monitored program
/// itself: the host should surface them as tracing failures and stop the
/// tracer.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("should-trace decision failed for unit `{unit}`")]
    Decision {
        unit: Box<str>,
        #[source]
        source: DecisionError,
    },

    #[error("failed to grow the depth stack past {depth} frames")]
    StackAlloc {
        depth: usize,
        #[source]
        source: TryReserveError,
    },

    #[error("tracer is poisoned by an earlier decision failure; stop it before reuse")]
    Poisoned,

    #[error("step hook re-entered while it was handling an event")]
    Reentrant,
}

pub type Result<T> = std::result::Result<T, TraceError>;
