use covtrace_core::TraceError;
use thiserror::Error;

/// Session and tooling errors.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Tracer error: {0}")]
    Trace(#[from] TraceError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Event log line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("Replay failed at event {index}")]
    Replay {
        index: usize,
        #[source]
        source: TraceError,
    },
    #[error("Collector already started")]
    AlreadyStarted,
    #[error("Collector not started")]
    NotStarted,
    #[error("Collector shadowed by one started later on the same host")]
    Shadowed,
    #[error("Collector still running: stop it before {0}")]
    StillRunning(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
