//! Error types for running terraform and reading its results.

use std::process::ExitStatus;

use thiserror::Error;

use crate::io::retry::RetryError;

/// Failure to run a single command.
#[derive(Debug, Error)]
pub enum RunError {
    /// The process never started (binary missing, bad working dir, pipe setup).
    #[error("failed to start {command}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {stream} of {command}")]
    Read {
        command: String,
        stream: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("output reader for {command} panicked")]
    ReaderPanicked { command: String },

    #[error("failed to wait for {command}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran and exited unsuccessfully. Carries everything it printed.
    #[error("{command} exited with {status}")]
    Exit {
        command: String,
        status: ExitStatus,
        output: String,
    },
}

impl RunError {
    /// Combined output captured before the failure, if the process got that far.
    pub fn output(&self) -> Option<&str> {
        match self {
            RunError::Exit { output, .. } => Some(output),
            _ => None,
        }
    }

    /// Exit code of a process that ran to completion.
    ///
    /// `None` when the process never started or was terminated by a signal.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            RunError::Exit { status, .. } => status.code(),
            _ => None,
        }
    }
}

/// Failure to decode terraform's `output -json` document.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("output is not valid JSON")]
    Json(#[from] serde_json::Error),

    #[error("output doesn't contain a value for the key {key:?}")]
    MissingValue { key: String },

    #[error("output value {value} for the key {key:?} is not a {expected}")]
    WrongShape {
        key: String,
        expected: &'static str,
        value: String,
    },
}

/// Errors returned by the terraform driver.
#[derive(Debug, Error)]
pub enum Error {
    /// A command failed in a way that retrying won't fix.
    #[error("{description} failed")]
    Fatal {
        description: String,
        #[source]
        source: RunError,
    },

    /// A command kept failing with a retryable error until the attempts ran out.
    #[error("{description} still failing after {attempts} attempts")]
    RetriesExhausted {
        description: String,
        attempts: u32,
        #[source]
        source: RunError,
    },

    #[error("could not determine exit code")]
    UndeterminableExitCode(#[source] RunError),

    /// The command succeeded but a required output was empty.
    #[error("required output {0} was empty")]
    EmptyOutput(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl Error {
    /// The underlying command failure, if this error came from running a command.
    pub fn run_error(&self) -> Option<&RunError> {
        match self {
            Error::Fatal { source, .. }
            | Error::RetriesExhausted { source, .. }
            | Error::UndeterminableExitCode(source) => Some(source),
            Error::EmptyOutput(_) | Error::Decode(_) => None,
        }
    }
}

impl From<RetryError<RunError>> for Error {
    fn from(err: RetryError<RunError>) -> Self {
        match err {
            RetryError::Fatal {
                description,
                source,
            } => Error::Fatal {
                description,
                source,
            },
            RetryError::Exhausted {
                description,
                attempts,
                source,
            } => Error::RetriesExhausted {
                description,
                attempts,
                source,
            },
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_error_has_no_output_or_exit_code() {
        let err = RunError::Spawn {
            command: "terraform".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(err.output(), None);
        assert_eq!(err.exit_code(), None);
    }

    #[test]
    fn empty_output_names_key() {
        let err = Error::EmptyOutput("vpc_id".into());
        assert_eq!(err.to_string(), "required output vpc_id was empty");
        assert!(err.run_error().is_none());
    }

    #[test]
    fn retry_error_maps_to_distinct_variants() {
        let fatal: Error = RetryError::Fatal {
            description: "apply".into(),
            source: RunError::ReaderPanicked {
                command: "terraform".into(),
            },
        }
        .into();
        assert!(matches!(fatal, Error::Fatal { .. }));

        let exhausted: Error = RetryError::Exhausted {
            description: "apply".into(),
            attempts: 3,
            source: RunError::ReaderPanicked {
                command: "terraform".into(),
            },
        }
        .into();
        assert!(matches!(exhausted, Error::RetriesExhausted { attempts: 3, .. }));
    }
}
