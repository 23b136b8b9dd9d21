//! Fail-fast form of every fallible operation.
//!
//! Test code that would rather stop than handle an error calls `.or_fail()` on the
//! result. The failure becomes a panic carrying the whole error chain, which fails
//! the current test without taking the process down.

use std::error::Error as StdError;
use std::fmt::Write as _;

pub trait OrFail<T> {
    /// Unwrap the value, or panic with the error and its sources.
    #[track_caller]
    fn or_fail(self) -> T;
}

impl<T, E> OrFail<T> for Result<T, E>
where
    E: StdError,
{
    #[track_caller]
    fn or_fail(self) -> T {
        match self {
            Ok(value) => value,
            Err(err) => panic!("{}", error_chain(&err)),
        }
    }
}

/// `err` followed by each of its sources, `: `-separated.
pub fn error_chain(err: &dyn StdError) -> String {
    let mut buf = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let _ = write!(buf, ": {cause}");
        source = cause.source();
    }
    buf
}
