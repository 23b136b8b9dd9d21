//! Drive the terraform CLI from automated tests.
//!
//! The crate runs terraform commands, streams their output while capturing it,
//! retries known transient failures, and decodes `terraform output` results.
//!
//! - **[`core`]**: Pure logic. Encoding variables as `-var` arguments, matching
//!   output against retryable errors, decoding `output -json` documents.
//! - **[`io`]**: Running processes, the retry loop, and the verb-level
//!   [`Terraform`](io::terraform::Terraform) driver.
//!
//! Every operation returns a [`Result`](error::Result). Tests that would rather
//! stop on the first failure call [`OrFail::or_fail`](must::OrFail::or_fail).

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod must;
pub mod options;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use crate::core::value::{Scalar, Value};
pub use crate::error::{Error, Result};
pub use crate::io::output::{DecodedOutput, OutputShape};
pub use crate::io::terraform::Terraform;
pub use crate::must::OrFail;
pub use crate::options::{Options, load_options};
