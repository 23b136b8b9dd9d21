//! Stable exit codes.
//!
//! Callers that drive control flow off exit codes (plan change detection, the CLI)
//! use these rather than inspecting errors.

/// The command succeeded.
pub const DEFAULT_SUCCESS_EXIT_CODE: i32 = 0;
/// The command failed, or its exit code could not be determined.
pub const DEFAULT_ERROR_EXIT_CODE: i32 = 1;
/// `plan -detailed-exitcode` succeeded and found changes to apply.
pub const PLAN_CHANGES_PRESENT: i32 = 2;
