//! Pure, deterministic logic: value encoding, output decoding, error matching.

pub mod args;
pub mod decode;
pub mod retryable;
pub mod value;
