//! Side-effecting parts: processes, retries, terraform commands.

pub mod agent;
pub mod output;
pub mod process;
pub mod retry;
pub mod terraform;
