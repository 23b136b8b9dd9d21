//! Seam for in-process SSH agents.
//!
//! Provisioning an agent is someone else's job. Terraform only needs the socket
//! path, which reaches the child process through `SSH_AUTH_SOCK`.

use std::path::PathBuf;

/// An agent listening on a unix socket.
pub trait CredentialAgent: Send + Sync {
    /// Path of the socket the agent listens on. Read once per invocation.
    fn socket_file(&self) -> PathBuf;
}

/// Agent that is already running somewhere and only needs to be pointed at.
#[derive(Debug, Clone)]
pub struct SocketPathAgent {
    socket: PathBuf,
}

impl SocketPathAgent {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
        }
    }
}

impl CredentialAgent for SocketPathAgent {
    fn socket_file(&self) -> PathBuf {
        self.socket.clone()
    }
}
