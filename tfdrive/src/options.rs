//! Options for running terraform commands, optionally loaded from TOML.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::value::Value;
use crate::io::agent::CredentialAgent;

/// Environment variable through which the credential agent socket reaches the child.
pub const SSH_AUTH_SOCK: &str = "SSH_AUTH_SOCK";

pub const DEFAULT_TERRAFORM_BINARY: &str = "terraform";

/// Transient terraform failures worth a retry, keyed by the text to look for in the
/// output. Values explain the failure to whoever reads the logs.
pub const DEFAULT_RETRYABLE_ERRORS: &[(&str, &str)] = &[
    (
        "read: connection reset by peer",
        "Failed to reach helm charts repository.",
    ),
    ("transport is closing", "Failed to reach Kubernetes API."),
    (
        "unable to verify signature",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        "unable to verify checksum",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        "no provider exists with the given name",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        "registry service is unreachable",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        "Error installing provider",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        "Failed to query available provider packages",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        "timeout while waiting for plugin to start",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        "timed out waiting for server handshake",
        "Failed to retrieve plugin due to transient network error.",
    ),
    (
        "could not query provider registry for",
        "Failed to retrieve plugin due to transient network error.",
    ),
];

/// Options for one or more terraform invocations.
///
/// Invocations only ever borrow the options, so one value can be shared by
/// concurrent callers.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Executable to run, looked up on `PATH` unless it contains a separator.
    pub terraform_binary: String,

    /// Folder holding the terraform code.
    pub terraform_dir: PathBuf,

    /// Passed with `-var`.
    pub vars: BTreeMap<String, Value>,

    /// Passed with `-var-file`, in order.
    pub var_files: Vec<String>,

    /// Passed with `-target`, in order.
    pub targets: Vec<String>,

    /// Extra environment variables for the child process.
    pub env_vars: BTreeMap<String, String>,

    /// Passed to `init` with `-backend-config`.
    pub backend_config: BTreeMap<String, Value>,

    /// Output substring -> explanation. A failed command whose output contains one of
    /// the keys is retried; anything else fails immediately.
    pub retryable_terraform_errors: BTreeMap<String, String>,

    /// Attempts for commands failing with a retryable error. 0 still runs once.
    pub max_retries: u32,

    #[serde(with = "humantime_serde")]
    pub time_between_retries: Duration,

    /// Sets `-upgrade=true` on `init`.
    pub upgrade: bool,

    /// Adds `-no-color` to every command.
    pub no_color: bool,

    /// Overrides the local SSH agent with this in-process agent.
    #[serde(skip)]
    pub ssh_agent: Option<Arc<dyn CredentialAgent>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            terraform_binary: DEFAULT_TERRAFORM_BINARY.to_string(),
            terraform_dir: PathBuf::from("."),
            vars: BTreeMap::new(),
            var_files: Vec::new(),
            targets: Vec::new(),
            env_vars: BTreeMap::new(),
            backend_config: BTreeMap::new(),
            retryable_terraform_errors: BTreeMap::new(),
            max_retries: 0,
            time_between_retries: Duration::ZERO,
            upgrade: false,
            no_color: false,
            ssh_agent: None,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("terraform_binary", &self.terraform_binary)
            .field("terraform_dir", &self.terraform_dir)
            .field("vars", &self.vars)
            .field("var_files", &self.var_files)
            .field("targets", &self.targets)
            .field("env_vars", &self.env_vars)
            .field("backend_config", &self.backend_config)
            .field("retryable_terraform_errors", &self.retryable_terraform_errors)
            .field("max_retries", &self.max_retries)
            .field("time_between_retries", &self.time_between_retries)
            .field("upgrade", &self.upgrade)
            .field("no_color", &self.no_color)
            .field(
                "ssh_agent",
                &self.ssh_agent.as_ref().map(|agent| agent.socket_file()),
            )
            .finish()
    }
}

impl Options {
    /// Options for the terraform code in `dir`, everything else defaulted.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            terraform_dir: dir.into(),
            ..Self::default()
        }
    }

    /// Add the built-in table of known transient errors, with 3 attempts 5 seconds apart.
    ///
    /// Entries already in the table win over the defaults.
    pub fn with_default_retryable_errors(mut self) -> Self {
        for (text, message) in DEFAULT_RETRYABLE_ERRORS {
            self.retryable_terraform_errors
                .entry((*text).to_string())
                .or_insert_with(|| (*message).to_string());
        }
        self.max_retries = 3;
        self.time_between_retries = Duration::from_secs(5);
        self
    }

    /// Environment overlay for a single invocation.
    ///
    /// When an agent is configured its socket replaces `SSH_AUTH_SOCK`. The options
    /// themselves are left untouched.
    pub fn resolved_env(&self) -> BTreeMap<String, String> {
        let mut env = self.env_vars.clone();
        if let Some(agent) = &self.ssh_agent {
            env.insert(
                SSH_AUTH_SOCK.to_string(),
                agent.socket_file().to_string_lossy().into_owned(),
            );
        }
        env
    }

    pub fn validate(&self) -> Result<()> {
        if self.terraform_binary.trim().is_empty() {
            return Err(anyhow!("terraform_binary must be non-empty"));
        }
        if self.terraform_dir.as_os_str().is_empty() {
            return Err(anyhow!("terraform_dir must be non-empty"));
        }
        if self.retryable_terraform_errors.contains_key("") {
            return Err(anyhow!(
                "retryable_terraform_errors must not contain an empty pattern"
            ));
        }
        Ok(())
    }
}

/// Load options from a TOML file.
///
/// A relative `terraform_dir` is resolved against the file's own directory.
pub fn load_options(path: &Path) -> Result<Options> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let mut options: Options =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    if options.terraform_dir.is_relative() {
        if let Some(parent) = path.parent() {
            options.terraform_dir = parent.join(&options.terraform_dir);
        }
    }
    options
        .validate()
        .with_context(|| format!("invalid options {}", path.display()))?;
    Ok(options)
}
