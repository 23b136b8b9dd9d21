//! Running terraform commands.
//!
//! [`Terraform`] turns [`Options`] plus a verb into a [`CommandSpec`], runs it
//! through the retry loop, and classifies failures against the options' table of
//! retryable errors.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::core::args::{format_args, format_backend_config_as_args, with_common_flags};
use crate::core::retryable::find_retryable;
use crate::error::{Error, Result, RunError};
use crate::exit_codes::DEFAULT_SUCCESS_EXIT_CODE;
use crate::io::process::{
    BaseEnv, CommandSpec, OutputSink, TracingSink, run_command_and_get_output,
};
use crate::io::retry::{Attempt, do_with_retry};
use crate::options::Options;

/// Driver for the terraform CLI.
///
/// Holds the environment snapshot children start from and the sink that receives
/// their output. Cheap to clone and safe to share between threads.
#[derive(Clone)]
pub struct Terraform {
    base_env: BaseEnv,
    sink: Arc<dyn OutputSink>,
}

impl Default for Terraform {
    fn default() -> Self {
        Self::new()
    }
}

impl Terraform {
    /// Driver that inherits this process's environment and logs output via `tracing`.
    pub fn new() -> Self {
        Self::with_parts(BaseEnv::from_process(), Arc::new(TracingSink))
    }

    pub fn with_parts(base_env: BaseEnv, sink: Arc<dyn OutputSink>) -> Self {
        Self { base_env, sink }
    }

    /// Resolve the command for `args`: common flags, working dir, merged environment.
    pub fn command_spec(&self, options: &Options, args: Vec<String>) -> CommandSpec {
        CommandSpec {
            command: options.terraform_binary.clone(),
            args: with_common_flags(options, args),
            working_dir: options.terraform_dir.clone(),
            env: self.base_env.merged(&options.resolved_env()),
        }
    }

    /// Run terraform with `args`, retrying failures that match a known transient error.
    ///
    /// Returns the combined stdout/stderr of the successful attempt.
    #[instrument(skip_all, fields(dir = %options.terraform_dir.display()))]
    pub fn run_command<S: AsRef<str>>(&self, options: &Options, args: &[S]) -> Result<String> {
        let spec = self.command_spec(options, to_owned_args(args));
        let description = format!("Running {} {:?}", spec.command, spec.args);

        let output = do_with_retry(
            &description,
            options.max_retries,
            options.time_between_retries,
            || match run_command_and_get_output(&spec, self.sink.as_ref()) {
                Ok(out) => Ok(out),
                Err(err) => Err(classify(options, err)),
            },
        )?;
        Ok(output)
    }

    /// Run terraform once and report its exit code instead of failing on non-zero exit.
    ///
    /// Errors only when the process could not be run or its exit code is unknown
    /// (e.g. it was killed by a signal).
    #[instrument(skip_all, fields(dir = %options.terraform_dir.display()))]
    pub fn exit_code_for_command<S: AsRef<str>>(
        &self,
        options: &Options,
        args: &[S],
    ) -> Result<i32> {
        let spec = self.command_spec(options, to_owned_args(args));
        info!("Running {} {:?}", spec.command, spec.args);

        match run_command_and_get_output(&spec, self.sink.as_ref()) {
            Ok(_) => Ok(DEFAULT_SUCCESS_EXIT_CODE),
            Err(err) => match err.exit_code() {
                Some(code) => Ok(code),
                None => Err(Error::UndeterminableExitCode(err)),
            },
        }
    }

    /// `terraform init`, with `-upgrade` and backend config from the options.
    pub fn init(&self, options: &Options) -> Result<String> {
        let mut args = vec!["init".to_string(), format!("-upgrade={}", options.upgrade)];
        args.extend(format_backend_config_as_args(&options.backend_config));
        self.run_command(options, &args)
    }

    /// `terraform get -update`.
    pub fn get(&self, options: &Options) -> Result<String> {
        self.run_command(options, &["get", "-update"])
    }

    /// `terraform apply`. Destroying what it creates is the caller's job.
    pub fn apply(&self, options: &Options) -> Result<String> {
        let args = format_args(
            options,
            &["apply", "-input=false", "-lock=false", "-auto-approve"],
        );
        self.run_command(options, &args)
    }

    pub fn destroy(&self, options: &Options) -> Result<String> {
        let args = format_args(
            options,
            &["destroy", "-auto-approve", "-input=false", "-lock=false"],
        );
        self.run_command(options, &args)
    }

    /// `terraform plan -detailed-exitcode`: 0 no changes, 1 error, 2 changes present.
    pub fn plan_exit_code(&self, options: &Options) -> Result<i32> {
        let args = format_args(
            options,
            &["plan", "-input=false", "-lock=true", "-detailed-exitcode"],
        );
        self.exit_code_for_command(options, &args)
    }

    /// `init`, `get`, then `apply`. Returns the apply output.
    pub fn init_and_apply(&self, options: &Options) -> Result<String> {
        self.init(options)?;
        self.get(options)?;
        self.apply(options)
    }

    /// `init`, then the plan's detailed exit code.
    pub fn init_and_plan(&self, options: &Options) -> Result<i32> {
        self.init(options)?;
        self.plan_exit_code(options)
    }
}

/// Retry only exits whose output contains a registered pattern.
fn classify(options: &Options, err: RunError) -> Attempt<RunError> {
    let Some(output) = err.output() else {
        return Attempt::Fatal(err);
    };
    match find_retryable(&options.retryable_terraform_errors, output) {
        Some(found) => {
            warn!(
                pattern = found.pattern,
                "terraform failed with the error '{}' but this error was expected and warrants a retry. Further details: {}",
                found.pattern,
                found.explanation
            );
            Attempt::Retry(err)
        }
        None => Attempt::Fatal(err),
    }
}

fn to_owned_args<S: AsRef<str>>(args: &[S]) -> Vec<String> {
    args.iter().map(|a| a.as_ref().to_string()).collect()
}
