//! Helpers for running child processes while streaming their output.
//!
//! stdout and stderr are read concurrently, line by line, on two reader threads.
//! Every line goes to an [`OutputSink`] as soon as it is read and is appended to a
//! shared buffer, so the combined output keeps each stream's own line order.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::thread;

use tracing::{debug, error, info, instrument};

use crate::error::RunError;

/// Which pipe a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    pub fn as_str(self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

/// Receives each output line the moment it is read, before the process exits.
pub trait OutputSink: Send + Sync {
    fn line(&self, stream: Stream, line: &str);
}

/// Sink that emits every line as a `tracing` event on the `tfdrive::output` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn line(&self, stream: Stream, line: &str) {
        info!(target: "tfdrive::output", stream = stream.as_str(), "{line}");
    }
}

/// Environment variables visible to a child, snapshotted up front.
///
/// Children never read the ambient environment directly: they get `base` plus the
/// command's own overlay, so runs are reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaseEnv {
    vars: BTreeMap<String, String>,
}

impl BaseEnv {
    /// Snapshot the current process environment. Non-UTF-8 entries are skipped.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// `base` with `overlay` applied on top.
    pub fn merged(&self, overlay: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut env = self.vars.clone();
        env.extend(overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }
}

/// A fully resolved command: what to run, where, and with which environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// Complete environment of the child. Nothing is inherited beyond this.
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    fn display_name(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

/// Run a command and return its stdout and stderr joined by newlines.
///
/// Stdin is inherited from this process. A non-zero exit yields
/// [`RunError::Exit`] holding the output captured so far.
#[instrument(skip_all, fields(command = %spec.command, dir = %spec.working_dir.display()))]
pub fn run_command_and_get_output(
    spec: &CommandSpec,
    sink: &dyn OutputSink,
) -> Result<String, RunError> {
    info!(args = ?spec.args, "running command {}", spec.command);
    let name = spec.display_name();

    let mut cmd = Command::new(&spec.command);
    cmd.args(&spec.args)
        .current_dir(&spec.working_dir)
        .env_clear()
        .envs(&spec.env)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(RunError::Spawn {
                command: name,
                source: e,
            });
        }
    };

    let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
        (Some(stdout), Some(stderr)) => (stdout, stderr),
        _ => {
            // Unreachable with piped stdio, but never leave the child running.
            let _ = child.kill();
            let _ = child.wait();
            return Err(RunError::Spawn {
                command: name,
                source: std::io::Error::other("stdout/stderr were not piped"),
            });
        }
    };

    let read_result = read_stdout_and_stderr(stdout, stderr, sink);
    let output = match read_result {
        Ok(output) => output,
        Err(failure) => {
            // Still reap the child so it doesn't linger as a zombie.
            let _ = child.wait();
            return Err(failure.into_run_error(name));
        }
    };

    let status = child.wait().map_err(|e| RunError::Wait {
        command: name.clone(),
        source: e,
    })?;
    debug!(exit_code = ?status.code(), "command finished");

    if !status.success() {
        return Err(RunError::Exit {
            command: name,
            status,
            output,
        });
    }
    Ok(output)
}

#[derive(Debug)]
enum ReadFailure {
    Io(Stream, std::io::Error),
    Panicked,
}

impl ReadFailure {
    fn into_run_error(self, command: String) -> RunError {
        match self {
            ReadFailure::Io(stream, source) => RunError::Read {
                command,
                stream: stream.as_str(),
                source,
            },
            ReadFailure::Panicked => RunError::ReaderPanicked { command },
        }
    }
}

/// Capture both pipes until EOF while forwarding every line to `sink`.
fn read_stdout_and_stderr<O, E>(
    stdout: O,
    stderr: E,
    sink: &dyn OutputSink,
) -> Result<String, ReadFailure>
where
    O: Read + Send,
    E: Read + Send,
{
    let all_output = Mutex::new(Vec::new());

    let (stdout_result, stderr_result) = thread::scope(|scope| {
        let out = scope.spawn(|| read_lines(stdout, Stream::Stdout, sink, &all_output));
        let err = scope.spawn(|| read_lines(stderr, Stream::Stderr, sink, &all_output));
        (out.join(), err.join())
    });

    for result in [stdout_result, stderr_result] {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(failure)) => return Err(failure),
            Err(_) => return Err(ReadFailure::Panicked),
        }
    }

    let lines = all_output.into_inner().map_err(|_| ReadFailure::Panicked)?;
    Ok(lines.join("\n"))
}

fn read_lines<R: Read>(
    reader: R,
    stream: Stream,
    sink: &dyn OutputSink,
    all_output: &Mutex<Vec<String>>,
) -> Result<(), ReadFailure> {
    let mut buf_reader = BufReader::new(reader);
    let mut raw = Vec::new();
    loop {
        raw.clear();
        let n = buf_reader
            .read_until(b'\n', &mut raw)
            .map_err(|e| ReadFailure::Io(stream, e))?;
        if n == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(trim_line_ending(&raw)).into_owned();
        sink.line(stream, &line);
        all_output
            .lock()
            .map_err(|_| ReadFailure::Panicked)?
            .push(line);
    }
}

fn trim_line_ending(raw: &[u8]) -> &[u8] {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    raw.strip_suffix(b"\r").unwrap_or(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingSink;

    #[test]
    fn trims_unix_and_windows_line_endings() {
        assert_eq!(trim_line_ending(b"abc\n"), b"abc");
        assert_eq!(trim_line_ending(b"abc\r\n"), b"abc");
        assert_eq!(trim_line_ending(b"abc"), b"abc");
        assert_eq!(trim_line_ending(b"\n"), b"");
    }

    #[test]
    fn reads_both_streams_into_one_buffer() {
        let sink = RecordingSink::default();
        let output = read_stdout_and_stderr(
            "one\ntwo\n".as_bytes(),
            "warn\r\n".as_bytes(),
            &sink,
        )
        .expect("read");

        let lines: Vec<&str> = output.split('\n').collect();
        assert_eq!(lines.len(), 3);
        assert!(lines.contains(&"warn"));
        let one = lines.iter().position(|l| *l == "one").expect("one");
        let two = lines.iter().position(|l| *l == "two").expect("two");
        assert!(one < two);

        assert_eq!(sink.lines(Stream::Stdout), vec!["one", "two"]);
        assert_eq!(sink.lines(Stream::Stderr), vec!["warn"]);
    }

    #[test]
    fn final_line_without_newline_is_kept() {
        let sink = RecordingSink::default();
        let output = read_stdout_and_stderr("a\nb".as_bytes(), "".as_bytes(), &sink)
            .expect("read");
        assert_eq!(output, "a\nb");
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let sink = RecordingSink::default();
        let output = read_stdout_and_stderr(&b"ok \xff\n"[..], "".as_bytes(), &sink)
            .expect("read");
        assert_eq!(output, "ok \u{fffd}");
    }

    #[test]
    fn base_env_overlay_wins() {
        let base = BaseEnv::empty().with_var("PATH", "/bin").with_var("A", "base");
        let mut overlay = BTreeMap::new();
        overlay.insert("A".to_string(), "overlay".to_string());
        overlay.insert("B".to_string(), "new".to_string());

        let env = base.merged(&overlay);
        assert_eq!(base.get("A"), Some("base"));
        assert_eq!(env["PATH"], "/bin");
        assert_eq!(env["A"], "overlay");
        assert_eq!(env["B"], "new");
    }

    #[test]
    fn missing_binary_is_spawn_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let spec = CommandSpec {
            command: temp
                .path()
                .join("does-not-exist")
                .to_string_lossy()
                .into_owned(),
            args: vec!["version".into()],
            working_dir: temp.path().to_path_buf(),
            env: BTreeMap::new(),
        };
        let err = run_command_and_get_output(&spec, &RecordingSink::default()).unwrap_err();
        assert!(matches!(err, RunError::Spawn { .. }), "{err:?}");
        assert_eq!(err.output(), None);
    }
}
