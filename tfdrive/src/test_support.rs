//! Test-only helpers: a recording sink, captured logs and fake terraform executables.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};

use crate::io::process::{BaseEnv, OutputSink, Stream};
use crate::io::terraform::Terraform;
use crate::options::Options;

/// Sink that keeps every line it receives, in arrival order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    lines: Mutex<Vec<(Stream, String)>>,
}

impl RecordingSink {
    /// Lines received from `stream`, in order.
    pub fn lines(&self, stream: Stream) -> Vec<String> {
        self.all()
            .into_iter()
            .filter(|(s, _)| *s == stream)
            .map(|(_, line)| line)
            .collect()
    }

    pub fn all(&self) -> Vec<(Stream, String)> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl OutputSink for RecordingSink {
    fn line(&self, stream: Stream, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((stream, line.to_string()));
        }
    }
}

/// In-memory log destination for asserting on what a call logged.
///
/// Install [`CapturedLogs::subscriber`] with `tracing::subscriber::with_default`;
/// it only sees events from the current thread.
#[derive(Debug, Clone, Default)]
pub struct CapturedLogs {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    /// Plain-text `fmt` subscriber at TRACE level writing into this buffer.
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + 'static {
        let writer = self.clone();
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish()
    }

    pub fn contents(&self) -> String {
        let buf = match self.buf.lock() {
            Ok(buf) => buf.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf
            .lock()
            .map_err(|_| io::Error::other("log buffer poisoned"))?
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A fake `terraform` shell script living in its own temp directory.
///
/// Every invocation appends its arguments (one line, space-separated) to
/// `calls.log` before running `body`. The variable `$CALLS` in the body holds the
/// number of invocations so far, including the current one.
pub struct FakeTool {
    dir: tempfile::TempDir,
    binary: PathBuf,
    sink: Arc<RecordingSink>,
}

impl FakeTool {
    pub fn new(body: &str) -> Result<Self> {
        let dir = tempfile::tempdir().context("create fake tool dir")?;
        let binary = dir.path().join("terraform");
        let log = dir.path().join("calls.log");
        let script = format!(
            "#!/bin/sh\n\
             echo \"$*\" >> '{log}'\n\
             CALLS=$(wc -l < '{log}' | tr -d ' ')\n\
             {body}\n",
            log = log.display(),
        );
        fs::write(&binary, script)
            .with_context(|| format!("write fake tool {}", binary.display()))?;
        make_executable(&binary)?;
        Ok(Self {
            dir,
            binary,
            sink: Arc::new(RecordingSink::default()),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Options pointing at the fake binary, running in the temp directory.
    pub fn options(&self) -> Options {
        let mut options = Options::new(self.dir.path());
        options.terraform_binary = self.binary.to_string_lossy().into_owned();
        options
    }

    /// Driver with the current process environment and this tool's recording sink.
    pub fn driver(&self) -> Terraform {
        Terraform::with_parts(BaseEnv::from_process(), self.sink.clone())
    }

    pub fn sink(&self) -> &RecordingSink {
        &self.sink
    }

    /// Arguments of each invocation so far.
    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.dir.path().join("calls.log"))
            .map(|log| log.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path)
        .with_context(|| format!("stat {}", path.display()))?
        .permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).with_context(|| format!("chmod {}", path.display()))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
