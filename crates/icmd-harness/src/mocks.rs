//! Stand-in icommands for testing without a live grid.
//!
//! [`MockIcommands`] writes small shell scripts into a private directory.
//! Each script appends its name, arguments and any stdin it was given to a
//! shared call log, then exits with a configured status. Point a session's
//! `bin_dir` at [`MockIcommands::bin_dir`] and the fixtures and assertions
//! run against the stubs instead of a real catalog.
//!
//! # Example
//!
//! ```no_run
//! use icmd_harness::mocks::MockIcommandsBuilder;
//!
//! let mock = MockIcommandsBuilder::new()
//!     .succeed("imkdir")
//!     .fail("ils", 4, "ERROR: lsUtil: srcPath testingimkdir does not exist")
//!     .build()
//!     .unwrap();
//! // ... run commands with mock.bin_dir() on PATH ...
//! assert!(mock.calls().is_empty());
//! ```

use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::HarnessError;

/// Every icommand the fixtures and the catalog suite invoke.
pub const DEFAULT_COMMANDS: &[&str] = &[
    "iinit", "iexit", "iadmin", "imkdir", "icd", "ils", "iput", "irm", "irmtrash", "ihelp",
    "iquest",
];

/// One recorded invocation of a stub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Command name, e.g. `imkdir`.
    pub command: String,
    /// Arguments joined by single spaces.
    pub args: String,
    /// First line of stdin, for commands that read it.
    pub stdin: Option<String>,
}

impl RecordedCall {
    /// `command args`, trimmed.
    pub fn line(&self) -> String {
        format!("{} {}", self.command, self.args).trim().to_string()
    }
}

#[derive(Debug, Clone)]
struct StubBehavior {
    exit_code: i32,
    stdout: String,
    stderr: String,
    reads_stdin: bool,
}

impl Default for StubBehavior {
    fn default() -> Self {
        Self {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            reads_stdin: false,
        }
    }
}

/// A directory of recording icommand stubs.
#[derive(Debug)]
pub struct MockIcommands {
    dir: TempDir,
}

impl MockIcommands {
    /// Directory to prepend to `PATH`.
    pub fn bin_dir(&self) -> &Path {
        self.dir.path()
    }

    fn log_path(&self) -> PathBuf {
        self.dir.path().join("calls.log")
    }

    /// All calls made so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        let Ok(log) = std::fs::read_to_string(self.log_path()) else {
            return Vec::new();
        };
        log.lines()
            .filter_map(|line| {
                let mut fields = line.splitn(3, '\t');
                let command = fields.next()?.to_string();
                let args = fields.next().unwrap_or_default().to_string();
                let stdin = fields.next().map(str::to_string);
                Some(RecordedCall {
                    command,
                    args,
                    stdin,
                })
            })
            .collect()
    }

    /// Call lines (`command args`) in order.
    pub fn call_lines(&self) -> Vec<String> {
        self.calls().iter().map(RecordedCall::line).collect()
    }

    /// Forget all recorded calls.
    pub fn reset(&self) -> Result<(), HarnessError> {
        match std::fs::remove_file(self.log_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Builder for [`MockIcommands`].
#[derive(Debug, Clone)]
pub struct MockIcommandsBuilder {
    stubs: BTreeMap<String, StubBehavior>,
}

impl Default for MockIcommandsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockIcommandsBuilder {
    /// Start with every command in [`DEFAULT_COMMANDS`] succeeding silently.
    /// `iinit` consumes a password line from stdin.
    pub fn new() -> Self {
        let mut stubs: BTreeMap<String, StubBehavior> = DEFAULT_COMMANDS
            .iter()
            .map(|name| (name.to_string(), StubBehavior::default()))
            .collect();
        if let Some(iinit) = stubs.get_mut("iinit") {
            iinit.reads_stdin = true;
        }
        Self { stubs }
    }

    /// Make `command` exit 0 with no output.
    pub fn succeed(mut self, command: &str) -> Self {
        self.stubs.insert(command.to_string(), StubBehavior::default());
        self
    }

    /// Make `command` print `stdout` and exit 0.
    pub fn print(mut self, command: &str, stdout: impl Into<String>) -> Self {
        let stub = self.stubs.entry(command.to_string()).or_default();
        stub.stdout = stdout.into();
        stub.exit_code = 0;
        self
    }

    /// Make `command` print `stderr` and exit with `exit_code`.
    pub fn fail(mut self, command: &str, exit_code: i32, stderr: impl Into<String>) -> Self {
        let stub = self.stubs.entry(command.to_string()).or_default();
        stub.stderr = stderr.into();
        stub.exit_code = exit_code;
        self
    }

    /// Write the stub scripts.
    pub fn build(self) -> Result<MockIcommands, HarnessError> {
        let dir = tempfile::Builder::new().prefix("icmd-mock-").tempdir()?;
        let log = dir.path().join("calls.log");
        for (name, stub) in &self.stubs {
            let path = dir.path().join(name);
            std::fs::write(&path, render_script(name, stub, &log))?;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        }
        Ok(MockIcommands { dir })
    }
}

fn render_script(name: &str, stub: &StubBehavior, log: &Path) -> String {
    let log = shell_quote(&log.to_string_lossy());
    let mut script = String::from("#!/bin/sh\n");
    if stub.reads_stdin {
        script.push_str("IFS= read -r line\n");
        script.push_str(&format!(
            "printf '%s\\t%s\\t%s\\n' {} \"$*\" \"$line\" >> {log}\n",
            shell_quote(name)
        ));
    } else {
        script.push_str(&format!(
            "printf '%s\\t%s\\n' {} \"$*\" >> {log}\n",
            shell_quote(name)
        ));
    }
    if !stub.stdout.is_empty() {
        script.push_str(&format!("printf '%s\\n' {}\n", shell_quote(&stub.stdout)));
    }
    if !stub.stderr.is_empty() {
        script.push_str(&format!("printf '%s\\n' {} >&2\n", shell_quote(&stub.stderr)));
    }
    script.push_str(&format!("exit {}\n", stub.exit_code));
    script
}

/// Single-quote `text` for `/bin/sh`.
fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}
