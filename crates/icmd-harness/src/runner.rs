//! Subprocess execution with output capture.
//!
//! [`CommandRunner`] turns a [`CommandInvocation`] into exactly one child
//! process, captures stdout and stderr separately, and records how the
//! process ended. A non-zero exit or an expired timeout are both normal
//! [`ExecutionResult`]s; only a failure to launch is an error.

use std::fs;
use std::io::{Read, Write};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::session::SessionContext;
use crate::terminate::{kill_remnants, terminate_group, TerminateConfig};

/// Kill the command once a file grows to a given size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWatch {
    /// File to watch. Relative paths resolve against the session directory.
    pub path: PathBuf,
    /// Size in bytes at which the command is interrupted.
    pub min_bytes: u64,
}

impl FileWatch {
    pub fn new(path: impl Into<PathBuf>, min_bytes: u64) -> Self {
        Self {
            path: path.into(),
            min_bytes,
        }
    }
}

/// One command line to run under a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub command_line: String,
    pub timeout: Option<Duration>,
    pub stdin: Option<String>,
    pub watch: Option<FileWatch>,
}

impl CommandInvocation {
    pub fn new(command_line: impl Into<String>) -> Self {
        Self {
            command_line: command_line.into(),
            timeout: None,
            stdin: None,
            watch: None,
        }
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Text written to the child's stdin before it is closed.
    #[must_use]
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    #[must_use]
    pub fn watch(mut self, watch: FileWatch) -> Self {
        self.watch = Some(watch);
        self
    }

    /// Split the command line into argv using POSIX shell quoting rules.
    pub fn argv(&self) -> Result<Vec<String>, HarnessError> {
        let argv = shlex::split(&self.command_line).ok_or_else(|| {
            HarnessError::InvalidCommand(format!("unbalanced quoting in {:?}", self.command_line))
        })?;
        if argv.is_empty() {
            return Err(HarnessError::InvalidCommand("empty command line".into()));
        }
        Ok(argv)
    }
}

/// How a child process came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The process exited on its own.
    Exited,
    /// The timeout fired and the process was terminated.
    TimedOut,
    /// The watched file reached its size and the process was terminated.
    WatchTriggered,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::Exited => write!(f, "exited"),
            Termination::TimedOut => write!(f, "timed out"),
            Termination::WatchTriggered => write!(f, "interrupted by file watch"),
        }
    }
}

/// Everything observed about one finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub command_line: String,
    pub stdout: String,
    pub stderr: String,
    /// Exit code, or `128 + signal` if the process was killed by a signal.
    pub exit_code: i32,
    pub duration: Duration,
    pub termination: Termination,
    /// Whether the watched file was ever seen. `false` without a watch.
    pub watched_file_seen: bool,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// True iff the timeout fired before the command finished.
    pub fn duration_exceeded(&self) -> bool {
        self.termination == Termination::TimedOut
    }
}

/// Spawns commands under a session and collects their results.
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    terminate: TerminateConfig,
}

impl CommandRunner {
    pub fn new(terminate: TerminateConfig) -> Self {
        Self { terminate }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(TerminateConfig {
            grace_period: config.grace_period(),
            poll_interval: config.poll_interval(),
        })
    }

    /// Run one invocation to completion, timeout or watch trigger.
    pub fn run(
        &self,
        session: &dyn SessionContext,
        invocation: &CommandInvocation,
    ) -> Result<ExecutionResult, HarnessError> {
        let argv = invocation.argv()?;
        let started = Instant::now();

        let mut command = Command::new(&argv[0]);
        command
            .args(&argv[1..])
            .current_dir(session.working_dir())
            .envs(session.env())
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);

        let mut child = command.spawn().map_err(|source| HarnessError::Spawn {
            command: invocation.command_line.clone(),
            source,
        })?;
        debug!(
            command = %invocation.command_line,
            pid = child.id(),
            user = session.user_name(),
            "spawned command"
        );

        let stdout = capture(child.stdout.take());
        let stderr = capture(child.stderr.take());
        let feeder = match (child.stdin.take(), &invocation.stdin) {
            (Some(mut pipe), Some(input)) => {
                let input = input.clone();
                // A child that exits without reading gives EPIPE; that is its business.
                Some(thread::spawn(move || {
                    let _ = pipe.write_all(input.as_bytes());
                }))
            }
            _ => None,
        };

        let watch_path = invocation.watch.as_ref().map(|w| {
            if w.path.is_absolute() {
                w.path.clone()
            } else {
                session.working_dir().join(&w.path)
            }
        });

        let waited = if invocation.timeout.is_none() && invocation.watch.is_none() {
            child
                .wait()
                .map(|status| (status, Termination::Exited, false))
                .map_err(HarnessError::from)
        } else {
            self.poll(&mut child, invocation, watch_path.as_deref())
        };
        let (status, termination, watched_file_seen) = match waited {
            Ok(outcome) => outcome,
            Err(e) => {
                // Never leave a child behind on the error path.
                let _ = terminate_group(&mut child, &self.terminate);
                return Err(e);
            }
        };

        if let Some(feeder) = feeder {
            let _ = feeder.join();
        }
        let stdout = join_capture(stdout);
        let stderr = join_capture(stderr);

        let result = ExecutionResult {
            command_line: invocation.command_line.clone(),
            stdout,
            stderr,
            exit_code: exit_code(status),
            duration: started.elapsed(),
            termination,
            watched_file_seen,
        };
        debug!(
            command = %result.command_line,
            exit_code = result.exit_code,
            termination = %result.termination,
            elapsed_ms = result.duration.as_millis() as u64,
            "command finished"
        );
        Ok(result)
    }

    /// Poll for exit while checking the deadline and the watched file.
    fn poll(
        &self,
        child: &mut Child,
        invocation: &CommandInvocation,
        watch_path: Option<&std::path::Path>,
    ) -> Result<(ExitStatus, Termination, bool), HarnessError> {
        let deadline = invocation.timeout.map(|t| Instant::now() + t);
        let mut file_seen = false;
        loop {
            if let Some(status) = child.try_wait()? {
                // Descendants left in the group would hold the output pipes open.
                kill_remnants(child)?;
                return Ok((status, Termination::Exited, file_seen));
            }

            if let (Some(path), Some(watch)) = (watch_path, invocation.watch.as_ref()) {
                if let Ok(meta) = fs::metadata(path) {
                    file_seen = true;
                    if meta.len() >= watch.min_bytes {
                        debug!(
                            command = %invocation.command_line,
                            path = %path.display(),
                            size = meta.len(),
                            "watched file reached size, interrupting"
                        );
                        let status = terminate_group(child, &self.terminate)?;
                        return Ok((status, Termination::WatchTriggered, file_seen));
                    }
                }
            }

            if deadline.is_some_and(|d| Instant::now() >= d) {
                warn!(
                    command = %invocation.command_line,
                    timeout_ms = invocation.timeout.map(|t| t.as_millis() as u64),
                    "command timed out, interrupting"
                );
                let status = terminate_group(child, &self.terminate)?;
                return Ok((status, Termination::TimedOut, file_seen));
            }

            thread::sleep(self.terminate.poll_interval);
        }
    }
}

/// Drain a pipe on its own thread so neither stream can block the child.
fn capture<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            // Partial output is still useful if the read fails mid-way.
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn join_capture(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

/// Shell convention: a process killed by signal N reports `128 + N`.
fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}
