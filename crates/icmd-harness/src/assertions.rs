//! Test-facing assertion entry points.
//!
//! Each call runs one command under a session, verifies the result and
//! returns `Err(HarnessError::AssertionMismatch)` if the expectation does
//! not hold. Tests return `Result<(), HarnessError>` and propagate with `?`,
//! so a mismatch ends only the current test.
//!
//! # Example
//!
//! ```no_run
//! use icmd_harness::{assert_icmd, assert_icmd_fail, Check, Session};
//!
//! # fn example() -> Result<(), icmd_harness::HarnessError> {
//! let admin = Session::builder("rods", "tempZone").build()?;
//! assert_icmd_fail(&admin, "ils -L testingimkdir", Check::Any)?;
//! assert_icmd(&admin, "imkdir testingimkdir", Check::Any)?;
//! assert_icmd(&admin, "ils -L testingimkdir", Check::list("testingimkdir"))?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use tracing::{error, info};

use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::matcher::{AssertionSpec, Expectation, MatchOutcome, OutputMatcher, SubstringMatcher};
use crate::runner::{CommandInvocation, CommandRunner, ExecutionResult, FileWatch, Termination};
use crate::session::SessionContext;

/// Which output to look at, in the vocabulary of the test suites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    /// Exit status only.
    Any,
    /// Strings that must appear in the listing (stdout).
    List(Vec<String>),
    /// Strings that must appear in the error report.
    Error(Vec<String>),
    /// Stdout must be empty.
    Empty,
}

impl Check {
    pub fn list(needle: impl Into<String>) -> Self {
        Check::List(vec![needle.into()])
    }

    pub fn list_all<I, S>(needles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Check::List(needles.into_iter().map(Into::into).collect())
    }

    pub fn error(needle: impl Into<String>) -> Self {
        Check::Error(vec![needle.into()])
    }

    /// The [`AssertionSpec`] used by [`assert_icmd`].
    pub fn expect_success(self) -> Result<AssertionSpec, HarnessError> {
        match self {
            Check::Any => Ok(AssertionSpec::success()),
            Check::List(needles) => AssertionSpec::new(Expectation::SuccessContains, needles),
            Check::Error(needles) => AssertionSpec::new(Expectation::FailureContains, needles),
            Check::Empty => AssertionSpec::new(Expectation::SuccessEmpty, Vec::new()),
        }
    }

    /// The [`AssertionSpec`] used by [`assert_icmd_fail`].
    pub fn expect_failure(self) -> Result<AssertionSpec, HarnessError> {
        match self {
            Check::Any | Check::Empty => Ok(AssertionSpec::failure()),
            Check::List(needles) | Check::Error(needles) => {
                AssertionSpec::new(Expectation::FailureContains, needles)
            }
        }
    }
}

/// What stopped a command started with [`Harness::interrupt_icmd_when`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptOutcome {
    /// The watched file reached its size and the command was killed.
    Interrupted,
    /// The timeout fired first; the file existed but stayed small.
    TimedOut,
    /// The timeout fired and the file never appeared.
    FileNeverAppeared,
    /// The command exited on its own before either trigger.
    Completed,
}

/// Runner plus matcher plus reporting limits.
#[derive(Debug, Clone)]
pub struct Harness<M = SubstringMatcher> {
    runner: CommandRunner,
    matcher: M,
    command_timeout: Option<Duration>,
    diagnostic_limit: usize,
}

impl Default for Harness<SubstringMatcher> {
    fn default() -> Self {
        Self::from_config(&HarnessConfig::default())
    }
}

impl Harness<SubstringMatcher> {
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            runner: CommandRunner::from_config(config),
            matcher: SubstringMatcher,
            command_timeout: config.command_timeout(),
            diagnostic_limit: config.diagnostic_limit,
        }
    }
}

impl<M: OutputMatcher> Harness<M> {
    /// Swap the output matching strategy.
    pub fn with_matcher<N: OutputMatcher>(self, matcher: N) -> Harness<N> {
        Harness {
            runner: self.runner,
            matcher,
            command_timeout: self.command_timeout,
            diagnostic_limit: self.diagnostic_limit,
        }
    }

    pub fn runner(&self) -> &CommandRunner {
        &self.runner
    }

    pub fn matcher(&self) -> &M {
        &self.matcher
    }

    /// Run and expect success (by default) or the given check.
    pub fn assert_icmd(
        &self,
        session: &dyn SessionContext,
        command_line: &str,
        check: Check,
    ) -> Result<ExecutionResult, HarnessError> {
        let spec = check.expect_success()?;
        self.run_and_verify(session, self.invocation(command_line), &spec)
    }

    /// Run and expect failure (by default) or the given check.
    pub fn assert_icmd_fail(
        &self,
        session: &dyn SessionContext,
        command_line: &str,
        check: Check,
    ) -> Result<ExecutionResult, HarnessError> {
        let spec = check.expect_failure()?;
        self.run_and_verify(session, self.invocation(command_line), &spec)
    }

    /// Like [`assert_icmd`](Self::assert_icmd), feeding `stdin` to the command.
    pub fn assert_icmd_stdin(
        &self,
        session: &dyn SessionContext,
        command_line: &str,
        stdin: &str,
        check: Check,
    ) -> Result<ExecutionResult, HarnessError> {
        let spec = check.expect_success()?;
        self.run_and_verify(session, self.invocation(command_line).stdin(stdin), &spec)
    }

    /// Run with a timeout and require that the timeout fired.
    ///
    /// A command that finishes before `timeout` is a mismatch.
    pub fn interrupt_icmd(
        &self,
        session: &dyn SessionContext,
        command_line: &str,
        timeout: Duration,
    ) -> Result<ExecutionResult, HarnessError> {
        let invocation = CommandInvocation::new(command_line).timeout(timeout);
        let result = self.runner.run(session, &invocation)?;
        if result.duration_exceeded() {
            info!(command = command_line, ?timeout, "interrupt assertion passed");
            return Ok(result);
        }
        let diagnostic = crate::matcher::render_report(
            &result,
            &format!("interrupted by timeout after {timeout:?}"),
            None,
            &format!("command {}, expected it to still be running after {timeout:?}", result.termination),
            self.diagnostic_limit,
        );
        error!(command = command_line, "interrupt assertion failed\n{diagnostic}");
        Err(HarnessError::AssertionMismatch { diagnostic })
    }

    /// Run until `watch` fires, the command exits, or `timeout` expires.
    pub fn interrupt_icmd_when(
        &self,
        session: &dyn SessionContext,
        command_line: &str,
        watch: FileWatch,
        timeout: Duration,
    ) -> Result<InterruptOutcome, HarnessError> {
        let invocation = CommandInvocation::new(command_line)
            .timeout(timeout)
            .watch(watch);
        let result = self.runner.run(session, &invocation)?;
        let outcome = match result.termination {
            Termination::WatchTriggered => InterruptOutcome::Interrupted,
            Termination::TimedOut if result.watched_file_seen => InterruptOutcome::TimedOut,
            Termination::TimedOut => InterruptOutcome::FileNeverAppeared,
            Termination::Exited => InterruptOutcome::Completed,
        };
        info!(command = command_line, ?outcome, "interrupt finished");
        Ok(outcome)
    }

    fn invocation(&self, command_line: &str) -> CommandInvocation {
        let invocation = CommandInvocation::new(command_line);
        match self.command_timeout {
            Some(timeout) => invocation.timeout(timeout),
            None => invocation,
        }
    }

    fn run_and_verify(
        &self,
        session: &dyn SessionContext,
        invocation: CommandInvocation,
        spec: &AssertionSpec,
    ) -> Result<ExecutionResult, HarnessError> {
        let result = self.runner.run(session, &invocation)?;
        let outcome = if result.termination == Termination::Exited {
            self.matcher.verify(&result, spec, self.diagnostic_limit)
        } else {
            // A killed command's exit code says nothing about the command itself.
            MatchOutcome {
                passed: false,
                diagnostic: crate::matcher::render_diagnostic(
                    self.matcher.name(),
                    &result,
                    spec,
                    &format!("command {}", result.termination),
                    self.diagnostic_limit,
                ),
            }
        };
        if outcome.passed {
            info!(
                command = %result.command_line,
                expected = %spec.expectation(),
                exit_code = result.exit_code,
                "assertion passed"
            );
            Ok(result)
        } else {
            error!(
                command = %result.command_line,
                "assertion failed\n{}",
                outcome.diagnostic
            );
            Err(HarnessError::AssertionMismatch {
                diagnostic: outcome.diagnostic,
            })
        }
    }
}

/// [`Harness::assert_icmd`] with the default harness.
pub fn assert_icmd(
    session: &dyn SessionContext,
    command_line: &str,
    check: Check,
) -> Result<ExecutionResult, HarnessError> {
    Harness::<SubstringMatcher>::default().assert_icmd(session, command_line, check)
}

/// [`Harness::assert_icmd_fail`] with the default harness.
pub fn assert_icmd_fail(
    session: &dyn SessionContext,
    command_line: &str,
    check: Check,
) -> Result<ExecutionResult, HarnessError> {
    Harness::<SubstringMatcher>::default().assert_icmd_fail(session, command_line, check)
}

/// [`Harness::interrupt_icmd`] with the default harness.
pub fn interrupt_icmd(
    session: &dyn SessionContext,
    command_line: &str,
    timeout: Duration,
) -> Result<ExecutionResult, HarnessError> {
    Harness::<SubstringMatcher>::default().interrupt_icmd(session, command_line, timeout)
}

/// [`Harness::interrupt_icmd_when`] with the default harness.
pub fn interrupt_icmd_when(
    session: &dyn SessionContext,
    command_line: &str,
    watch: FileWatch,
    timeout: Duration,
) -> Result<InterruptOutcome, HarnessError> {
    Harness::<SubstringMatcher>::default().interrupt_icmd_when(session, command_line, watch, timeout)
}
