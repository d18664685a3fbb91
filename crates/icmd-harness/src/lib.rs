//! Command-line assertion harness for black-box icommands test suites.
//!
//! This crate runs shell-style command lines under an authenticated
//! session, captures stdout, stderr and the exit status, and checks them
//! against an expected outcome. A failed check is an `Err` the test
//! propagates with `?`, so only the current test fails.
//!
//! # Overview
//!
//! - [`Session`] / [`SessionContext`]: who the command runs as and where
//! - [`CommandRunner`]: spawns one command, optionally with a timeout or a
//!   file-size trigger, and returns an [`ExecutionResult`]
//! - [`OutputMatcher`]: decides whether a result meets an [`AssertionSpec`]
//! - [`assert_icmd`], [`assert_icmd_fail`], [`interrupt_icmd`]: the calls
//!   tests are written with
//! - [`fixtures`]: two-user and test-resource setup with teardown on drop
//! - [`HarnessError`]: spawn failures, mismatches, configuration problems
//!
//! # Example
//!
//! ```no_run
//! use icmd_harness::{assert_icmd, assert_icmd_fail, Check, HarnessConfig, TwoUsers};
//!
//! # fn example() -> Result<(), icmd_harness::HarnessError> {
//! let config = HarnessConfig::load()?;
//! let users = TwoUsers::up(&config)?;
//! assert_icmd_fail(users.admin(), "icd /doesnotexist", Check::list("No such directory (collection):"))?;
//! assert_icmd(users.admin(), "ihelp", Check::list("The following is a list of the icommands"))?;
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod config;
pub mod error;
pub mod fixtures;
pub mod logging;
pub mod matcher;
pub mod mocks;
pub mod runner;
pub mod session;
pub mod terminate;

pub use assertions::{
    assert_icmd, assert_icmd_fail, interrupt_icmd, interrupt_icmd_when, Check, Harness,
    InterruptOutcome,
};
pub use config::{ConfigLoader, HarnessConfig};
pub use error::HarnessError;
pub use fixtures::{ResourceFixture, TwoUsers};
pub use matcher::{AssertionSpec, Expectation, MatchOutcome, OutputMatcher, RegexMatcher, SubstringMatcher};
pub use runner::{CommandInvocation, CommandRunner, ExecutionResult, FileWatch, Termination};
pub use session::{Session, SessionContext};
