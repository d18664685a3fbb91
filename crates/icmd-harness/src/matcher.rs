//! Verifying execution results against expected outcomes.
//!
//! An [`AssertionSpec`] pairs an [`Expectation`] with the text that must
//! appear. An [`OutputMatcher`] decides what "appear" means: the default
//! [`SubstringMatcher`] looks for literal, case-sensitive substrings, while
//! [`RegexMatcher`] treats each needle as a regular expression. Call sites
//! only ever see the trait, so strategies can be swapped freely.

use std::fmt;

use crate::error::HarnessError;
use crate::runner::ExecutionResult;

/// What a command is expected to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    /// Exit 0.
    SuccessAny,
    /// Exit 0 and every needle in stdout.
    SuccessContains,
    /// Exit 0 and nothing but whitespace on stdout.
    SuccessEmpty,
    /// Exit non-zero.
    FailureAny,
    /// Exit non-zero and every needle in stdout or stderr.
    FailureContains,
}

impl Expectation {
    /// Whether this expectation matches text and therefore needs needles.
    pub fn needs_text(self) -> bool {
        matches!(self, Expectation::SuccessContains | Expectation::FailureContains)
    }

    fn expects_success(self) -> bool {
        matches!(
            self,
            Expectation::SuccessAny | Expectation::SuccessContains | Expectation::SuccessEmpty
        )
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Expectation::SuccessAny => "success",
            Expectation::SuccessContains => "success with stdout containing",
            Expectation::SuccessEmpty => "success with empty stdout",
            Expectation::FailureAny => "failure",
            Expectation::FailureContains => "failure with output containing",
        };
        f.write_str(label)
    }
}

/// The expected outcome of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionSpec {
    expectation: Expectation,
    needles: Vec<String>,
}

impl AssertionSpec {
    /// Build a spec, rejecting text expectations without usable needles and
    /// needles on expectations that do not match text.
    pub fn new(expectation: Expectation, needles: Vec<String>) -> Result<Self, HarnessError> {
        if expectation.needs_text() {
            if needles.is_empty() {
                return Err(HarnessError::InvalidSpec(format!(
                    "{expectation} requires at least one expected string"
                )));
            }
            if needles.iter().any(String::is_empty) {
                return Err(HarnessError::InvalidSpec(
                    "expected strings must not be empty".into(),
                ));
            }
        } else if !needles.is_empty() {
            return Err(HarnessError::InvalidSpec(format!(
                "{expectation} does not take expected strings, got {needles:?}"
            )));
        }
        Ok(Self {
            expectation,
            needles,
        })
    }

    pub fn success() -> Self {
        Self {
            expectation: Expectation::SuccessAny,
            needles: Vec::new(),
        }
    }

    pub fn failure() -> Self {
        Self {
            expectation: Expectation::FailureAny,
            needles: Vec::new(),
        }
    }

    pub fn expectation(&self) -> Expectation {
        self.expectation
    }

    pub fn needles(&self) -> &[String] {
        &self.needles
    }
}

/// Result of checking one execution against one spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    pub passed: bool,
    /// Empty when `passed`.
    pub diagnostic: String,
}

impl MatchOutcome {
    fn pass() -> Self {
        Self {
            passed: true,
            diagnostic: String::new(),
        }
    }
}

/// A strategy for finding expected text in captured output.
pub trait OutputMatcher {
    /// Whether `needle` occurs in `haystack`.
    fn find(&self, haystack: &str, needle: &str) -> Result<bool, String>;

    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Check `result` against `spec`. Pure: the same inputs always give the
    /// same outcome.
    fn verify(&self, result: &ExecutionResult, spec: &AssertionSpec, limit: usize) -> MatchOutcome {
        let exit_ok = if spec.expectation.expects_success() {
            result.exit_code == 0
        } else {
            result.exit_code != 0
        };
        if !exit_ok {
            let reason = if spec.expectation.expects_success() {
                "expected exit code 0".to_string()
            } else {
                "expected a non-zero exit code".to_string()
            };
            return fail(self.name(), result, spec, &reason, limit);
        }

        match spec.expectation {
            Expectation::SuccessAny | Expectation::FailureAny => MatchOutcome::pass(),
            Expectation::SuccessEmpty => {
                if result.stdout.trim().is_empty() {
                    MatchOutcome::pass()
                } else {
                    fail(self.name(), result, spec, "expected empty stdout", limit)
                }
            }
            Expectation::SuccessContains | Expectation::FailureContains => {
                let search_stderr = spec.expectation == Expectation::FailureContains;
                for needle in &spec.needles {
                    let found = self.find(&result.stdout, needle).and_then(|hit| {
                        if hit || !search_stderr {
                            Ok(hit)
                        } else {
                            self.find(&result.stderr, needle)
                        }
                    });
                    match found {
                        Ok(true) => {}
                        Ok(false) => {
                            let reason = format!("missing {needle:?}");
                            return fail(self.name(), result, spec, &reason, limit);
                        }
                        Err(e) => return fail(self.name(), result, spec, &e, limit),
                    }
                }
                MatchOutcome::pass()
            }
        }
    }
}

/// Literal, case-sensitive substring search.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstringMatcher;

impl OutputMatcher for SubstringMatcher {
    fn find(&self, haystack: &str, needle: &str) -> Result<bool, String> {
        Ok(haystack.contains(needle))
    }

    fn name(&self) -> &'static str {
        "substring"
    }
}

/// Needles are regular expressions.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexMatcher;

impl OutputMatcher for RegexMatcher {
    fn find(&self, haystack: &str, needle: &str) -> Result<bool, String> {
        // `^` and `$` match at line boundaries.
        regex::RegexBuilder::new(needle)
            .multi_line(true)
            .build()
            .map(|re| re.is_match(haystack))
            .map_err(|e| format!("invalid pattern {needle:?}: {e}"))
    }

    fn name(&self) -> &'static str {
        "regex"
    }
}

fn fail(
    matcher: &str,
    result: &ExecutionResult,
    spec: &AssertionSpec,
    reason: &str,
    limit: usize,
) -> MatchOutcome {
    MatchOutcome {
        passed: false,
        diagnostic: render_diagnostic(matcher, result, spec, reason, limit),
    }
}

/// Render the failure report shown when an assertion does not hold.
pub fn render_diagnostic(
    matcher: &str,
    result: &ExecutionResult,
    spec: &AssertionSpec,
    reason: &str,
    limit: usize,
) -> String {
    let needles = (!spec.needles.is_empty()).then(|| format!("{:?} ({matcher})", spec.needles));
    render_report(
        result,
        &spec.expectation.to_string(),
        needles.as_deref(),
        reason,
        limit,
    )
}

/// Render a failure report with a free-form `expected` label.
pub fn render_report(
    result: &ExecutionResult,
    expected: &str,
    needles: Option<&str>,
    reason: &str,
    limit: usize,
) -> String {
    let mut lines = vec![
        format!("command:     {}", result.command_line),
        format!("expected:    {expected}"),
    ];
    if let Some(needles) = needles {
        lines.push(format!("needles:     {needles}"));
    }
    lines.push(format!("reason:      {reason}"));
    lines.push(format!(
        "exit code:   {} ({}, {:?})",
        result.exit_code, result.termination, result.duration
    ));
    lines.push("--- stdout ---".into());
    lines.push(truncate(&result.stdout, limit));
    lines.push("--- stderr ---".into());
    lines.push(truncate(&result.stderr, limit));
    lines.join("\n")
}

/// Keep at most `limit` bytes of `text`, cut on a char boundary.
pub fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [{} bytes truncated]", &text[..end], text.len() - end)
}
