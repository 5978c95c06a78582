//! Per-wrapper judgment: run, classify stdout, decide pass/skip/fail.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::classify::classify;
use crate::runner::{run_with_timeout, RunOutcome};

/// At most this many offending lines are quoted in a report.
pub const MAX_REPORTED_OFFENDERS: usize = 5;

/// Quoted offending lines are truncated to this many characters.
const SNIPPET_MAX: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictStatus {
    Pass,
    /// Wrapper file absent. Optional integrations may legitimately be
    /// missing, so this counts as success in the aggregate.
    Skip,
    Fail,
}

impl VerdictStatus {
    pub fn is_fail(self) -> bool {
        matches!(self, VerdictStatus::Fail)
    }
}

/// Aggregate judgment for one wrapper, with its human-readable report.
#[derive(Debug)]
pub struct WrapperVerdict {
    pub wrapper: PathBuf,
    pub status: VerdictStatus,
    pub lines: Vec<String>,
}

impl WrapperVerdict {
    pub fn report(&self) -> String {
        self.lines.join("\n")
    }
}

/// Evaluate one wrapper path within `timeout`.
///
/// Every failure mode is captured into the returned verdict; nothing
/// escapes to abort the remaining candidates.
pub async fn evaluate(wrapper: &Path, timeout: Duration) -> WrapperVerdict {
    if !wrapper.exists() {
        return WrapperVerdict {
            wrapper: wrapper.to_path_buf(),
            status: VerdictStatus::Skip,
            lines: vec![format!("SKIP (missing): {}", wrapper.display())],
        };
    }

    let outcome = match run_with_timeout(wrapper, working_dir_of(wrapper), timeout).await {
        Ok(outcome) => outcome,
        Err(err) => {
            return WrapperVerdict {
                wrapper: wrapper.to_path_buf(),
                status: VerdictStatus::Fail,
                lines: vec![
                    format!("FAIL: {}", wrapper.display()),
                    format!("  error: {err}"),
                ],
            };
        }
    };

    judge(wrapper, &outcome, timeout)
}

/// Turn a captured run into a verdict. Classification is exhaustive: any
/// offending line anywhere fails content-cleanliness, even though only
/// the first [`MAX_REPORTED_OFFENDERS`] are quoted.
fn judge(wrapper: &Path, outcome: &RunOutcome, timeout: Duration) -> WrapperVerdict {
    let mut offenders: Vec<(usize, &str)> = Vec::new();
    let mut offending_total = 0usize;
    let mut saw_protocol = false;
    let mut stdout_lines = 0usize;

    for (idx, line) in outcome.stdout.lines().enumerate() {
        stdout_lines += 1;
        let verdict = classify(line);
        if verdict.protocol_indicating {
            saw_protocol = true;
        }
        if !verdict.allowed {
            offending_total += 1;
            if offenders.len() < MAX_REPORTED_OFFENDERS {
                offenders.push((idx + 1, line));
            }
        }
    }

    let ok_content = offending_total == 0;
    // A wrapper that is still running at the deadline is the healthy
    // case: the server sat listening on stdio. An early exit only counts
    // as success when protocol-shaped output was observed first.
    let ok_run = outcome.timed_out() || saw_protocol;
    let ok = ok_content && ok_run;

    debug!(
        wrapper = %wrapper.display(),
        stdout_lines,
        offending = offending_total,
        saw_protocol,
        timed_out = outcome.timed_out(),
        "wrapper evaluated"
    );

    let status_word = if ok { "PASS" } else { "FAIL" };
    let mut lines = vec![format!("{status_word}: {}", wrapper.display())];

    match outcome.exit_code {
        None => lines.push(format!(
            "  note: process timed out after {:.1}s (server likely running)",
            timeout.as_secs_f64()
        )),
        Some(code) => {
            lines.push(format!(
                "  note: exited code {code}, stdout lines={stdout_lines}, stderr length={} bytes",
                outcome.stderr.len()
            ));
            if !saw_protocol {
                lines.push(
                    "  reason: no JSON/Content-* output observed before exit (not a running MCP server)"
                        .to_string(),
                );
            }
        }
    }

    if !ok_content {
        lines.push("  offending stdout lines:".to_string());
        for (line_no, text) in &offenders {
            lines.push(format!("    {line_no}: {}", truncate_snippet(text)));
        }
    }

    WrapperVerdict {
        wrapper: wrapper.to_path_buf(),
        status: if ok {
            VerdictStatus::Pass
        } else {
            VerdictStatus::Fail
        },
        lines,
    }
}

/// Directory the wrapper runs in. A bare relative filename has an empty
/// parent, which `current_dir` rejects with ENOENT; that means the
/// invoking directory.
fn working_dir_of(wrapper: &Path) -> &Path {
    match wrapper.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn truncate_snippet(line: &str) -> String {
    if line.chars().count() < SNIPPET_MAX {
        line.to_string()
    } else {
        let mut truncated: String = line.chars().take(SNIPPET_MAX).collect();
        truncated.push('…');
        truncated
    }
}
