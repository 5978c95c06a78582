//! Candidate resolution and sequential evaluation.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, warn};

use crate::evaluate::{evaluate, WrapperVerdict};

/// Wrapper scripts checked by default, relative to the invoking directory.
pub const DEFAULT_WRAPPERS: &[&str] = &[
    "scripts/mcp-github-wrapper.sh",
    "scripts/mcp-bitbucket-wrapper.sh",
    "scripts/mcp-atlassian-wrapper.sh",
];

/// Installed variants under the home directory, opted in via `--include-bin`.
pub const BIN_WRAPPERS: &[&str] = &[
    "bin/mcp-github-wrapper.sh",
    "bin/mcp-bitbucket-wrapper.sh",
    "bin/mcp-atlassian-wrapper.sh",
];

/// One harness invocation, built once from the CLI and never mutated.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Wall-clock budget per wrapper.
    pub timeout: Duration,
    /// Also check the `~/bin` variants.
    pub include_bin: bool,
    /// Explicit wrapper paths; when non-empty they replace the defaults
    /// entirely (no merge).
    pub overrides: Vec<PathBuf>,
    /// Base directory for the default relative paths.
    pub root: PathBuf,
}

/// The overall run: per-wrapper verdicts in evaluation order.
#[derive(Debug)]
pub struct HarnessResult {
    pub verdicts: Vec<WrapperVerdict>,
    pub any_failure: bool,
}

impl HarnessResult {
    pub fn exit_code(&self) -> i32 {
        if self.any_failure {
            1
        } else {
            0
        }
    }
}

/// Resolve the effective candidate list. Explicit overrides win outright;
/// otherwise defaults, optionally extended with the home-directory set.
pub fn resolve_candidates(config: &HarnessConfig) -> Vec<PathBuf> {
    if !config.overrides.is_empty() {
        return config.overrides.clone();
    }

    let mut candidates: Vec<PathBuf> = DEFAULT_WRAPPERS
        .iter()
        .map(|rel| config.root.join(rel))
        .collect();

    if config.include_bin {
        match dirs::home_dir() {
            Some(home) => candidates.extend(BIN_WRAPPERS.iter().map(|rel| home.join(rel))),
            None => warn!("home directory could not be resolved; skipping ~/bin wrappers"),
        }
    }

    candidates
}

/// Evaluate every candidate sequentially, each exactly once. A failure is
/// local to its wrapper; skips count as success.
pub async fn run(config: &HarnessConfig) -> HarnessResult {
    let candidates = resolve_candidates(config);
    debug!(count = candidates.len(), "resolved wrapper candidates");

    let mut verdicts = Vec::with_capacity(candidates.len());
    let mut any_failure = false;
    for wrapper in candidates {
        let verdict = evaluate(&wrapper, config.timeout).await;
        any_failure |= verdict.status.is_fail();
        verdicts.push(verdict);
    }

    HarnessResult {
        verdicts,
        any_failure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> HarnessConfig {
        HarnessConfig {
            timeout: Duration::from_secs(6),
            include_bin: false,
            overrides: Vec::new(),
            root: PathBuf::from("/repo"),
        }
    }

    #[test]
    fn defaults_resolve_against_the_root() {
        let candidates = resolve_candidates(&config());
        assert_eq!(candidates.len(), 3);
        assert_eq!(
            candidates[0],
            PathBuf::from("/repo/scripts/mcp-github-wrapper.sh")
        );
    }

    #[test]
    fn include_bin_extends_the_defaults() {
        let mut cfg = config();
        cfg.include_bin = true;
        let candidates = resolve_candidates(&cfg);
        // Defaults first, then the home variants (when home resolves).
        assert!(candidates.len() >= 3);
        assert_eq!(
            candidates[0],
            PathBuf::from("/repo/scripts/mcp-github-wrapper.sh")
        );
        if let Some(home) = dirs::home_dir() {
            assert_eq!(candidates.len(), 6);
            assert_eq!(candidates[3], home.join("bin/mcp-github-wrapper.sh"));
        }
    }

    #[test]
    fn explicit_overrides_replace_everything() {
        let mut cfg = config();
        cfg.include_bin = true;
        cfg.overrides = vec![PathBuf::from("/tmp/custom.sh")];
        let candidates = resolve_candidates(&cfg);
        assert_eq!(candidates, vec![PathBuf::from("/tmp/custom.sh")]);
    }

    #[tokio::test]
    async fn missing_candidates_skip_and_the_run_succeeds() {
        let mut cfg = config();
        cfg.root = PathBuf::from("/nonexistent-root");
        let result = run(&cfg).await;
        assert_eq!(result.verdicts.len(), 3);
        assert!(!result.any_failure);
        assert_eq!(result.exit_code(), 0);
    }
}
